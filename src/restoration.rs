//! Restoration filter: inverts the chord-offset measurement distortion
//! inside a bounded wavelength band to recover true track irregularity.
//!
//! The filter is synthesized in the frequency domain on
//! `M = next_power_of_two(N)` bins. Two inversion modes exist:
//!
//! * [`InversionMode::Bandpass`] — unity gain on the passband, zero
//!   outside. This only band-limits the measurement and is the documented
//!   default of the legacy implementation.
//! * [`InversionMode::ChordInverse`] — the regularized reciprocal of the
//!   eccentric-chord transfer `T = 1 - (p*e^{-jwq} + q*e^{jwp})/(p+q)`,
//!   still restricted to the passband. This is the mode that actually
//!   undoes the measurement operator.
//!
//! Application is spectral (forward FFT, gain, inverse FFT), equivalent to
//! circular convolution with the full-length impulse response; the zero
//! pad from `N` up to `M` supplies the no-wrap boundary. Endpoints have
//! reduced fidelity, hence the >= 500 m work-section buffers.

use crate::error::{check_finite, EngineError, Result};
use crate::fft::{next_power_of_two, FftConvolver, FftEngine};
use crate::signal::{ChannelKind, Signal};
use crate::versine::ChordGeometry;
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::PI;

/// Tikhonov-style regularization of the chord-transfer reciprocal. The
/// chord operator has true zeros (DC, and wavelengths the chord cannot
/// see); `H = conj(T) / (|T|^2 + EPS^2)` keeps the gain bounded there.
const REGULARIZATION_EPS: f64 = 1e-3;

/// Direct time-domain convolution is cheaper than FFT below this length.
const DIRECT_CONVOLUTION_LIMIT: usize = 4096;

/// Restoration passband in meters of wavelength.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RestorationBand {
    pub lower_m: f64,
    pub upper_m: f64,
}

impl RestorationBand {
    pub fn new(lower_m: f64, upper_m: f64) -> Self {
        RestorationBand { lower_m, upper_m }
    }

    /// Documented per-channel defaults: 6-100 m for the lateral channels,
    /// 3.5-40 m for the vertical family.
    pub fn default_for(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::Alignment | ChannelKind::Gauge => RestorationBand::new(6.0, 100.0),
            ChannelKind::Level | ChannelKind::CrossLevel | ChannelKind::Twist | ChannelKind::Cant => {
                RestorationBand::new(3.5, 40.0)
            }
        }
    }

    /// Both bounds must clear twice the sampling interval (Nyquist) and be
    /// properly ordered.
    pub fn validate(&self, interval_m: f64) -> Result<()> {
        if self.lower_m >= self.upper_m
            || self.lower_m <= 2.0 * interval_m
            || self.upper_m <= 2.0 * interval_m
            || !self.lower_m.is_finite()
            || !self.upper_m.is_finite()
        {
            return Err(EngineError::InvalidBand {
                lower_m: self.lower_m,
                upper_m: self.upper_m,
                interval_m,
            });
        }
        Ok(())
    }
}

/// How the passband gain is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InversionMode {
    /// Unity gain on the passband.
    Bandpass,
    /// Regularized reciprocal of the eccentric-chord transfer for the
    /// given recording-car geometry.
    ChordInverse(ChordGeometry),
}

/// Restoration filter for one channel configuration.
pub struct RestorationFilter {
    interval_m: f64,
    band: RestorationBand,
    mode: InversionMode,
    engine: FftEngine,
    convolver: FftConvolver,
}

impl RestorationFilter {
    pub fn new(interval_m: f64, band: RestorationBand, mode: InversionMode) -> Result<Self> {
        band.validate(interval_m)?;
        Ok(RestorationFilter {
            interval_m,
            band,
            mode,
            engine: FftEngine::new(),
            convolver: FftConvolver::new(),
        })
    }

    pub fn band(&self) -> RestorationBand {
        self.band
    }

    pub fn mode(&self) -> InversionMode {
        self.mode
    }

    /// Passband bin range on an `m`-point spectrum:
    /// `k_low = max(1, ceil(m*dd/upper))`, `k_high = min(m/2, floor(m*dd/lower))`.
    fn bin_range(&self, m: usize) -> (usize, usize) {
        let k_low = ((m as f64 * self.interval_m / self.band.upper_m).ceil() as usize).max(1);
        let k_high =
            ((m as f64 * self.interval_m / self.band.lower_m).floor() as usize).min(m / 2);
        (k_low, k_high)
    }

    /// Half-spectrum gain `H[0..m/2]`, Hermitian symmetry implicit.
    fn gain_half_spectrum(&self, m: usize) -> Vec<Complex<f64>> {
        let (k_low, k_high) = self.bin_range(m);
        let mut gain = vec![Complex::new(0.0, 0.0); m / 2 + 1];

        for k in k_low..=k_high.min(m / 2) {
            gain[k] = match self.mode {
                InversionMode::Bandpass => Complex::new(1.0, 0.0),
                InversionMode::ChordInverse(chord) => {
                    let (p_pts, q_pts) = chord.points(self.interval_m);
                    let p = chord.forward_m;
                    let q = chord.backward_m;
                    let omega = 2.0 * PI * k as f64 / m as f64;
                    // T = 1 - (p*e^{-jw*q_pts} + q*e^{jw*p_pts}) / (p+q)
                    let back = Complex::from_polar(p, -omega * q_pts as f64);
                    let fwd = Complex::from_polar(q, omega * p_pts as f64);
                    let t = Complex::new(1.0, 0.0) - (back + fwd) / (p + q);
                    t.conj() / (t.norm_sqr() + REGULARIZATION_EPS * REGULARIZATION_EPS)
                }
            };
        }

        // DC and Nyquist bins of a real spectrum are purely real.
        gain[0].im = 0.0;
        let last = gain.len() - 1;
        gain[last].im = 0.0;
        gain
    }

    /// Impulse response of the filter for an `n`-sample signal: inverse
    /// DFT of the gain on `M = next_power_of_two(n)` bins, truncated to
    /// `n`. Deterministic in `(n, interval, band, mode)`.
    pub fn impulse_response(&mut self, n: usize) -> Vec<f64> {
        let m = next_power_of_two(n);
        let gain = self.gain_half_spectrum(m);
        let mut response = self
            .engine
            .inverse_real(&gain, m)
            .expect("gain spectrum length matches m");
        response.truncate(n);
        response
    }

    /// Restore a measurement: zero-pad to `M`, transform, apply the gain,
    /// transform back, truncate. Linear in the input.
    pub fn restore(&mut self, measured: &Signal) -> Result<Signal> {
        let values = self.restore_values(measured.values())?;
        measured.with_values(values)
    }

    /// [`restore`](RestorationFilter::restore) over a bare slice.
    pub fn restore_values(&mut self, values: &[f64]) -> Result<Vec<f64>> {
        check_finite(values)?;
        let n = values.len();
        if n == 0 {
            return Err(EngineError::InvalidInput { index: 0 });
        }
        let m = next_power_of_two(n);

        let mut padded = vec![0.0_f64; m];
        padded[..n].copy_from_slice(values);

        let mut spectrum = self.engine.forward_real(&padded)?;
        let gain = self.gain_half_spectrum(m);
        for (s, g) in spectrum.iter_mut().zip(gain.iter()) {
            *s *= g;
        }
        // Keep the packed DC/Nyquist bins real after the complex multiply.
        spectrum[0].im = 0.0;
        let last = spectrum.len() - 1;
        spectrum[last].im = 0.0;

        let mut restored = self.engine.inverse_real(&spectrum, m)?;
        restored.truncate(n);
        Ok(restored)
    }

    /// Convolution application of a synthesized impulse response: the
    /// boundary contributes zero (`n - k < 0` drops out), direct
    /// time-domain below 4096 samples, FFT convolution above.
    pub fn convolve(&mut self, values: &[f64], impulse: &[f64]) -> Vec<f64> {
        let n = values.len();
        let mut out = vec![0.0_f64; n];
        if n == 0 || impulse.is_empty() {
            return out;
        }

        if n < DIRECT_CONVOLUTION_LIMIT {
            for t in 0..n {
                let mut sum = 0.0;
                for k in 0..impulse.len().min(t + 1) {
                    sum += impulse[k] * values[t - k];
                }
                out[t] = sum;
            }
        } else {
            self.convolver.ensure_buffers(n, impulse);
            self.convolver.convolve(values, n, &mut out);
        }
        out
    }
}

/// Pure memo for synthesized impulse responses, keyed on everything the
/// synthesis depends on. A driver holds one across a processing session;
/// the engine itself never caches globally.
#[derive(Default)]
pub struct ImpulseResponseCache {
    entries: HashMap<CacheKey, Vec<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    n: usize,
    interval: u64,
    lower: u64,
    upper: u64,
    mode: ModeKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ModeKey {
    Bandpass,
    ChordInverse { forward: u64, backward: u64 },
}

impl ImpulseResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fetch or synthesize the impulse response for the configuration.
    pub fn get(
        &mut self,
        n: usize,
        interval_m: f64,
        band: RestorationBand,
        mode: InversionMode,
    ) -> Result<&[f64]> {
        let key = CacheKey {
            n,
            interval: interval_m.to_bits(),
            lower: band.lower_m.to_bits(),
            upper: band.upper_m.to_bits(),
            mode: match mode {
                InversionMode::Bandpass => ModeKey::Bandpass,
                InversionMode::ChordInverse(chord) => ModeKey::ChordInverse {
                    forward: chord.forward_m.to_bits(),
                    backward: chord.backward_m.to_bits(),
                },
            },
        };
        if !self.entries.contains_key(&key) {
            let mut filter = RestorationFilter::new(interval_m, band, mode)?;
            self.entries.insert(key, filter.impulse_response(n));
        }
        Ok(self.entries.get(&key).unwrap())
    }
}
