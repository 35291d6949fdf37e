//! FFT engine over real or complex f64 arrays.
//!
//! Wraps `rustfft`/`realfft` behind the engine contract: lengths must be
//! positive powers of two, the inverse is normalized by `1/M`, and the
//! wavelength <-> frequency-bin helpers tie spectra to track wavelengths.
//! Callers zero-pad non-power-of-two inputs themselves; the engine never
//! pads.
//!
//! All plans and scratch live in the engine instance (grow-only, never
//! shrink); there is no process-wide mutable state.

use crate::error::{EngineError, Result};
use realfft::RealFftPlanner;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::sync::Arc;

/// Smallest power of two >= `n` (1 for `n = 0`).
pub fn next_power_of_two(n: usize) -> usize {
    n.next_power_of_two()
}

/// Frequency bin for a wavelength: `round(M * interval / lambda)`, clamped
/// to `[0, M/2]`.
pub fn wavelength_to_bin(lambda_m: f64, m: usize, interval_m: f64) -> usize {
    let raw = (m as f64 * interval_m / lambda_m).round();
    (raw.max(0.0) as usize).min(m / 2)
}

/// Wavelength represented by bin `k` (infinite at DC).
pub fn bin_to_wavelength(k: usize, m: usize, interval_m: f64) -> f64 {
    if k == 0 {
        f64::INFINITY
    } else {
        m as f64 * interval_m / k as f64
    }
}

fn validate_len(m: usize) -> Result<()> {
    if m == 0 || !m.is_power_of_two() {
        Err(EngineError::InvalidLength { len: m })
    } else {
        Ok(())
    }
}

/// FFT engine owning planners and grow-only scratch buffers.
pub struct FftEngine {
    planner: FftPlanner<f64>,
    real_planner: RealFftPlanner<f64>,
    complex_buf: Vec<Complex<f64>>,
    complex_scratch: Vec<Complex<f64>>,
    real_buf: Vec<f64>,
    spectrum_buf: Vec<Complex<f64>>,
}

impl Default for FftEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FftEngine {
    pub fn new() -> Self {
        FftEngine {
            planner: FftPlanner::new(),
            real_planner: RealFftPlanner::new(),
            complex_buf: Vec::new(),
            complex_scratch: Vec::new(),
            real_buf: Vec::new(),
            spectrum_buf: Vec::new(),
        }
    }

    /// In-place forward DFT over paired real/imaginary arrays.
    pub fn forward(&mut self, re: &mut [f64], im: &mut [f64]) -> Result<()> {
        self.transform(re, im, true)
    }

    /// In-place inverse DFT over paired real/imaginary arrays, normalized
    /// by `1/M`.
    pub fn inverse(&mut self, re: &mut [f64], im: &mut [f64]) -> Result<()> {
        self.transform(re, im, false)
    }

    fn transform(&mut self, re: &mut [f64], im: &mut [f64], forward: bool) -> Result<()> {
        if re.len() != im.len() {
            return Err(EngineError::InvalidLength { len: im.len() });
        }
        let m = re.len();
        validate_len(m)?;

        if self.complex_buf.len() < m {
            self.complex_buf.resize(m, Complex::new(0.0, 0.0));
        }
        for i in 0..m {
            self.complex_buf[i] = Complex::new(re[i], im[i]);
        }

        let plan = if forward {
            self.planner.plan_fft_forward(m)
        } else {
            self.planner.plan_fft_inverse(m)
        };
        let scratch_len = plan.get_inplace_scratch_len();
        if self.complex_scratch.len() < scratch_len {
            self.complex_scratch
                .resize(scratch_len, Complex::new(0.0, 0.0));
        }
        plan.process_with_scratch(&mut self.complex_buf[..m], &mut self.complex_scratch);

        let scale = if forward { 1.0 } else { 1.0 / m as f64 };
        for i in 0..m {
            re[i] = self.complex_buf[i].re * scale;
            im[i] = self.complex_buf[i].im * scale;
        }
        Ok(())
    }

    /// Forward DFT of a real input, returning the half spectrum of length
    /// `M/2 + 1` (Hermitian symmetry implicit).
    pub fn forward_real(&mut self, input: &[f64]) -> Result<Vec<Complex<f64>>> {
        let m = input.len();
        validate_len(m)?;

        if self.real_buf.len() < m {
            self.real_buf.resize(m, 0.0);
        }
        self.real_buf[..m].copy_from_slice(input);

        let plan = self.real_planner.plan_fft_forward(m);
        let mut spectrum = vec![Complex::new(0.0, 0.0); m / 2 + 1];
        let scratch_len = plan.get_scratch_len();
        if self.complex_scratch.len() < scratch_len {
            self.complex_scratch
                .resize(scratch_len, Complex::new(0.0, 0.0));
        }
        plan.process_with_scratch(
            &mut self.real_buf[..m],
            &mut spectrum,
            &mut self.complex_scratch,
        )
        .unwrap();
        Ok(spectrum)
    }

    /// Inverse of [`forward_real`]: half spectrum of length `M/2 + 1` back
    /// to `M` real samples, normalized by `1/M`.
    ///
    /// [`forward_real`]: FftEngine::forward_real
    pub fn inverse_real(&mut self, spectrum: &[Complex<f64>], m: usize) -> Result<Vec<f64>> {
        validate_len(m)?;
        if spectrum.len() != m / 2 + 1 {
            return Err(EngineError::InvalidLength {
                len: spectrum.len(),
            });
        }

        if self.spectrum_buf.len() < spectrum.len() {
            self.spectrum_buf
                .resize(spectrum.len(), Complex::new(0.0, 0.0));
        }
        self.spectrum_buf[..spectrum.len()].copy_from_slice(spectrum);

        let plan = self.real_planner.plan_fft_inverse(m);
        let mut output = vec![0.0_f64; m];
        let scratch_len = plan.get_scratch_len();
        if self.complex_scratch.len() < scratch_len {
            self.complex_scratch
                .resize(scratch_len, Complex::new(0.0, 0.0));
        }
        plan.process_with_scratch(
            &mut self.spectrum_buf[..spectrum.len()],
            &mut output,
            &mut self.complex_scratch,
        )
        .unwrap();

        let scale = 1.0 / m as f64;
        for v in output.iter_mut() {
            *v *= scale;
        }
        Ok(output)
    }
}

/// FFT convolution engine for applying a long impulse response.
///
/// Owns its FFT plans, scratch buffers, and the pre-computed kernel
/// spectrum, so a caller can reuse it across signals of the same length.
/// Buffers grow but never shrink.
pub(crate) struct FftConvolver {
    planner: RealFftPlanner<f64>,
    fft_len: usize, // padded FFT length (power of 2), 0 = uninitialized

    plan_fwd: Option<Arc<dyn realfft::RealToComplex<f64>>>,
    plan_inv: Option<Arc<dyn realfft::ComplexToReal<f64>>>,

    kernel_fft: Vec<Complex<f64>>,

    fft_input: Vec<f64>,
    fft_output: Vec<f64>,
    fft_spectrum: Vec<Complex<f64>>,
    fft_scratch_fwd: Vec<Complex<f64>>,
    fft_scratch_inv: Vec<Complex<f64>>,
}

impl FftConvolver {
    pub(crate) fn new() -> Self {
        FftConvolver {
            planner: RealFftPlanner::new(),
            fft_len: 0,
            plan_fwd: None,
            plan_inv: None,
            kernel_fft: Vec::new(),
            fft_input: Vec::new(),
            fft_output: Vec::new(),
            fft_spectrum: Vec::new(),
            fft_scratch_fwd: Vec::new(),
            fft_scratch_inv: Vec::new(),
        }
    }

    /// Ensure buffers and plans cover `signal_len + kernel.len() - 1`
    /// samples, re-FFT-ing the kernel when the padded length changes.
    pub(crate) fn ensure_buffers(&mut self, signal_len: usize, kernel: &[f64]) {
        let k_len = kernel.len();
        if signal_len == 0 || k_len == 0 {
            return;
        }

        let min_len = signal_len + k_len - 1;
        let padded_len = min_len.next_power_of_two();

        if padded_len == self.fft_len {
            return; // already set up for this length
        }

        self.fft_len = padded_len;
        let spectrum_len = padded_len / 2 + 1;

        if self.fft_input.len() < padded_len {
            self.fft_input.resize(padded_len, 0.0);
        }
        if self.fft_output.len() < padded_len {
            self.fft_output.resize(padded_len, 0.0);
        }
        if self.fft_spectrum.len() < spectrum_len {
            self.fft_spectrum
                .resize(spectrum_len, Complex::new(0.0, 0.0));
        }
        if self.kernel_fft.len() < spectrum_len {
            self.kernel_fft.resize(spectrum_len, Complex::new(0.0, 0.0));
        }

        let fwd = self.planner.plan_fft_forward(padded_len);
        let inv = self.planner.plan_fft_inverse(padded_len);
        let fwd_scratch = fwd.get_scratch_len();
        let inv_scratch = inv.get_scratch_len();
        if self.fft_scratch_fwd.len() < fwd_scratch {
            self.fft_scratch_fwd
                .resize(fwd_scratch, Complex::new(0.0, 0.0));
        }
        if self.fft_scratch_inv.len() < inv_scratch {
            self.fft_scratch_inv
                .resize(inv_scratch, Complex::new(0.0, 0.0));
        }
        self.plan_fwd = Some(fwd);
        self.plan_inv = Some(inv);

        self.prepare_kernel(kernel);
    }

    /// Recompute the kernel spectrum at the current padded length.
    fn prepare_kernel(&mut self, kernel: &[f64]) {
        let k_len = kernel.len();
        let padded_len = self.fft_len;
        let spectrum_len = padded_len / 2 + 1;

        for i in 0..padded_len {
            self.fft_input[i] = if i < k_len { kernel[i] } else { 0.0 };
        }

        let fwd = self
            .plan_fwd
            .as_ref()
            .expect("plans not initialized")
            .clone();
        fwd.process_with_scratch(
            &mut self.fft_input[..padded_len],
            &mut self.kernel_fft[..spectrum_len],
            &mut self.fft_scratch_fwd,
        )
        .unwrap();
    }

    /// FFT-based linear convolution:
    /// `output[..signal_len] = (kernel * source)[..signal_len]`.
    pub(crate) fn convolve(&mut self, source: &[f64], signal_len: usize, output: &mut [f64]) {
        let padded_len = self.fft_len;
        let spectrum_len = padded_len / 2 + 1;

        for i in 0..padded_len {
            self.fft_input[i] = if i < signal_len { source[i] } else { 0.0 };
        }

        let fwd = self
            .plan_fwd
            .as_ref()
            .expect("plans not initialized")
            .clone();
        fwd.process_with_scratch(
            &mut self.fft_input[..padded_len],
            &mut self.fft_spectrum[..spectrum_len],
            &mut self.fft_scratch_fwd,
        )
        .unwrap();

        for i in 0..spectrum_len {
            self.fft_spectrum[i] *= self.kernel_fft[i];
        }

        let inv = self
            .plan_inv
            .as_ref()
            .expect("plans not initialized")
            .clone();
        inv.process_with_scratch(
            &mut self.fft_spectrum[..spectrum_len],
            &mut self.fft_output[..padded_len],
            &mut self.fft_scratch_inv,
        )
        .unwrap();

        let scale = 1.0 / padded_len as f64;
        for i in 0..signal_len {
            output[i] = self.fft_output[i] * scale;
        }
    }
}
