//! Eccentric-versine (asymmetric chord-offset) operator.
//!
//! Models the measurement principle of a track-recording car: the reported
//! value at sample `n` is the displacement of the car body from the chord
//! spanned by the forward arm `p` and backward arm `q`,
//! `v[n] = y[n] - (p*y[n-q_pts] + q*y[n+p_pts]) / (p+q)`.
//!
//! Three variants produce bit-identical output: whole-array, chunked (with
//! progress and cancellation for long signals), and streaming over a lazy
//! input. Samples whose neighbors fall outside the signal emit 0.0 and are
//! flagged invalid.

use crate::error::{check_finite, EngineError, Result};
use crate::progress::{CancelToken, ProgressFn, ProgressUpdate};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default chunk length for the chunked variant.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Forward/backward chord arms of a measuring chord, meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChordGeometry {
    pub forward_m: f64,
    pub backward_m: f64,
}

impl ChordGeometry {
    pub fn new(forward_m: f64, backward_m: f64) -> Self {
        ChordGeometry {
            forward_m,
            backward_m,
        }
    }

    /// Chord arms in sample points: `(p_pts, q_pts)`.
    pub fn points(&self, interval_m: f64) -> (usize, usize) {
        (
            (self.forward_m / interval_m).round() as usize,
            (self.backward_m / interval_m).round() as usize,
        )
    }

    /// Samples needed before a single valid output exists.
    pub fn min_samples(&self, interval_m: f64) -> usize {
        let (p_pts, q_pts) = self.points(interval_m);
        p_pts + q_pts + 1
    }
}

/// Parameters of the versine operator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VersineParams {
    pub chord: ChordGeometry,
    pub interval_m: f64,
    /// Output precision in decimal places of a millimeter.
    pub round_decimals: u32,
}

impl VersineParams {
    pub fn new(chord: ChordGeometry, interval_m: f64) -> Self {
        VersineParams {
            chord,
            interval_m,
            round_decimals: 3,
        }
    }
}

/// Versine output: values plus a validity flag per sample (false where a
/// chord neighbor fell outside the signal).
#[derive(Debug, Clone, PartialEq)]
pub struct VersineOutput {
    pub values: Vec<f64>,
    pub valid: Vec<bool>,
}

fn round_to(v: f64, decimals: u32) -> f64 {
    let scale = 10_f64.powi(decimals as i32);
    (v * scale).round() / scale
}

/// One output sample. Shared by every variant so they stay bit-identical.
#[inline]
fn versine_sample(
    values: &[f64],
    n: usize,
    p_pts: usize,
    q_pts: usize,
    p: f64,
    q: f64,
    decimals: u32,
) -> (f64, bool) {
    if n < q_pts || n + p_pts >= values.len() {
        (0.0, false)
    } else {
        let chord = (p * values[n - q_pts] + q * values[n + p_pts]) / (p + q);
        (round_to(values[n] - chord, decimals), true)
    }
}

fn validate(values: &[f64], params: &VersineParams) -> Result<(usize, usize)> {
    check_finite(values)?;
    let (p_pts, q_pts) = params.chord.points(params.interval_m);
    let required = p_pts + q_pts + 1;
    if values.len() < required {
        return Err(EngineError::InsufficientSamples {
            len: values.len(),
            required,
        });
    }
    Ok((p_pts, q_pts))
}

/// Whole-array eccentric versine.
pub fn eccentric_versine(values: &[f64], params: &VersineParams) -> Result<VersineOutput> {
    let (p_pts, q_pts) = validate(values, params)?;
    let p = params.chord.forward_m;
    let q = params.chord.backward_m;

    let mut out = VersineOutput {
        values: Vec::with_capacity(values.len()),
        valid: Vec::with_capacity(values.len()),
    };
    for n in 0..values.len() {
        let (v, ok) = versine_sample(values, n, p_pts, q_pts, p, q, params.round_decimals);
        out.values.push(v);
        out.valid.push(ok);
    }
    Ok(out)
}

/// Chunked eccentric versine for long signals.
///
/// Processes `chunk_size` output samples at a time (each chunk reads
/// `max(p_pts, q_pts)` samples of overlap on both sides), reporting
/// progress and checking the cancellation token at every chunk boundary.
/// Output is bit-identical to [`eccentric_versine`].
pub fn eccentric_versine_chunked(
    values: &[f64],
    params: &VersineParams,
    chunk_size: usize,
    mut progress: Option<&mut ProgressFn<'_>>,
    cancel: Option<&CancelToken>,
) -> Result<VersineOutput> {
    let (p_pts, q_pts) = validate(values, params)?;
    let p = params.chord.forward_m;
    let q = params.chord.backward_m;
    let n = values.len();
    let chunk_size = chunk_size.max(1);

    let mut out = VersineOutput {
        values: Vec::with_capacity(n),
        valid: Vec::with_capacity(n),
    };

    let mut start = 0;
    while start < n {
        if let Some(token) = cancel {
            if token.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
        }

        let end = (start + chunk_size).min(n);
        for i in start..end {
            let (v, ok) = versine_sample(values, i, p_pts, q_pts, p, q, params.round_decimals);
            out.values.push(v);
            out.valid.push(ok);
        }

        if let Some(sink) = progress.as_mut() {
            sink(ProgressUpdate {
                current: end,
                total: n,
                message: format!("versine {end} / {n} samples"),
            });
        }
        start = end;
    }
    Ok(out)
}

/// Expected working-set bytes of the chunked computation, so a driver can
/// pre-check available memory: input + output values, validity flags, and
/// the chunk overlap.
pub fn estimate_memory_bytes(n: usize, params: &VersineParams, chunk_size: usize) -> usize {
    let (p_pts, q_pts) = params.chord.points(params.interval_m);
    let overlap = p_pts.max(q_pts);
    2 * n * std::mem::size_of::<f64>()
        + n * std::mem::size_of::<bool>()
        + (chunk_size + 2 * overlap) * std::mem::size_of::<f64>()
}

/// Streaming eccentric versine over a lazy input sequence.
///
/// Keeps a sliding window just large enough to hold both chord neighbors
/// (`p_pts + q_pts + 1` samples) and yields `(value, valid)` in ascending
/// index order as soon as the forward neighbor has been read. One output
/// item is produced per input sample; the tail drains after the input
/// terminates. Bit-identical to the whole-array computation.
pub struct StreamingVersine<I: Iterator<Item = f64>> {
    input: I,
    buffer: VecDeque<f64>,
    /// Absolute index of `buffer[0]`.
    head: usize,
    /// Next output index.
    next_out: usize,
    /// Total samples read so far.
    total_in: usize,
    input_done: bool,
    p: f64,
    q: f64,
    p_pts: usize,
    q_pts: usize,
    decimals: u32,
}

impl<I: Iterator<Item = f64>> StreamingVersine<I> {
    pub fn new(input: I, params: &VersineParams) -> Self {
        let (p_pts, q_pts) = params.chord.points(params.interval_m);
        StreamingVersine {
            input,
            buffer: VecDeque::with_capacity(p_pts + q_pts + 2),
            head: 0,
            next_out: 0,
            total_in: 0,
            input_done: false,
            p: params.chord.forward_m,
            q: params.chord.backward_m,
            p_pts,
            q_pts,
            decimals: params.round_decimals,
        }
    }

    fn fill_to(&mut self, needed: usize) {
        while !self.input_done && self.total_in <= needed {
            match self.input.next() {
                Some(v) => {
                    self.buffer.push_back(v);
                    self.total_in += 1;
                }
                None => self.input_done = true,
            }
        }
    }
}

impl<I: Iterator<Item = f64>> Iterator for StreamingVersine<I> {
    type Item = (f64, bool);

    fn next(&mut self) -> Option<(f64, bool)> {
        let n = self.next_out;
        // The forward neighbor must be in-window, or the input exhausted.
        self.fill_to(n + self.p_pts);
        if n >= self.total_in {
            return None;
        }

        let has_back = n >= self.q_pts;
        let has_fwd = n + self.p_pts < self.total_in;
        let item = if has_back && has_fwd {
            let back = self.buffer[n - self.q_pts - self.head];
            let center = self.buffer[n - self.head];
            let fwd = self.buffer[n + self.p_pts - self.head];
            let chord = (self.p * back + self.q * fwd) / (self.p + self.q);
            (round_to(center - chord, self.decimals), true)
        } else {
            (0.0, false)
        };

        self.next_out += 1;
        // Drop samples the backward arm can no longer reach.
        while self.head < self.next_out.saturating_sub(self.q_pts) {
            self.buffer.pop_front();
            self.head += 1;
        }
        Some(item)
    }
}
