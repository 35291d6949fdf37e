//! Statistics kernel: summary statistics, sigma-threshold outlier
//! detection, and the linear smoothing filters offered to drivers.
//!
//! All filters preserve length. The first and last `w/2` samples follow the
//! repeat-endpoint boundary policy (indices clamped to the signal).

use crate::error::{check_finite, EngineError, Result};
use serde::{Deserialize, Serialize};

/// Summary statistics of a signal. Sigma is the population deviation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalStats {
    pub mean: f64,
    pub sigma: f64,
    pub rms: f64,
    pub min: f64,
    pub max: f64,
}

impl SignalStats {
    pub fn compute(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(EngineError::InvalidInput { index: 0 });
        }
        check_finite(values)?;

        let n = values.len() as f64;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in values {
            sum += v;
            sum_sq += v * v;
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
            }
        }
        let mean = sum / n;
        let variance = (sum_sq / n - mean * mean).max(0.0);
        Ok(SignalStats {
            mean,
            sigma: variance.sqrt(),
            rms: (sum_sq / n).sqrt(),
            min,
            max,
        })
    }
}

/// Which side of the mean an outlier sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutlierClass {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outlier {
    pub index: usize,
    pub value: f64,
    /// Signed deviation in sigmas: `(value - mean) / sigma`.
    pub deviation: f64,
    pub class: OutlierClass,
}

/// Indices where `|y - mean| > threshold_mul * sigma`. A constant signal
/// (sigma = 0) has no outliers.
pub fn detect_outliers(values: &[f64], threshold_mul: f64) -> Result<Vec<Outlier>> {
    let stats = SignalStats::compute(values)?;
    if stats.sigma == 0.0 {
        return Ok(Vec::new());
    }
    let limit = threshold_mul * stats.sigma;
    Ok(values
        .iter()
        .enumerate()
        .filter(|(_, &v)| (v - stats.mean).abs() > limit)
        .map(|(index, &value)| Outlier {
            index,
            value,
            deviation: (value - stats.mean) / stats.sigma,
            class: if value > stats.mean {
                OutlierClass::High
            } else {
                OutlierClass::Low
            },
        })
        .collect())
}

/// Smoothing filter selection, as a typed record (the chart layer keys on
/// the serialized tag).
///
/// Window restrictions follow the documented sets: moving averages take
/// odd windows 3/5/7/9, median 3/5, Savitzky-Golay 5/7. A window outside
/// its set fails with `InvalidLength`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SmoothingMethod {
    MovingAverage { window: usize },
    WeightedMovingAverage { window: usize },
    Gaussian { window: usize },
    Median { window: usize },
    Exponential { alpha: f64 },
    SavitzkyGolay { window: usize },
}

impl SmoothingMethod {
    pub fn apply(&self, values: &[f64]) -> Result<Vec<f64>> {
        check_finite(values)?;
        if values.is_empty() {
            return Ok(Vec::new());
        }
        match *self {
            SmoothingMethod::MovingAverage { window } => {
                require_window(window, &[3, 5, 7, 9])?;
                Ok(weighted_window(values, &vec![1.0; window]))
            }
            SmoothingMethod::WeightedMovingAverage { window } => {
                require_window(window, &[3, 5, 7, 9])?;
                Ok(weighted_window(values, &triangular_weights(window)))
            }
            SmoothingMethod::Gaussian { window } => {
                require_window(window, &[3, 5, 7, 9])?;
                Ok(weighted_window(values, &gaussian_weights(window)))
            }
            SmoothingMethod::Median { window } => {
                require_window(window, &[3, 5])?;
                Ok(median_window(values, window))
            }
            SmoothingMethod::Exponential { alpha } => {
                if !(alpha > 0.0 && alpha <= 1.0) {
                    return Err(EngineError::InvalidInput { index: 0 });
                }
                Ok(exponential(values, alpha))
            }
            SmoothingMethod::SavitzkyGolay { window } => {
                require_window(window, &[5, 7])?;
                // Quadratic least-squares coefficients for the two windows.
                let weights: &[f64] = match window {
                    5 => &[-3.0, 12.0, 17.0, 12.0, -3.0],
                    _ => &[-2.0, 3.0, 6.0, 7.0, 6.0, 3.0, -2.0],
                };
                Ok(weighted_window(values, weights))
            }
        }
    }
}

fn require_window(window: usize, allowed: &[usize]) -> Result<()> {
    if allowed.contains(&window) {
        Ok(())
    } else {
        Err(EngineError::InvalidLength { len: window })
    }
}

fn triangular_weights(window: usize) -> Vec<f64> {
    let half = window / 2;
    (0..window)
        .map(|i| (half + 1) as f64 - (i as f64 - half as f64).abs())
        .collect()
}

fn gaussian_weights(window: usize) -> Vec<f64> {
    let half = (window / 2) as f64;
    let sigma = (half / 2.0).max(0.5);
    (0..window)
        .map(|i| {
            let x = i as f64 - half;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect()
}

/// Symmetric FIR pass with repeat-endpoint boundary; weights are
/// normalized by their sum.
fn weighted_window(values: &[f64], weights: &[f64]) -> Vec<f64> {
    let n = values.len() as isize;
    let half = (weights.len() / 2) as isize;
    let total: f64 = weights.iter().sum();
    (0..n)
        .map(|i| {
            let mut acc = 0.0;
            for (j, &w) in weights.iter().enumerate() {
                let idx = (i + j as isize - half).clamp(0, n - 1);
                acc += w * values[idx as usize];
            }
            acc / total
        })
        .collect()
}

fn median_window(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len() as isize;
    let half = (window / 2) as isize;
    let mut scratch = Vec::with_capacity(window);
    (0..n)
        .map(|i| {
            scratch.clear();
            for j in -half..=half {
                let idx = (i + j).clamp(0, n - 1);
                scratch.push(values[idx as usize]);
            }
            scratch.sort_by(|a, b| a.partial_cmp(b).unwrap());
            scratch[window / 2]
        })
        .collect()
}

fn exponential(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut state = values[0];
    for &v in values {
        state = alpha * v + (1.0 - alpha) * state;
        out.push(state);
    }
    out
}
