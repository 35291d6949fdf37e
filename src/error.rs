//! Error types shared across the restoration engine.
//!
//! Errors are serialized as tagged JSON objects so the TypeScript drivers
//! can switch on them as a discriminated union. Plan-line infeasibility and
//! work-section validation results are data, not errors (see `planline` and
//! `worksection`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine error taxonomy. Each variant names the operation family that
/// raises it; recoverability is the driver's concern.
///
/// Serializes with a `name` discriminator field, e.g.
/// `{ "name": "InvalidLength", "len": 100 }`.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum EngineError {
    /// FFT length is not a positive power of two. Programmer error.
    #[error("FFT length {len} is not a positive power of two")]
    InvalidLength { len: usize },

    /// Restoration band is degenerate or violates Nyquist
    /// (`lower >= upper`, or either bound <= 2 * interval).
    #[error("invalid restoration band {lower_m}..{upper_m} m at {interval_m} m interval")]
    InvalidBand {
        lower_m: f64,
        upper_m: f64,
        interval_m: f64,
    },

    /// Signal too short for the chord geometry
    /// (needs at least `p_pts + q_pts + 1` samples).
    #[error("signal has {len} samples but the chord geometry needs {required}")]
    InsufficientSamples { len: usize, required: usize },

    /// Hand segment cannot fit any lag window inside the reference.
    /// The driver may widen the buffer and retry.
    #[error("segment at {kp_m} m fits no lag window in the reference")]
    OutOfRange { kp_m: f64 },

    /// Multi-segment fusion needs at least two matched segments.
    #[error("segment fusion needs at least 2 segments, got {got}")]
    InsufficientSegments { got: usize },

    /// Cooperative cancellation observed between chunks. No partial result.
    #[error("operation cancelled")]
    Cancelled,

    /// Non-finite sample (NaN or infinity) at the entry of an operation.
    #[error("non-finite input value at sample {index}")]
    InvalidInput { index: usize },

    /// I/O failure in the plan-line import/export surface.
    #[error("IO error: {message}")]
    Io { message: String },

    /// Malformed plan-line CSV/JSON.
    #[error("parse error: {message}")]
    Parse { message: String },
}

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        EngineError::Io {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for EngineError {
    fn from(error: csv::Error) -> Self {
        EngineError::Parse {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        EngineError::Parse {
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Scan for NaN/Inf before an operation touches the data.
pub(crate) fn check_finite(values: &[f64]) -> Result<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(EngineError::InvalidInput { index }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_name_discriminator() {
        let err = EngineError::InvalidLength { len: 100 };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains(r#""name":"InvalidLength"#));
        assert!(json.contains(r#""len":100"#));
    }

    #[test]
    fn round_trips_through_json() {
        let err = EngineError::InsufficientSamples {
            len: 10,
            required: 41,
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: EngineError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn check_finite_reports_first_bad_index() {
        assert_eq!(check_finite(&[1.0, 2.0, 3.0]), Ok(()));
        assert_eq!(
            check_finite(&[1.0, f64::NAN, f64::INFINITY]),
            Err(EngineError::InvalidInput { index: 1 })
        );
    }
}
