//! Core data model: sampled track-geometry signals, measurement channels,
//! and the typed parameter set recognized by the engine.
//!
//! A [`Signal`] is immutable after construction; every pipeline stage
//! consumes signals by reference and produces new ones. Positions along the
//! line are kilometer points in meters; sample lookup is always index-based,
//! with kilometer points derived as `start_kp_m + i * interval_m`.

use crate::error::{check_finite, EngineError, Result};
use crate::movement::{CorrectionMode, MttType};
use serde::{Deserialize, Serialize};

/// Rail side for the paired channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// Measurement channel tag. Default parameter tables key on the
/// [`ChannelKind`] this collapses to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Level(Side),
    Alignment(Side),
    Gauge,
    CrossLevel,
    Twist,
    Cant,
}

/// Channel family, ignoring side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    Level,
    Alignment,
    Gauge,
    CrossLevel,
    Twist,
    Cant,
}

impl Channel {
    pub fn kind(&self) -> ChannelKind {
        match self {
            Channel::Level(_) => ChannelKind::Level,
            Channel::Alignment(_) => ChannelKind::Alignment,
            Channel::Gauge => ChannelKind::Gauge,
            Channel::CrossLevel => ChannelKind::CrossLevel,
            Channel::Twist => ChannelKind::Twist,
            Channel::Cant => ChannelKind::Cant,
        }
    }

    /// Vertical channels take the cant post-correction; lateral ones take
    /// the slack post-correction.
    pub fn is_vertical(&self) -> bool {
        matches!(self.kind(), ChannelKind::Level | ChannelKind::CrossLevel)
    }

    pub fn is_lateral(&self) -> bool {
        matches!(self.kind(), ChannelKind::Alignment | ChannelKind::Gauge)
    }
}

/// One record from an input measurement stream (§ external interfaces).
/// Irregularity values are millimeters; cant geometry is meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub kp_m: f64,
    pub value: f64,
}

/// A finite, evenly sampled sequence of geometry values along the line.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    values: Vec<f64>,
    interval_m: f64,
    start_kp_m: f64,
}

impl Signal {
    /// Build a signal, validating `N >= 1`, `interval > 0`, finite samples.
    pub fn new(values: Vec<f64>, interval_m: f64, start_kp_m: f64) -> Result<Self> {
        if values.is_empty() || !(interval_m > 0.0) || !interval_m.is_finite() {
            return Err(EngineError::InvalidInput { index: 0 });
        }
        check_finite(&values)?;
        Ok(Signal {
            values,
            interval_m,
            start_kp_m,
        })
    }

    /// Build from an ordered record stream at a known interval; the first
    /// record sets the start kilometer point and values are taken in order.
    pub fn from_records(records: &[MeasurementRecord], interval_m: f64) -> Result<Self> {
        let start = records.first().map(|r| r.kp_m).unwrap_or(0.0);
        Signal::new(
            records.iter().map(|r| r.value).collect(),
            interval_m,
            start,
        )
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        false // N >= 1 by construction
    }

    pub fn interval_m(&self) -> f64 {
        self.interval_m
    }

    pub fn start_kp_m(&self) -> f64 {
        self.start_kp_m
    }

    /// Kilometer point of sample `i`.
    pub fn kp_at(&self, i: usize) -> f64 {
        self.start_kp_m + i as f64 * self.interval_m
    }

    /// Nearest sample index for a kilometer point (may fall outside the
    /// signal; callers bound-check against `len`).
    pub fn index_of(&self, kp_m: f64) -> isize {
        ((kp_m - self.start_kp_m) / self.interval_m).round() as isize
    }

    /// Derive a same-grid signal with new values. Lengths must match.
    pub fn with_values(&self, values: Vec<f64>) -> Result<Self> {
        debug_assert_eq!(values.len(), self.values.len());
        Signal::new(values, self.interval_m, self.start_kp_m)
    }
}

fn default_interval() -> f64 {
    0.25
}

/// Every parameter the engine recognizes, as one typed record (no
/// bag-of-properties at the boundary). `Default` gives the documented
/// defaults; band bounds left `None` fall back to the per-channel table in
/// `restoration`.
///
/// `cant_coeff` is honored on `[0, 1]` and `slack_coeff` on `[0, 0.5]`;
/// values outside are clamped at the point of use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineParams {
    /// Restoration band lower bound, meters of wavelength.
    pub lambda_lower_m: Option<f64>,
    /// Restoration band upper bound, meters of wavelength.
    pub lambda_upper_m: Option<f64>,
    /// Sample spacing, meters.
    pub data_interval_m: f64,
    /// Forward chord arm of the recording car, meters.
    pub chord_forward_m: f64,
    /// Backward chord arm of the recording car, meters.
    pub chord_backward_m: f64,
    /// Correlation search half-range, meters.
    pub search_range_m: f64,
    /// Correlation lag step, meters.
    pub step_m: f64,
    /// Minimum acceptable correlation.
    pub correlation_threshold: f64,
    /// Outlier threshold factor (multiples of sigma).
    pub sigma_mul: f64,
    /// Cant correction coefficient, [0, 1].
    pub cant_coeff: f64,
    /// Slack correction coefficient, [0, 0.5].
    pub slack_coeff: f64,
    pub correction_mode: CorrectionMode,
    /// Machine type; required when `correction_mode` is `Mtt`.
    pub mtt_type: Option<MttType>,
    /// Default upward movement limit, millimeters.
    pub up_limit_mm: f64,
    /// Default downward movement limit, millimeters.
    pub down_limit_mm: f64,
    /// Minimum clearance from WB-zone boundaries, meters.
    pub wb_safety_margin_m: f64,
    /// Buffer beyond the work section, meters.
    pub buffer_m: f64,
}

impl Default for EngineParams {
    fn default() -> Self {
        EngineParams {
            lambda_lower_m: None,
            lambda_upper_m: None,
            data_interval_m: default_interval(),
            chord_forward_m: 2.5,
            chord_backward_m: 7.5,
            search_range_m: 20.0,
            step_m: 0.25,
            correlation_threshold: 0.7,
            sigma_mul: 3.0,
            cant_coeff: 0.15,
            slack_coeff: 0.08,
            correction_mode: CorrectionMode::None,
            mtt_type: None,
            up_limit_mm: 6.0,
            down_limit_mm: 2.0,
            wb_safety_margin_m: 50.0,
            buffer_m: 500.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_rejects_empty_and_bad_interval() {
        assert!(Signal::new(vec![], 0.25, 0.0).is_err());
        assert!(Signal::new(vec![1.0], 0.0, 0.0).is_err());
        assert!(Signal::new(vec![1.0], -0.25, 0.0).is_err());
    }

    #[test]
    fn signal_rejects_non_finite_samples() {
        let err = Signal::new(vec![0.0, f64::NAN], 0.25, 0.0).unwrap_err();
        assert_eq!(err, EngineError::InvalidInput { index: 1 });
    }

    #[test]
    fn kp_and_index_are_inverse() {
        let s = Signal::new(vec![0.0; 100], 0.25, 1000.0).unwrap();
        assert_eq!(s.kp_at(0), 1000.0);
        assert_eq!(s.kp_at(40), 1010.0);
        assert_eq!(s.index_of(1010.0), 40);
        assert_eq!(s.index_of(1010.1), 40); // nearest
        assert_eq!(s.index_of(999.0), -4); // before the start
    }

    #[test]
    fn from_records_takes_start_from_first_record() {
        let records = vec![
            MeasurementRecord { kp_m: 2500.0, value: 1.5 },
            MeasurementRecord { kp_m: 2500.25, value: -0.5 },
        ];
        let s = Signal::from_records(&records, 0.25).unwrap();
        assert_eq!(s.start_kp_m(), 2500.0);
        assert_eq!(s.values(), &[1.5, -0.5]);
    }

    #[test]
    fn channel_families() {
        assert!(Channel::Level(Side::Left).is_vertical());
        assert!(Channel::CrossLevel.is_vertical());
        assert!(Channel::Alignment(Side::Right).is_lateral());
        assert!(Channel::Gauge.is_lateral());
        assert!(!Channel::Cant.is_vertical());
        assert_eq!(Channel::Level(Side::Right).kind(), ChannelKind::Level);
    }

    #[test]
    fn params_default_matches_documented_table() {
        let p = EngineParams::default();
        assert_eq!(p.data_interval_m, 0.25);
        assert_eq!(p.search_range_m, 20.0);
        assert_eq!(p.correlation_threshold, 0.7);
        assert_eq!(p.cant_coeff, 0.15);
        assert_eq!(p.slack_coeff, 0.08);
        assert_eq!(p.wb_safety_margin_m, 50.0);
        assert_eq!(p.buffer_m, 500.0);
    }

    #[test]
    fn params_round_trip_json() {
        let p = EngineParams::default();
        let json = serde_json::to_string(&p).unwrap();
        let back: EngineParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
