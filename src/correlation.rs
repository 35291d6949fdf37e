//! Correlation matcher: aligns sparse hand-measured segments to a restored
//! waveform by scanning a lag window for maximum normalized
//! cross-correlation, then fuses per-segment offsets into one global
//! offset.
//!
//! Hand segments are resampled to the reference grid by linear
//! interpolation before matching. Lags whose window leaves the reference,
//! or whose window is constant (zero denominator), are skipped.

use crate::error::{check_finite, EngineError, Result};
use crate::signal::{Channel, Signal};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// A contiguous manually-measured strip, typically <= 25 m at 1 m spacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandSegment {
    /// Nominal kilometer point of the first value, meters.
    pub start_kp_m: f64,
    /// Spacing of the hand measurements, meters.
    pub spacing_m: f64,
    pub values: Vec<f64>,
    pub channel: Channel,
}

/// Matcher parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchParams {
    /// Search half-range, meters of lag either side of the nominal position.
    pub search_range_m: f64,
    /// Lag step, meters.
    pub step_m: f64,
    /// Minimum correlation considered usable.
    pub threshold: f64,
}

impl Default for MatchParams {
    fn default() -> Self {
        MatchParams {
            search_range_m: 20.0,
            step_m: 0.25,
            threshold: 0.7,
        }
    }
}

/// Match quality, classified from the best correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchQuality {
    Excellent,
    VeryGood,
    Good,
    Acceptable,
    Poor,
    Unacceptable,
}

impl MatchQuality {
    pub fn classify(rho: f64) -> Self {
        if rho >= 0.95 {
            MatchQuality::Excellent
        } else if rho >= 0.9 {
            MatchQuality::VeryGood
        } else if rho >= 0.8 {
            MatchQuality::Good
        } else if rho >= 0.7 {
            MatchQuality::Acceptable
        } else if rho >= 0.5 {
            MatchQuality::Poor
        } else {
            MatchQuality::Unacceptable
        }
    }
}

/// One scanned lag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LagSample {
    pub offset_m: f64,
    pub correlation: f64,
}

/// Result of matching one hand segment against the reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub best_offset_m: f64,
    pub best_correlation: f64,
    pub quality: MatchQuality,
    pub series: Vec<LagSample>,
    pub recommendations: Vec<String>,
}

/// Resample the segment to the reference grid by linear interpolation.
fn resample(segment: &HandSegment, interval_m: f64) -> Vec<f64> {
    let k = segment.values.len();
    if k < 2 {
        return segment.values.clone();
    }
    let span = (k - 1) as f64 * segment.spacing_m;
    let out_len = (span / interval_m).floor() as usize + 1;
    (0..out_len)
        .map(|j| {
            let pos = j as f64 * interval_m / segment.spacing_m;
            let i0 = (pos.floor() as usize).min(k - 2);
            let frac = pos - i0 as f64;
            segment.values[i0] + (segment.values[i0 + 1] - segment.values[i0]) * frac
        })
        .collect()
}

/// Normalized cross-correlation of two equal-length windows. `None` when a
/// window is constant.
fn normalized_correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len() as f64;
    let mean_a: f64 = a.iter().sum::<f64>() / n;
    let mean_b: f64 = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let da = x - mean_a;
        let db = y - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a * var_b).sqrt())
}

/// Match one hand segment against the reference waveform.
pub fn match_segment(
    reference: &Signal,
    segment: &HandSegment,
    params: &MatchParams,
) -> Result<MatchResult> {
    check_finite(&segment.values)?;
    let interval = reference.interval_m();
    let resampled = resample(segment, interval);
    if resampled.is_empty() {
        return Err(EngineError::OutOfRange {
            kp_m: segment.start_kp_m,
        });
    }

    let idx_h = reference.index_of(segment.start_kp_m);
    let n = reference.len() as isize;
    let k = resampled.len() as isize;
    let steps = (params.search_range_m / params.step_m).floor() as isize;

    let mut series = Vec::new();
    let mut best: Option<LagSample> = None;

    for step in -steps..=steps {
        let offset_m = step as f64 * params.step_m;
        let lag_pts = (offset_m / interval).round() as isize;
        let start = idx_h + lag_pts;
        if start < 0 || start + k > n {
            continue; // window leaves the reference
        }
        let window = &reference.values()[start as usize..(start + k) as usize];
        let Some(rho) = normalized_correlation(&resampled, window) else {
            continue; // constant window
        };
        let sample = LagSample {
            offset_m,
            correlation: rho,
        };
        series.push(sample);
        if best.map_or(true, |b| rho > b.correlation) {
            best = Some(sample);
        }
    }

    let best = best.ok_or(EngineError::OutOfRange {
        kp_m: segment.start_kp_m,
    })?;
    let quality = MatchQuality::classify(best.correlation);
    let recommendations =
        recommendations_for(quality, best.offset_m, params.search_range_m);

    Ok(MatchResult {
        best_offset_m: best.offset_m,
        best_correlation: best.correlation,
        quality,
        series,
        recommendations,
    })
}

/// Match several segments independently. With the `parallel` feature the
/// segments run on the rayon pool; results keep input order either way.
pub fn match_segments(
    reference: &Signal,
    segments: &[HandSegment],
    params: &MatchParams,
) -> Vec<Result<MatchResult>> {
    #[cfg(feature = "parallel")]
    {
        segments
            .par_iter()
            .map(|s| match_segment(reference, s, params))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        segments
            .iter()
            .map(|s| match_segment(reference, s, params))
            .collect()
    }
}

/// Fixed recommendation table, keyed on quality and on the best offset
/// exceeding half the search range.
fn recommendations_for(quality: MatchQuality, offset_m: f64, search_range_m: f64) -> Vec<String> {
    let mut out = Vec::new();
    out.push(
        match quality {
            MatchQuality::Excellent | MatchQuality::VeryGood => {
                "Alignment accepted; no adjustment needed."
            }
            MatchQuality::Good => "Alignment acceptable; spot-check the segment endpoints.",
            MatchQuality::Acceptable => {
                "Correlation is marginal; verify the hand-measurement positions."
            }
            MatchQuality::Poor => {
                "Correlation is poor; re-measure the segment or widen the search range."
            }
            MatchQuality::Unacceptable => "No usable alignment; the segment was not applied.",
        }
        .to_string(),
    );
    if offset_m.abs() > search_range_m / 2.0 {
        out.push(format!(
            "Best offset {offset_m:.2} m exceeds half the search range; check the nominal kilometer points."
        ));
    }
    out
}

/// Fused alignment of several matched segments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    /// Correlation-weighted mean of the per-segment offsets, meters.
    pub global_offset_m: f64,
    /// Population deviation of the per-segment residuals, meters.
    pub residual_std_dev_m: f64,
    pub average_correlation: f64,
}

/// Fuse per-segment matches into a global offset. Needs at least two
/// segments.
pub fn fuse_matches(matches: &[MatchResult]) -> Result<FusionResult> {
    if matches.len() < 2 {
        return Err(EngineError::InsufficientSegments { got: matches.len() });
    }

    let weight: f64 = matches.iter().map(|m| m.best_correlation).sum();
    let global_offset_m = matches
        .iter()
        .map(|m| m.best_correlation * m.best_offset_m)
        .sum::<f64>()
        / weight;

    let residual_var = matches
        .iter()
        .map(|m| {
            let r = m.best_offset_m - global_offset_m;
            r * r
        })
        .sum::<f64>()
        / matches.len() as f64;

    let average_correlation =
        matches.iter().map(|m| m.best_correlation).sum::<f64>() / matches.len() as f64;

    Ok(FusionResult {
        global_offset_m,
        residual_std_dev_m: residual_var.sqrt(),
        average_correlation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Side;

    const INTERVAL: f64 = 0.25;

    /// Mixed-tone reference with a unique correlation structure.
    fn reference(n: usize) -> Signal {
        let values: Vec<f64> = (0..n)
            .map(|i| {
                let d = i as f64 * INTERVAL;
                (2.0 * std::f64::consts::PI * d / 18.0).sin()
                    + 0.6 * (2.0 * std::f64::consts::PI * d / 7.0).sin()
                    + 0.3 * (2.0 * std::f64::consts::PI * d / 43.0).cos()
            })
            .collect();
        Signal::new(values, INTERVAL, 0.0).unwrap()
    }

    /// Segment copied sample-for-sample from the reference grid.
    fn segment_on_grid(reference: &Signal, start_idx: usize, count: usize) -> HandSegment {
        HandSegment {
            start_kp_m: reference.kp_at(start_idx),
            spacing_m: INTERVAL,
            values: reference.values()[start_idx..start_idx + count].to_vec(),
            channel: Channel::Level(Side::Left),
        }
    }

    /// Hand segment sampled from the reference at 1 m spacing, so matching
    /// goes through the interpolating resampler.
    fn segment_hand(reference: &Signal, start_idx: usize, count: usize) -> HandSegment {
        let stride = (1.0 / INTERVAL) as usize;
        HandSegment {
            start_kp_m: reference.kp_at(start_idx),
            spacing_m: 1.0,
            values: (0..count)
                .map(|j| reference.values()[start_idx + j * stride])
                .collect(),
            channel: Channel::Level(Side::Left),
        }
    }

    #[test]
    fn self_match_is_perfect_at_zero_offset() {
        let r = reference(4000);
        let seg = segment_on_grid(&r, 1000, 101);
        let result = match_segment(&r, &seg, &MatchParams::default()).unwrap();
        assert_eq!(result.best_offset_m, 0.0);
        assert!((result.best_correlation - 1.0).abs() < 1e-12);
        assert_eq!(result.quality, MatchQuality::Excellent);
    }

    #[test]
    fn hand_spacing_segment_still_matches_at_zero() {
        let r = reference(4000);
        let seg = segment_hand(&r, 1000, 26);
        let result = match_segment(&r, &seg, &MatchParams::default()).unwrap();
        assert_eq!(result.best_offset_m, 0.0);
        assert!(result.best_correlation > 0.99);
        assert_eq!(result.quality, MatchQuality::Excellent);
    }

    #[test]
    fn declared_position_error_appears_as_offset() {
        let r = reference(4000);
        let mut seg = segment_hand(&r, 1000, 26);
        // The data actually sits 3.25 m beyond the declared position.
        seg.start_kp_m -= 3.25;
        let result = match_segment(&r, &seg, &MatchParams::default()).unwrap();
        assert!((result.best_offset_m - 3.25).abs() < 0.25 + 1e-12);
        assert!(result.best_correlation > 0.99);
        assert_eq!(result.quality, MatchQuality::Excellent);
    }

    #[test]
    fn shifting_the_reference_shifts_the_offset_exactly() {
        let r = reference(4000);
        let seg = segment_on_grid(&r, 1000, 101);
        // Rebasing the reference 2 m later leaves the segment data 2 m
        // beyond its declared position, and nowhere else.
        let shifted = Signal::new(r.values().to_vec(), INTERVAL, 2.0).unwrap();
        let result = match_segment(&shifted, &seg, &MatchParams::default()).unwrap();
        assert!((result.best_offset_m - 2.0).abs() < 1e-12);
        assert!((result.best_correlation - 1.0).abs() < 1e-12);

        // And 2 m earlier flips the sign.
        let shifted = Signal::new(r.values().to_vec(), INTERVAL, -2.0).unwrap();
        let result = match_segment(&shifted, &seg, &MatchParams::default()).unwrap();
        assert!((result.best_offset_m + 2.0).abs() < 1e-12);
    }

    #[test]
    fn inverted_segment_correlates_at_minus_one() {
        let r = reference(4000);
        let mut seg = segment_on_grid(&r, 1000, 101);
        for v in seg.values.iter_mut() {
            *v = -*v;
        }
        let result = match_segment(&r, &seg, &MatchParams::default()).unwrap();
        // rho stays within [-1, 1] across the whole series.
        for lag in &result.series {
            assert!(lag.correlation >= -1.0 - 1e-12 && lag.correlation <= 1.0 + 1e-12);
        }
        let at_zero = result
            .series
            .iter()
            .find(|l| l.offset_m == 0.0)
            .unwrap()
            .correlation;
        assert!((at_zero + 1.0).abs() < 1e-12);
    }

    #[test]
    fn segment_outside_reference_is_out_of_range() {
        let r = reference(400); // 100 m of data
        let seg = HandSegment {
            start_kp_m: 5000.0,
            spacing_m: 1.0,
            values: vec![1.0, 2.0, 3.0],
            channel: Channel::Gauge,
        };
        assert!(matches!(
            match_segment(&r, &seg, &MatchParams::default()),
            Err(EngineError::OutOfRange { .. })
        ));
    }

    #[test]
    fn constant_windows_are_skipped() {
        let r = Signal::new(vec![1.0; 400], INTERVAL, 0.0).unwrap();
        let seg = HandSegment {
            start_kp_m: 50.0,
            spacing_m: 1.0,
            values: vec![0.0, 1.0, 0.0, 1.0, 0.0],
            channel: Channel::Gauge,
        };
        // Every window is constant, so no lag produces a correlation.
        assert!(matches!(
            match_segment(&r, &seg, &MatchParams::default()),
            Err(EngineError::OutOfRange { .. })
        ));
    }

    #[test]
    fn quality_thresholds() {
        assert_eq!(MatchQuality::classify(0.97), MatchQuality::Excellent);
        assert_eq!(MatchQuality::classify(0.95), MatchQuality::Excellent);
        assert_eq!(MatchQuality::classify(0.92), MatchQuality::VeryGood);
        assert_eq!(MatchQuality::classify(0.85), MatchQuality::Good);
        assert_eq!(MatchQuality::classify(0.74), MatchQuality::Acceptable);
        assert_eq!(MatchQuality::classify(0.6), MatchQuality::Poor);
        assert_eq!(MatchQuality::classify(0.2), MatchQuality::Unacceptable);
    }

    #[test]
    fn large_offset_adds_a_recommendation() {
        let recs = recommendations_for(MatchQuality::Excellent, 12.0, 20.0);
        assert_eq!(recs.len(), 2);
        assert!(recs[1].contains("half the search range"));
        let recs = recommendations_for(MatchQuality::Excellent, 3.0, 20.0);
        assert_eq!(recs.len(), 1);
    }

    fn match_with(offset: f64, rho: f64) -> MatchResult {
        MatchResult {
            best_offset_m: offset,
            best_correlation: rho,
            quality: MatchQuality::classify(rho),
            series: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    #[test]
    fn fusion_weights_offsets_by_correlation() {
        let matches = [
            match_with(1.00, 0.95),
            match_with(1.25, 0.90),
            match_with(0.75, 0.85),
        ];
        let fused = fuse_matches(&matches).unwrap();
        // (0.95*1.00 + 0.90*1.25 + 0.85*0.75) / 2.70
        assert!((fused.global_offset_m - 2.7125 / 2.70).abs() < 1e-12);
        assert!((fused.residual_std_dev_m - 0.2042).abs() < 1e-3);
        assert!((fused.average_correlation - 0.9).abs() < 1e-12);
    }

    #[test]
    fn fusion_needs_two_segments() {
        assert_eq!(
            fuse_matches(&[match_with(1.0, 0.9)]).unwrap_err(),
            EngineError::InsufficientSegments { got: 1 }
        );
        assert_eq!(
            fuse_matches(&[]).unwrap_err(),
            EngineError::InsufficientSegments { got: 0 }
        );
    }

    #[test]
    fn batch_matching_keeps_order() {
        let r = reference(4000);
        let segments = vec![
            segment_on_grid(&r, 400, 80),
            segment_on_grid(&r, 1200, 80),
            segment_on_grid(&r, 2000, 80),
        ];
        let results = match_segments(&r, &segments, &MatchParams::default());
        assert_eq!(results.len(), 3);
        for result in results {
            let m = result.unwrap();
            assert_eq!(m.best_offset_m, 0.0);
            assert!(m.best_correlation > 0.999);
        }
    }
}
