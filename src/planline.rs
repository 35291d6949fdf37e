//! Plan-line solver: derives the target geometry from a restored waveform
//! under the upward-preferred policy (minimize downward rail movement to
//! protect the ballast bed), honoring fixed points and movement limits.
//!
//! The solve runs in numbered stages over per-index envelopes:
//!
//! 1. Build the movement envelope `[restored - down, restored + up]` from
//!    the default limits and any tightened regions.
//! 2. Size the global raise from the dip arcs between zero crossings of
//!    the restored waveform (deep dips set how far the line must come up).
//! 3. Raise the plan by that amount, capping locally where the envelope is
//!    tighter.
//! 4. Pin fixed points exactly and bridge linearly back into the raised
//!    plan, widening each bridge as far as the envelope allows.
//! 5. Optionally smooth with the symmetric `[1,2,3,2,1]/9` window, never
//!    across a fixed point, and re-clamp to the envelope.
//!
//! An index whose pin cannot sit inside the envelope is reported in
//! `infeasible` rather than raised.

use crate::error::{check_finite, EngineError, Result};
use crate::worksection::{LimitDirection, LimitRegion};
use serde::{Deserialize, Serialize};

/// Widest half-width of a fixed-point bridge, samples.
const MAX_BRIDGE_HALF_WIDTH: usize = 25;

/// An index pinned to a prescribed plan value (bridge deck, turnout).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedPoint {
    pub index: usize,
    pub value_mm: f64,
}

/// Plan-line configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Default upward movement limit, millimeters.
    pub up_limit_mm: f64,
    /// Default downward movement limit, millimeters.
    pub down_limit_mm: f64,
    pub fixed_points: Vec<FixedPoint>,
    pub limit_regions: Vec<LimitRegion>,
    /// Apply the window-5 smoothing pass.
    pub smoothing: bool,
}

impl Default for PlanConfig {
    fn default() -> Self {
        PlanConfig {
            up_limit_mm: 6.0,
            down_limit_mm: 2.0,
            fixed_points: Vec::new(),
            limit_regions: Vec::new(),
            smoothing: false,
        }
    }
}

/// Solver output. `plan` is aligned 1:1 with the restored waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanLineResult {
    pub plan: Vec<f64>,
    /// Indices where no plan value can satisfy both the pin and the
    /// movement envelope.
    pub infeasible: Vec<usize>,
    /// Fraction of samples moved upward.
    pub upward_ratio: f64,
}

/// Solve the plan line for a restored waveform.
pub fn solve_plan_line(restored: &[f64], config: &PlanConfig) -> Result<PlanLineResult> {
    check_finite(restored)?;
    let n = restored.len();
    if n == 0 {
        return Err(EngineError::InvalidInput { index: 0 });
    }
    for fp in &config.fixed_points {
        if fp.index >= n {
            return Err(EngineError::InvalidInput { index: fp.index });
        }
    }

    // 1. Per-index envelope.
    let mut up = vec![config.up_limit_mm; n];
    let mut down = vec![config.down_limit_mm; n];
    for region in &config.limit_regions {
        let end = region.end_index.min(n - 1);
        for i in region.start_index..=end {
            match region.direction {
                LimitDirection::Up => up[i] = up[i].min(region.limit_mm),
                LimitDirection::Down => down[i] = down[i].min(region.limit_mm),
                LimitDirection::Lateral => {}
            }
        }
    }

    // 2. Global raise from the dip arcs: each arc between zero crossings
    // that dips below the zero line wants the plan lifted to its depth.
    let mut raise: f64 = 0.0;
    let mut arc_min: f64 = 0.0;
    let mut prev_negative = false;
    for (i, &v) in restored.iter().enumerate() {
        let negative = v < 0.0;
        if negative != prev_negative || i == 0 {
            raise = raise.max(-arc_min);
            arc_min = 0.0;
            prev_negative = negative;
        }
        if negative {
            arc_min = arc_min.min(v);
        }
    }
    raise = raise.max(-arc_min).max(0.0);

    // 3. Raised plan, capped where the envelope is tighter.
    let mut plan: Vec<f64> = (0..n).map(|i| restored[i] + raise.min(up[i])).collect();

    // 4. Fixed points: pin and bridge.
    let mut infeasible: Vec<usize> = Vec::new();
    let mut fixed_points = config.fixed_points.clone();
    fixed_points.sort_by_key(|fp| fp.index);
    fixed_points.dedup_by_key(|fp| fp.index);

    for (pos, fp) in fixed_points.iter().enumerate() {
        let i = fp.index;
        plan[i] = fp.value_mm;
        let dev = fp.value_mm - restored[i];
        if dev > up[i] + 1e-12 || dev < -(down[i] + 1e-12) {
            infeasible.push(i);
        }

        // Bridge half-width may not reach the neighboring fixed points.
        let left_room = match pos.checked_sub(1).map(|p| fixed_points[p].index) {
            Some(prev) => (i - prev) / 2,
            None => i,
        };
        let right_room = match fixed_points.get(pos + 1).map(|next| next.index) {
            Some(next) => (next - i) / 2,
            None => n - 1 - i,
        };

        bridge(&mut plan, restored, &up, &down, i, left_room, true);
        bridge(&mut plan, restored, &up, &down, i, right_room, false);
    }

    // 5. Optional smoothing between fixed points, re-clamped to the
    // envelope afterwards.
    if config.smoothing {
        smooth_between_fixed_points(&mut plan, &fixed_points);
        for i in 0..n {
            if fixed_points.iter().all(|fp| fp.index != i) {
                plan[i] = plan[i].clamp(restored[i] - down[i], restored[i] + up[i]);
            }
        }
    }

    infeasible.sort_unstable();
    infeasible.dedup();
    let upward = plan
        .iter()
        .zip(restored.iter())
        .filter(|(p, r)| *p - *r > 0.0)
        .count();

    Ok(PlanLineResult {
        plan,
        infeasible,
        upward_ratio: upward as f64 / n as f64,
    })
}

/// Linear bridge from a pinned index back into the surrounding plan: the
/// widest half-width whose ramp stays inside the envelope wins (half-width
/// 1 has no interior and always fits).
fn bridge(
    plan: &mut [f64],
    restored: &[f64],
    up: &[f64],
    down: &[f64],
    pin: usize,
    room: usize,
    leftward: bool,
) {
    let max_w = room.min(MAX_BRIDGE_HALF_WIDTH);
    if max_w < 2 {
        return;
    }
    let pinned = plan[pin];

    'widths: for w in (2..=max_w).rev() {
        let anchor = if leftward { pin - w } else { pin + w };
        let anchor_value = plan[anchor];
        // Interior samples of the candidate ramp.
        for step in 1..w {
            let i = if leftward { pin - step } else { pin + step };
            let t = step as f64 / w as f64;
            let candidate = pinned + (anchor_value - pinned) * t;
            let dev = candidate - restored[i];
            if dev > up[i] || dev < -down[i] {
                continue 'widths;
            }
        }
        // Commit this width.
        for step in 1..w {
            let i = if leftward { pin - step } else { pin + step };
            let t = step as f64 / w as f64;
            plan[i] = pinned + (anchor_value - pinned) * t;
        }
        return;
    }
}

/// One pass of the symmetric `[1,2,3,2,1]/9` average, applied separately
/// to each stretch between fixed points so the pins never move.
fn smooth_between_fixed_points(plan: &mut [f64], fixed_points: &[FixedPoint]) {
    const WEIGHTS: [f64; 5] = [1.0, 2.0, 3.0, 2.0, 1.0];
    let n = plan.len();

    let mut boundaries: Vec<usize> = fixed_points.iter().map(|fp| fp.index).collect();
    boundaries.push(0);
    boundaries.push(n - 1);
    boundaries.sort_unstable();
    boundaries.dedup();

    let snapshot = plan.to_vec();
    let fixed = |i: usize| fixed_points.iter().any(|fp| fp.index == i);

    for pair in boundaries.windows(2) {
        let (seg_start, seg_end) = (pair[0], pair[1]);
        for i in seg_start..=seg_end {
            if fixed(i) {
                continue;
            }
            let mut acc = 0.0;
            for (j, &w) in WEIGHTS.iter().enumerate() {
                let idx = (i as isize + j as isize - 2)
                    .clamp(seg_start as isize, seg_end as isize) as usize;
                acc += w * snapshot[idx];
            }
            plan[i] = acc / 9.0;
        }
    }
}
