//! Movement amounts: per-sample corrections a tamping machine applies to
//! reach the plan line, with the MTT chord-to-axle translation and the
//! cant/slack post-corrections.
//!
//! Corrections apply in a fixed order: chord-to-axle translation (when a
//! machine is configured), cant for the vertical channels, slack for the
//! lateral ones, then exactly one correction mode.

use crate::error::{check_finite, EngineError, Result};
use crate::signal::{Channel, ChannelKind, Side, Signal};
use crate::versine::{eccentric_versine, ChordGeometry, VersineParams};
use crate::worksection::{LimitDirection, WorkSection};
use serde::{Deserialize, Serialize};

/// Tamping-machine catalog: chord arms between the B, C and D axles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MttType {
    #[serde(rename = "08-475")]
    Mtt08_475,
    #[serde(rename = "08-275")]
    Mtt08_275,
    #[serde(rename = "09-16")]
    Mtt09_16,
    #[serde(rename = "09-32")]
    Mtt09_32,
    #[serde(rename = "MTT-15")]
    Mtt15,
}

/// Chord geometry of one machine, meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MttConfig {
    pub id: &'static str,
    pub bc_m: f64,
    pub cd_m: f64,
}

impl MttType {
    pub const ALL: [MttType; 5] = [
        MttType::Mtt08_475,
        MttType::Mtt08_275,
        MttType::Mtt09_16,
        MttType::Mtt09_32,
        MttType::Mtt15,
    ];

    pub fn config(&self) -> MttConfig {
        match self {
            MttType::Mtt08_475 => MttConfig {
                id: "08-475",
                bc_m: 3.63,
                cd_m: 9.37,
            },
            MttType::Mtt08_275 => MttConfig {
                id: "08-275",
                bc_m: 3.20,
                cd_m: 8.50,
            },
            MttType::Mtt09_16 => MttConfig {
                id: "09-16",
                bc_m: 7.50,
                cd_m: 7.50,
            },
            MttType::Mtt09_32 => MttConfig {
                id: "09-32",
                bc_m: 8.00,
                cd_m: 8.00,
            },
            MttType::Mtt15 => MttConfig {
                id: "MTT-15",
                bc_m: 10.00,
                cd_m: 10.00,
            },
        }
    }

    /// The machine chord as an eccentric-versine geometry: corrections a
    /// distance `bc` behind carry weight `cd` and vice versa.
    pub fn chord(&self) -> ChordGeometry {
        let cfg = self.config();
        ChordGeometry::new(cfg.cd_m, cfg.bc_m)
    }
}

/// How the final correction term is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionMode {
    /// Movement as-is.
    #[default]
    None,
    /// Curvature-distortion correction: second difference of the plan
    /// scaled by `distortion_coeff`.
    Standard,
    /// The classical triple eccentric versine of the plan line on the
    /// machine chord.
    Mtt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    Up,
    Down,
}

/// One sample of the movement plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementAmount {
    pub movement_mm: f64,
    pub direction: MoveDirection,
    /// Limit applying to this sample and direction, millimeters.
    pub constraint_mm: f64,
    pub is_constrained: bool,
    pub is_wb: bool,
}

/// Correction parameters. `cant_coeff` is honored on `[0, 1]` and
/// `slack_coeff` on `[0, 0.5]`; values outside are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementParams {
    /// Machine whose chord translates head movement to rail movement.
    pub mtt: Option<MttType>,
    pub cant_coeff: f64,
    pub slack_coeff: f64,
    pub correction_mode: CorrectionMode,
    /// Scale of the `Standard` curvature term.
    pub distortion_coeff: f64,
}

impl Default for MovementParams {
    fn default() -> Self {
        MovementParams {
            mtt: None,
            cant_coeff: 0.15,
            slack_coeff: 0.08,
            correction_mode: CorrectionMode::None,
            distortion_coeff: 1.0,
        }
    }
}

/// Translate corrections at the tamping head into rail-axle displacements
/// through the machine chord:
/// `out[i] = ((bc+cd)*m[i] - cd*m[i-bc_pts] - bc*m[i+cd_pts]) / (bc+cd)`.
/// Samples whose chord neighbors leave the array pass through unchanged.
pub fn chord_to_axle(movement: &[f64], mtt: MttType, interval_m: f64) -> Vec<f64> {
    let cfg = mtt.config();
    let bc_pts = (cfg.bc_m / interval_m).round() as usize;
    let cd_pts = (cfg.cd_m / interval_m).round() as usize;
    let total = cfg.bc_m + cfg.cd_m;
    let n = movement.len();

    (0..n)
        .map(|i| {
            if i < bc_pts || i + cd_pts >= n {
                movement[i]
            } else {
                (total * movement[i]
                    - cfg.cd_m * movement[i - bc_pts]
                    - cfg.bc_m * movement[i + cd_pts])
                    / total
            }
        })
        .collect()
}

/// Compute per-sample movement amounts from the plan and restored
/// waveforms, applying the configured corrections in order.
pub fn compute_movement_amounts(
    restored: &Signal,
    plan: &[f64],
    channel: Channel,
    cant: Option<&[f64]>,
    slack: Option<&[f64]>,
    params: &MovementParams,
    section: &WorkSection,
) -> Result<Vec<MovementAmount>> {
    let n = restored.len();
    if plan.len() != n {
        return Err(EngineError::InvalidLength { len: plan.len() });
    }
    check_finite(plan)?;
    if let Some(c) = cant {
        if c.len() != n {
            return Err(EngineError::InvalidLength { len: c.len() });
        }
        check_finite(c)?;
    }
    if let Some(s) = slack {
        if s.len() != n {
            return Err(EngineError::InvalidLength { len: s.len() });
        }
        check_finite(s)?;
    }

    // Base movement, then the ordered corrections.
    let mut movement: Vec<f64> = plan
        .iter()
        .zip(restored.values().iter())
        .map(|(p, r)| p - r)
        .collect();

    // 1. Chord-to-axle translation.
    if let Some(mtt) = params.mtt {
        movement = chord_to_axle(&movement, mtt, restored.interval_m());
    }

    // 2. Cant correction for the vertical family.
    if channel.is_vertical() {
        if let Some(cant) = cant {
            let k = params.cant_coeff.clamp(0.0, 1.0);
            for (m, &c) in movement.iter_mut().zip(cant.iter()) {
                *m += k * c;
            }
        }
    }

    // 3. Slack correction for the lateral family.
    if channel.is_lateral() {
        if let Some(slack) = slack {
            let k = params.slack_coeff.clamp(0.0, 0.5);
            for (m, &s) in movement.iter_mut().zip(slack.iter()) {
                *m += k * s;
            }
        }
    }

    // 4. Correction mode.
    match params.correction_mode {
        CorrectionMode::None => {}
        CorrectionMode::Standard => {
            for i in 1..n.saturating_sub(1) {
                let second_diff = plan[i + 1] - 2.0 * plan[i] + plan[i - 1];
                movement[i] += params.distortion_coeff * second_diff;
            }
        }
        CorrectionMode::Mtt => {
            let mtt = params.mtt.ok_or(EngineError::InvalidInput { index: 0 })?;
            let versine_params =
                VersineParams::new(mtt.chord(), restored.interval_m());
            let plan_versine = eccentric_versine(plan, &versine_params)?;
            for i in 0..n {
                if plan_versine.valid[i] {
                    movement[i] += 3.0 * plan_versine.values[i];
                }
            }
        }
    }

    // Per-sample classification against the section's limits.
    Ok(movement
        .iter()
        .enumerate()
        .map(|(i, &m)| {
            let direction = if m >= 0.0 {
                MoveDirection::Up
            } else {
                MoveDirection::Down
            };
            let limit_dir = if channel.is_lateral() {
                LimitDirection::Lateral
            } else if m >= 0.0 {
                LimitDirection::Up
            } else {
                LimitDirection::Down
            };
            let constraint_mm = section.movement_restriction(i, limit_dir);
            MovementAmount {
                movement_mm: m,
                direction,
                constraint_mm,
                is_constrained: m.abs() > constraint_mm,
                is_wb: section.is_in_wb_section(restored.kp_at(i)),
            }
        })
        .collect())
}

/// One exported movement record for the downstream binary writers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub kp_m: f64,
    pub side: Side,
    pub channel: ChannelKind,
    pub movement_mm: f64,
    pub is_constrained: bool,
    pub is_wb: bool,
}

/// Decimate movement amounts to the requested record interval (typically
/// 5 m) by arithmetic mean; the boolean flags hold if any sample in the
/// bin holds.
pub fn export_movement_records(
    restored: &Signal,
    amounts: &[MovementAmount],
    side: Side,
    channel: ChannelKind,
    record_interval_m: f64,
) -> Vec<MovementRecord> {
    let step = ((record_interval_m / restored.interval_m()).round() as usize).max(1);
    amounts
        .chunks(step)
        .enumerate()
        .map(|(bin, chunk)| {
            let mean =
                chunk.iter().map(|a| a.movement_mm).sum::<f64>() / chunk.len() as f64;
            MovementRecord {
                kp_m: restored.kp_at(bin * step),
                side,
                channel,
                movement_mm: mean,
                is_constrained: chunk.iter().any(|a| a.is_constrained),
                is_wb: chunk.iter().any(|a| a.is_wb),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worksection::WbZone;

    const INTERVAL: f64 = 0.25;

    fn signal(values: Vec<f64>) -> Signal {
        Signal::new(values, INTERVAL, 0.0).unwrap()
    }

    #[test]
    fn catalog_matches_the_documented_table() {
        let expected = [
            ("08-475", 3.63, 9.37),
            ("08-275", 3.20, 8.50),
            ("09-16", 7.50, 7.50),
            ("09-32", 8.00, 8.00),
            ("MTT-15", 10.00, 10.00),
        ];
        for (mtt, (id, bc, cd)) in MttType::ALL.iter().zip(expected.iter()) {
            let cfg = mtt.config();
            assert_eq!(cfg.id, *id);
            assert_eq!(cfg.bc_m, *bc);
            assert_eq!(cfg.cd_m, *cd);
        }
    }

    #[test]
    fn mtt_type_serializes_as_catalog_id() {
        let json = serde_json::to_string(&MttType::Mtt08_475).unwrap();
        assert_eq!(json, r#""08-475""#);
        let back: MttType = serde_json::from_str(r#""MTT-15""#).unwrap();
        assert_eq!(back, MttType::Mtt15);
    }

    #[test]
    fn constant_movement_cancels_through_the_chord() {
        // ((bc+cd)*10 - cd*10 - bc*10) / (bc+cd) = 0 on interior samples;
        // boundary samples pass through.
        let movement = vec![10.0; 200];
        let out = chord_to_axle(&movement, MttType::Mtt08_475, INTERVAL);
        let bc_pts = (3.63_f64 / INTERVAL).round() as usize; // 15
        let cd_pts = (9.37_f64 / INTERVAL).round() as usize; // 37
        for (i, &v) in out.iter().enumerate() {
            if i < bc_pts || i + cd_pts >= 200 {
                assert_eq!(v, 10.0, "boundary sample {} changed", i);
            } else {
                assert!(v.abs() < 1e-12, "interior sample {} is {}", i, v);
            }
        }
    }

    #[test]
    fn chord_translation_matches_the_formula() {
        let movement: Vec<f64> = (0..300).map(|i| (i as f64 * 0.21).sin() * 5.0).collect();
        let out = chord_to_axle(&movement, MttType::Mtt09_16, INTERVAL);
        let pts = (7.5_f64 / INTERVAL).round() as usize; // 30 both arms
        let i = 150;
        let expected =
            (15.0 * movement[i] - 7.5 * movement[i - pts] - 7.5 * movement[i + pts]) / 15.0;
        assert!((out[i] - expected).abs() < 1e-12);
    }

    #[test]
    fn movement_is_plan_minus_restored() {
        let restored = signal(vec![1.0; 100]);
        let plan = vec![4.0; 100];
        let section = WorkSection::new(0.0, 25.0);
        let amounts = compute_movement_amounts(
            &restored,
            &plan,
            Channel::Level(Side::Left),
            None,
            None,
            &MovementParams::default(),
            &section,
        )
        .unwrap();
        for a in &amounts {
            assert_eq!(a.movement_mm, 3.0);
            assert_eq!(a.direction, MoveDirection::Up);
            assert_eq!(a.constraint_mm, 6.0);
            assert!(!a.is_constrained);
            assert!(!a.is_wb);
        }
    }

    #[test]
    fn cant_applies_to_vertical_channels_only() {
        let restored = signal(vec![0.0; 100]);
        let plan = vec![0.0; 100];
        let cant = vec![10.0; 100];
        let section = WorkSection::new(0.0, 25.0);
        let params = MovementParams::default();

        let level = compute_movement_amounts(
            &restored,
            &plan,
            Channel::Level(Side::Right),
            Some(&cant),
            None,
            &params,
            &section,
        )
        .unwrap();
        assert!((level[50].movement_mm - 1.5).abs() < 1e-12); // 0.15 * 10

        let gauge = compute_movement_amounts(
            &restored,
            &plan,
            Channel::Gauge,
            Some(&cant),
            None,
            &params,
            &section,
        )
        .unwrap();
        assert_eq!(gauge[50].movement_mm, 0.0);
    }

    #[test]
    fn slack_applies_to_lateral_channels_and_is_clamped() {
        let restored = signal(vec![0.0; 100]);
        let plan = vec![0.0; 100];
        let slack = vec![10.0; 100];
        let section = WorkSection::new(0.0, 25.0);
        let params = MovementParams {
            slack_coeff: 2.0, // outside [0, 0.5]: clamped
            ..MovementParams::default()
        };

        let alignment = compute_movement_amounts(
            &restored,
            &plan,
            Channel::Alignment(Side::Left),
            None,
            Some(&slack),
            &params,
            &section,
        )
        .unwrap();
        assert!((alignment[50].movement_mm - 5.0).abs() < 1e-12); // 0.5 * 10
    }

    #[test]
    fn standard_mode_adds_the_curvature_term() {
        let restored = signal(vec![0.0; 100]);
        // Quadratic plan: constant second difference 2*a with a = 0.01.
        let plan: Vec<f64> = (0..100).map(|i| 0.01 * (i as f64) * (i as f64)).collect();
        let section = WorkSection::new(0.0, 25.0);
        let params = MovementParams {
            correction_mode: CorrectionMode::Standard,
            distortion_coeff: 1.0,
            ..MovementParams::default()
        };
        let amounts = compute_movement_amounts(
            &restored,
            &plan,
            Channel::Level(Side::Left),
            None,
            None,
            &params,
            &section,
        )
        .unwrap();
        // Interior: movement = plan + 0.02; boundary: plan only.
        assert!((amounts[50].movement_mm - (plan[50] + 0.02)).abs() < 1e-9);
        assert_eq!(amounts[0].movement_mm, plan[0]);
        assert_eq!(amounts[99].movement_mm, plan[99]);
    }

    #[test]
    fn mtt_mode_adds_triple_versine_of_the_plan() {
        let restored = signal(vec![0.0; 300]);
        let plan: Vec<f64> = (0..300).map(|i| (i as f64 * 0.17).sin() * 4.0).collect();
        let section = WorkSection::new(0.0, 75.0);
        let params = MovementParams {
            mtt: Some(MttType::Mtt09_16),
            correction_mode: CorrectionMode::Mtt,
            ..MovementParams::default()
        };
        let amounts = compute_movement_amounts(
            &restored,
            &plan,
            Channel::Level(Side::Left),
            None,
            None,
            &params,
            &section,
        )
        .unwrap();

        let versine = eccentric_versine(
            &plan,
            &VersineParams::new(MttType::Mtt09_16.chord(), INTERVAL),
        )
        .unwrap();
        let translated = chord_to_axle(&plan, MttType::Mtt09_16, INTERVAL);
        let i = 150;
        let expected = translated[i] + 3.0 * versine.values[i];
        assert!((amounts[i].movement_mm - expected).abs() < 1e-9);
    }

    #[test]
    fn mtt_mode_without_a_machine_is_rejected() {
        let restored = signal(vec![0.0; 100]);
        let plan = vec![0.0; 100];
        let section = WorkSection::new(0.0, 25.0);
        let params = MovementParams {
            correction_mode: CorrectionMode::Mtt,
            ..MovementParams::default()
        };
        assert!(compute_movement_amounts(
            &restored,
            &plan,
            Channel::Level(Side::Left),
            None,
            None,
            &params,
            &section,
        )
        .is_err());
    }

    #[test]
    fn limit_violations_are_flagged() {
        let restored = signal(vec![0.0; 100]);
        let mut plan = vec![0.0; 100];
        plan[10] = 10.0; // over the 6 mm up limit
        plan[20] = -5.0; // over the 2 mm down limit
        let section = WorkSection::new(0.0, 25.0);
        let amounts = compute_movement_amounts(
            &restored,
            &plan,
            Channel::Level(Side::Left),
            None,
            None,
            &MovementParams::default(),
            &section,
        )
        .unwrap();
        assert!(amounts[10].is_constrained);
        assert_eq!(amounts[10].constraint_mm, 6.0);
        assert!(amounts[20].is_constrained);
        assert_eq!(amounts[20].direction, MoveDirection::Down);
        assert_eq!(amounts[20].constraint_mm, 2.0);
        assert!(!amounts[30].is_constrained);
    }

    #[test]
    fn wb_flag_follows_the_section_zones() {
        let restored = signal(vec![0.0; 100]); // kp 0 .. 24.75
        let plan = vec![1.0; 100];
        let mut section = WorkSection::new(0.0, 25.0);
        section.wb_zones.push(WbZone {
            start_kp_m: 10.0,
            end_kp_m: 12.0,
        });
        let amounts = compute_movement_amounts(
            &restored,
            &plan,
            Channel::Level(Side::Left),
            None,
            None,
            &MovementParams::default(),
            &section,
        )
        .unwrap();
        assert!(!amounts[39].is_wb); // kp 9.75
        assert!(amounts[40].is_wb); // kp 10.0
        assert!(amounts[48].is_wb); // kp 12.0
        assert!(!amounts[49].is_wb); // kp 12.25
    }

    #[test]
    fn export_decimates_by_mean_and_ors_flags() {
        let restored = signal((0..100).map(|i| i as f64).collect());
        let amounts: Vec<MovementAmount> = (0..100)
            .map(|i| MovementAmount {
                movement_mm: i as f64,
                direction: MoveDirection::Up,
                constraint_mm: 6.0,
                is_constrained: i == 25,
                is_wb: false,
            })
            .collect();
        let records = export_movement_records(
            &restored,
            &amounts,
            Side::Left,
            ChannelKind::Level,
            5.0,
        );
        // 100 samples at 0.25 m = 25 m: five 5 m bins of 20 samples.
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].kp_m, 0.0);
        assert_eq!(records[1].kp_m, 5.0);
        // Mean of 0..19 is 9.5.
        assert!((records[0].movement_mm - 9.5).abs() < 1e-12);
        assert!(!records[0].is_constrained);
        assert!(records[1].is_constrained); // sample 25 sits in bin 1
        assert_eq!(records[0].side, Side::Left);
        assert_eq!(records[0].channel, ChannelKind::Level);
    }
}
