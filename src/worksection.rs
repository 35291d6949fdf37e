//! Work-section geometry and validation: data/display ranges, WB-zone
//! guards, and per-index movement restrictions.
//!
//! WB zones are stretches whose kilometer points come verbatim from the
//! raw source rather than being reconstructed from sample indices, so the
//! section endpoints must keep a safety margin from their boundaries.
//! Validation results are returned as data; nothing here raises.

use crate::movement::MttType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction a movement restriction applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitDirection {
    Up,
    Down,
    Lateral,
}

/// An index range with a tightened movement limit (bridge decks, turnouts,
/// catenary anchors).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimitRegion {
    pub start_index: usize,
    /// Inclusive.
    pub end_index: usize,
    pub direction: LimitDirection,
    pub limit_mm: f64,
}

impl LimitRegion {
    pub fn contains(&self, index: usize) -> bool {
        index >= self.start_index && index <= self.end_index
    }
}

/// A WB zone in kilometer points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WbZone {
    pub start_kp_m: f64,
    pub end_kp_m: f64,
}

/// One processing session's section of line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkSection {
    pub kp_start_m: f64,
    pub kp_end_m: f64,
    /// Extra data ahead of the section, meters. At least 500 m is needed
    /// for full restoration fidelity at the section start.
    pub buffer_before_m: f64,
    pub buffer_after_m: f64,
    /// Extra context shown by the charting layer, meters.
    pub display_buffer_m: f64,
    pub wb_zones: Vec<WbZone>,
    pub wb_safety_margin_m: f64,
    pub mtt_type: Option<MttType>,
    pub limit_regions: Vec<LimitRegion>,
    /// Default movement limits where no region applies, millimeters.
    pub up_limit_mm: f64,
    pub down_limit_mm: f64,
}

impl WorkSection {
    /// A section with the documented defaults and no special zones.
    pub fn new(kp_start_m: f64, kp_end_m: f64) -> Self {
        WorkSection {
            kp_start_m,
            kp_end_m,
            buffer_before_m: 500.0,
            buffer_after_m: 500.0,
            display_buffer_m: 100.0,
            wb_zones: Vec::new(),
            wb_safety_margin_m: 50.0,
            mtt_type: None,
            limit_regions: Vec::new(),
            up_limit_mm: 6.0,
            down_limit_mm: 2.0,
        }
    }

    /// Range of data the section needs, including processing buffers.
    pub fn data_range(&self) -> (f64, f64) {
        (
            self.kp_start_m - self.buffer_before_m,
            self.kp_end_m + self.buffer_after_m,
        )
    }

    /// Range shown to the user.
    pub fn display_range(&self) -> (f64, f64) {
        (
            self.kp_start_m - self.display_buffer_m,
            self.kp_end_m + self.display_buffer_m,
        )
    }

    pub fn is_in_wb_section(&self, kp_m: f64) -> bool {
        self.wb_zones
            .iter()
            .any(|z| kp_m >= z.start_kp_m && kp_m <= z.end_kp_m)
    }

    /// True when the position clears every WB zone by the safety margin.
    pub fn is_safe_from_wb_section(&self, kp_m: f64) -> bool {
        self.wb_zones.iter().all(|z| {
            kp_m < z.start_kp_m - self.wb_safety_margin_m
                || kp_m > z.end_kp_m + self.wb_safety_margin_m
        })
    }

    /// Movement limit at a sample index for a direction: the default,
    /// tightened by the narrowest overlapping region.
    pub fn movement_restriction(&self, index: usize, direction: LimitDirection) -> f64 {
        let default = match direction {
            LimitDirection::Up | LimitDirection::Lateral => self.up_limit_mm,
            LimitDirection::Down => self.down_limit_mm,
        };
        self.limit_regions
            .iter()
            .filter(|r| r.direction == direction && r.contains(index))
            .map(|r| r.limit_mm)
            .fold(default, f64::min)
    }

    /// Validate the section. Issues come back as data: the driver decides
    /// whether to proceed on warnings.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if self.kp_start_m >= self.kp_end_m {
            report.errors.push(ValidationIssue::SectionReversed {
                kp_start_m: self.kp_start_m,
                kp_end_m: self.kp_end_m,
            });
        }

        for &endpoint in &[self.kp_start_m, self.kp_end_m] {
            for zone in &self.wb_zones {
                let inside = endpoint >= zone.start_kp_m && endpoint <= zone.end_kp_m;
                if inside {
                    report
                        .warnings
                        .push(ValidationIssue::EndpointInsideWbZone {
                            kp_m: endpoint,
                            zone: *zone,
                        });
                }
                let clearance = (endpoint - zone.start_kp_m)
                    .abs()
                    .min((endpoint - zone.end_kp_m).abs());
                if inside || clearance < self.wb_safety_margin_m {
                    report.errors.push(ValidationIssue::EndpointNearWbZone {
                        kp_m: endpoint,
                        zone: *zone,
                        margin_m: self.wb_safety_margin_m,
                    });
                }
            }
        }

        if self.buffer_before_m < 500.0 {
            report.warnings.push(ValidationIssue::BufferTooSmall {
                kp_m: self.kp_start_m,
                buffer_m: self.buffer_before_m,
            });
        }
        if self.buffer_after_m < 500.0 {
            report.warnings.push(ValidationIssue::BufferTooSmall {
                kp_m: self.kp_end_m,
                buffer_m: self.buffer_after_m,
            });
        }

        report
    }
}

/// Validation findings, split by severity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum ValidationIssue {
    #[error("section start {kp_start_m} m is not before its end {kp_end_m} m")]
    SectionReversed { kp_start_m: f64, kp_end_m: f64 },

    #[error("section endpoint {kp_m} m is within {margin_m} m of a WB zone boundary")]
    EndpointNearWbZone {
        kp_m: f64,
        zone: WbZone,
        margin_m: f64,
    },

    #[error("section endpoint {kp_m} m lies inside a WB zone")]
    EndpointInsideWbZone { kp_m: f64, zone: WbZone },

    #[error("buffer of {buffer_m} m at {kp_m} m is below the recommended 500 m")]
    BufferTooSmall { kp_m: f64, buffer_m: f64 },
}

/// Extract `[start, end)` from a sample array, zero-padding whatever falls
/// outside it.
pub fn clip_window(values: &[f64], start: isize, end: isize) -> Vec<f64> {
    let len = values.len() as isize;
    (start..end)
        .map(|i| {
            if i >= 0 && i < len {
                values[i as usize]
            } else {
                0.0
            }
        })
        .collect()
}
