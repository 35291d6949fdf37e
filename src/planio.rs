//! Plan-line import/export: CSV with the fixed header
//! `position_m,target_level_mm,target_alignment_mm,is_fixed`, and JSON as
//! an array of objects with identical field names. `is_fixed` is 0/1 in
//! both formats.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// One plan-line sample as it crosses the file boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanLineRecord {
    pub position_m: f64,
    pub target_level_mm: f64,
    pub target_alignment_mm: f64,
    #[serde(with = "bool_as_int")]
    pub is_fixed: bool,
}

/// `is_fixed` travels as 0/1, not true/false.
mod bool_as_int {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(serde::de::Error::custom(format!(
                "is_fixed must be 0 or 1, got {other}"
            ))),
        }
    }
}

/// Assemble records from per-channel plans on a common grid. The slices
/// must share one length.
pub fn build_plan_records(
    start_kp_m: f64,
    interval_m: f64,
    target_level: &[f64],
    target_alignment: &[f64],
    is_fixed: &[bool],
) -> Vec<PlanLineRecord> {
    debug_assert_eq!(target_level.len(), target_alignment.len());
    debug_assert_eq!(target_level.len(), is_fixed.len());
    (0..target_level.len())
        .map(|i| PlanLineRecord {
            position_m: start_kp_m + i as f64 * interval_m,
            target_level_mm: target_level[i],
            target_alignment_mm: target_alignment[i],
            is_fixed: is_fixed[i],
        })
        .collect()
}

pub fn write_plan_csv<W: Write>(writer: W, records: &[PlanLineRecord]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in records {
        csv_writer.serialize(record)?;
    }
    csv_writer.flush().map_err(crate::error::EngineError::from)?;
    Ok(())
}

pub fn read_plan_csv<R: Read>(reader: R) -> Result<Vec<PlanLineRecord>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    for row in csv_reader.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

pub fn write_plan_json<W: Write>(writer: W, records: &[PlanLineRecord]) -> Result<()> {
    serde_json::to_writer(writer, records)?;
    Ok(())
}

pub fn read_plan_json<R: Read>(reader: R) -> Result<Vec<PlanLineRecord>> {
    Ok(serde_json::from_reader(reader)?)
}
