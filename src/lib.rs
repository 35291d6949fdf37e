//! Track irregularity restoration and tamping-plan computation engine.
//!
//! Measured track-geometry signals (alignment, level, cross-level, twist,
//! gauge) come distorted by the asymmetric chord-offset principle of the
//! recording car. This crate inverts that distortion inside a bounded
//! wavelength band ([`restoration`]), aligns sparse hand measurements to
//! the restored waveform ([`correlation`]), builds an upward-preferred
//! plan line ([`planline`]) and derives the per-sample movement amounts a
//! tamping machine applies ([`movement`]), honoring work-section limits
//! and WB zones ([`worksection`]).
//!
//! The numerical core is single-threaded and deterministic; all state
//! lives in caller-owned values. Long-running operations accept a
//! progress sink and a cooperative [`CancelToken`]. The core never logs
//! and never touches I/O except through the explicit plan-line
//! import/export surface ([`planio`]).

pub mod correlation;
pub mod error;
pub mod fft;
pub mod movement;
pub mod planio;
pub mod planline;
pub mod progress;
pub mod restoration;
pub mod signal;
pub mod stats;
pub mod versine;
pub mod worksection;

#[cfg(feature = "jsbindings")]
pub mod bindings;

pub use correlation::{
    fuse_matches, match_segment, match_segments, FusionResult, HandSegment, LagSample,
    MatchParams, MatchQuality, MatchResult,
};
pub use error::{EngineError, Result};
pub use fft::{bin_to_wavelength, next_power_of_two, wavelength_to_bin, FftEngine};
pub use movement::{
    chord_to_axle, compute_movement_amounts, export_movement_records, CorrectionMode,
    MoveDirection, MovementAmount, MovementParams, MovementRecord, MttConfig, MttType,
};
pub use planio::{
    build_plan_records, read_plan_csv, read_plan_json, write_plan_csv, write_plan_json,
    PlanLineRecord,
};
pub use planline::{solve_plan_line, FixedPoint, PlanConfig, PlanLineResult};
pub use progress::{CancelToken, ProgressFn, ProgressUpdate};
pub use restoration::{
    ImpulseResponseCache, InversionMode, RestorationBand, RestorationFilter,
};
pub use signal::{Channel, ChannelKind, EngineParams, MeasurementRecord, Side, Signal};
pub use stats::{detect_outliers, Outlier, OutlierClass, SignalStats, SmoothingMethod};
pub use versine::{
    eccentric_versine, eccentric_versine_chunked, estimate_memory_bytes, ChordGeometry,
    StreamingVersine, VersineOutput, VersineParams, DEFAULT_CHUNK_SIZE,
};
pub use worksection::{
    clip_window, LimitDirection, LimitRegion, ValidationIssue, ValidationReport, WbZone,
    WorkSection,
};
