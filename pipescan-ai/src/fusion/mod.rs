//! Observation fusion
//!
//! Collapses per-frame observations of the same defect into one finding
//! per code and position run.

pub mod observation_merger;

pub use observation_merger::{ObservationMerger, DEFAULT_MERGE_TOLERANCE};
