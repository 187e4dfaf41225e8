//! Deterministic observation checks
//!
//! Both checks add flags and lower confidence; neither ever rejects an
//! observation outright.

pub mod code_validator;
pub mod plausibility_checker;

pub use code_validator::{CodeValidator, ValidationOutcome};
pub use plausibility_checker::PlausibilityChecker;

use crate::models::Observation;

/// Rule stage applied to every classified observation, in order
pub trait ObservationRule: Send + Sync {
    /// Stage name for logging
    fn name(&self) -> &'static str;

    fn apply(&self, observation: Observation) -> Observation;
}
