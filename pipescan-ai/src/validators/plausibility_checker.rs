//! Plausibility Checker
//!
//! Unit and range sanity checks. Any of P01-P05 removes 0.2 from the
//! quantification confidence, once per observation no matter how many
//! rules fire. P06 only flags.

use super::ObservationRule;
use crate::models::Observation;
use tracing::debug;

/// Quantification confidence removed when any penalized rule fires
pub const PLAUSIBILITY_PENALTY: f64 = 0.2;

/// Codes measured as a share of the cross-section
const CROSS_SECTION_CODES: &[&str] = &["BBA", "BCA", "BCB", "BCC", "BFB", "BFC"];

const MAX_PERCENT: f64 = 100.0;
const MAX_MILLIMETERS: f64 = 500.0;
const MAX_SECTION_LENGTH: f64 = 2000.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct PlausibilityChecker;

impl PlausibilityChecker {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, observation: Observation) -> Observation {
        let mut flags = Vec::new();
        let mut penalized = false;
        let code = observation.code_key();

        if let Some(q) = &observation.quantification {
            let unit = q.unit.trim().to_ascii_lowercase();
            let is_percent = unit == "%";
            let is_mm = unit == "mm";

            // P01: crack/fracture family is measured in mm
            if code.starts_with("BA") && is_percent {
                flags.push(format!(
                    "P01: Crack/fracture code '{}' with unit '%' is implausible (expected mm)",
                    code
                ));
                penalized = true;
            }

            // P02: deformation/intrusion is measured in %
            if CROSS_SECTION_CODES.contains(&code.as_str()) && is_mm {
                flags.push(format!(
                    "P02: Code '{}' with unit 'mm' is implausible (expected %)",
                    code
                ));
                penalized = true;
            }

            // P03
            if is_percent && q.value > MAX_PERCENT {
                flags.push(format!("P03: Percentage {}% > 100", q.value));
                penalized = true;
            }

            // P04
            if is_mm && q.value > MAX_MILLIMETERS {
                flags.push(format!("P04: Millimeter value {}mm > 500", q.value));
                penalized = true;
            }
        }

        // P05
        if observation.start < 0.0 {
            flags.push(format!("P05: Start {:.2} < 0", observation.start));
            penalized = true;
        }

        // P06
        if observation.end > MAX_SECTION_LENGTH {
            flags.push(format!(
                "P06: End {:.2} > 2000 m is implausible for a pipe section",
                observation.end
            ));
        }

        if flags.is_empty() {
            return observation;
        }

        debug!(code = %code, flags = flags.len(), penalized, "Plausibility flags added");

        let confidence = if penalized {
            let reduced = observation.confidence.quantification() - PLAUSIBILITY_PENALTY;
            observation.confidence.with_quantification(reduced.max(0.0))
        } else {
            observation.confidence
        };

        observation.with_confidence(confidence).with_flags(flags)
    }
}

impl ObservationRule for PlausibilityChecker {
    fn name(&self) -> &'static str {
        "plausibility_checker"
    }

    fn apply(&self, observation: Observation) -> Observation {
        self.check(observation)
    }
}
