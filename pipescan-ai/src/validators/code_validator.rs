//! Code Validator
//!
//! Deterministic rule check of an observation against the code catalog.
//! Violations never fail: they become flags plus a classification
//! confidence penalty.
//!
//! # Rules (applied in order)
//! | Rule | Condition | Effect |
//! |---|---|---|
//! | V01 | code not in catalog | flag, +1 violation |
//! | V02 | characterization required but absent, or present but not required | flag |
//! | V03 | quantification unit ≠ catalog unit | flag, +1 violation |
//! | V04 | clock position not an integer in 1..=12 | flag |
//! | V05 | start > end | flag, +1 violation |
//! | V06 | range defect but end ≤ start + 0.1 | flag, +1 violation |
//! | V07 | any confidence outside [0, 1] | flag, values clamped |
//!
//! Penalty: `classification = max(0, classification − 0.3 × violations)`

use super::ObservationRule;
use crate::catalog::CodeCatalog;
use crate::models::{Observation, RANGE_DEFECT_MIN_LENGTH};
use std::sync::Arc;
use tracing::debug;

/// Classification confidence removed per violation
pub const VIOLATION_PENALTY: f64 = 0.3;

/// Result of validating one observation
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub observation: Observation,
    /// Number of penalized rule violations
    pub violations: u32,
}

impl ValidationOutcome {
    /// True when the observation carries no flags at all
    pub fn passed(&self) -> bool {
        self.observation.validation_flags.is_empty()
    }
}

pub struct CodeValidator {
    catalog: Arc<CodeCatalog>,
}

impl CodeValidator {
    pub fn new(catalog: Arc<CodeCatalog>) -> Self {
        Self { catalog }
    }

    pub fn validate(&self, observation: Observation) -> ValidationOutcome {
        let mut flags = Vec::new();
        let mut violations = 0u32;
        let code = observation.code.as_str();

        // V01
        let info = self.catalog.get(code);
        if info.is_none() {
            flags.push(format!("V01: Unknown code '{}'", code));
            violations += 1;
        }

        if let Some(info) = info {
            // V02
            match (info.requires_characterization, observation.characterization) {
                (true, None) => flags.push(format!(
                    "V02: Characterization (A-D) required for code '{}'",
                    code
                )),
                (false, Some(c)) => flags.push(format!(
                    "V02: Characterization '{}' not allowed for code '{}'",
                    c.as_str(),
                    code
                )),
                _ => {}
            }

            // V03
            if let (Some(q), Some(expected)) = (&observation.quantification, &info.quant_unit) {
                if !q.unit.trim().eq_ignore_ascii_case(expected) {
                    flags.push(format!(
                        "V03: Unit '{}' does not match code '{}' (expected '{}')",
                        q.unit, code, expected
                    ));
                    violations += 1;
                }
            }
        }

        // V04
        if let Some(clock) = observation
            .quantification
            .as_ref()
            .and_then(|q| q.clock_position.as_deref())
        {
            if !is_valid_clock_position(clock) {
                flags.push(format!("V04: Invalid clock position '{}' (expected 1-12)", clock));
            }
        }

        // V05
        if observation.start > observation.end {
            flags.push(format!(
                "V05: Start ({:.2}) > end ({:.2})",
                observation.start, observation.end
            ));
            violations += 1;
        }

        // V06
        if observation.is_range_defect
            && observation.end <= observation.start + RANGE_DEFECT_MIN_LENGTH
        {
            flags.push("V06: Range defect but end <= start + 0.1".to_string());
            violations += 1;
        }

        // V07
        let mut confidence = observation.confidence;
        if !confidence.is_in_range() {
            flags.push("V07: Confidence values outside [0.0, 1.0]".to_string());
            confidence = confidence.clamped();
        }

        if violations > 0 {
            let penalized = confidence.classification() - VIOLATION_PENALTY * violations as f64;
            confidence = confidence.with_classification(penalized.max(0.0));
        }

        if !flags.is_empty() {
            debug!(code, violations, flags = flags.len(), "Validation flags added");
        }

        ValidationOutcome {
            observation: observation.with_confidence(confidence).with_flags(flags),
            violations,
        }
    }
}

impl ObservationRule for CodeValidator {
    fn name(&self) -> &'static str {
        "code_validator"
    }

    fn apply(&self, observation: Observation) -> Observation {
        self.validate(observation).observation
    }
}

fn is_valid_clock_position(raw: &str) -> bool {
    matches!(raw.trim().parse::<i32>(), Ok(1..=12))
}
