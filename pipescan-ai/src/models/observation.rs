//! Observation and confidence model
//!
//! Observations are plain values. Stages that adjust them (validator,
//! plausibility checker, merger) take an observation and return an updated
//! one through the `with_*` functions instead of mutating shared state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Interval length (meters) above which an observation counts as a range defect
pub const RANGE_DEFECT_MIN_LENGTH: f64 = 0.1;

/// Defect characterization class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Characterization {
    A,
    B,
    C,
    D,
}

impl Characterization {
    /// Parse "A".."D" (case-insensitive, surrounding whitespace ignored)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

/// Structured quantification of a defect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantification {
    pub value: f64,
    /// "%", "mm" or "cm"
    pub unit: String,
    /// What was measured (defaults to the catalog label)
    #[serde(rename = "type")]
    pub quant_type: String,
    /// Clock position 1-12, kept as reported
    #[serde(default)]
    pub clock_position: Option<String>,
}

/// Confidence in the three independent stages of an observation
///
/// Values built through [`ConfidenceScore::new`] are clamped to [0, 1].
/// Values deserialized from external data are kept as given so the code
/// validator can flag them; it clamps them afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    detection: f64,
    classification: f64,
    quantification: f64,
}

impl ConfidenceScore {
    /// Create a clamped confidence score
    pub fn new(detection: f64, classification: f64, quantification: f64) -> Self {
        Self {
            detection: clamp_unit(detection),
            classification: clamp_unit(classification),
            quantification: clamp_unit(quantification),
        }
    }

    pub fn detection(&self) -> f64 {
        self.detection
    }

    pub fn classification(&self) -> f64 {
        self.classification
    }

    pub fn quantification(&self) -> f64 {
        self.quantification
    }

    /// Mean of the three dimensions, always recomputed
    pub fn overall(&self) -> f64 {
        (self.detection + self.classification + self.quantification) / 3.0
    }

    /// True when every dimension lies in [0, 1]
    pub fn is_in_range(&self) -> bool {
        [self.detection, self.classification, self.quantification]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }

    /// Copy with every dimension clamped to [0, 1]
    pub fn clamped(&self) -> Self {
        Self::new(self.detection, self.classification, self.quantification)
    }

    pub fn with_classification(&self, classification: f64) -> Self {
        Self::new(self.detection, classification, self.quantification)
    }

    pub fn with_quantification(&self, quantification: f64) -> Self {
        Self::new(self.detection, self.classification, quantification)
    }
}

impl Default for ConfidenceScore {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Reviewer decision on an observation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalState {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

/// Structured, confidence-scored defect finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Catalog code (e.g. "BAB")
    pub code: String,
    #[serde(default)]
    pub characterization: Option<Characterization>,
    pub label: String,
    /// Protocol text
    pub text: String,
    #[serde(default)]
    pub quantification: Option<Quantification>,
    pub confidence: ConfidenceScore,
    /// Model reasoning shown to the reviewer
    #[serde(default)]
    pub evidence: String,
    /// Interval start (meters)
    pub start: f64,
    /// Interval end (meters), equal to start for point defects
    pub end: f64,
    #[serde(default)]
    pub is_range_defect: bool,
    /// Rule violations found by the validator and plausibility checker
    #[serde(default)]
    pub validation_flags: Vec<String>,
    #[serde(default)]
    pub approval: ApprovalState,
}

impl Observation {
    /// Create a point observation with the given code and confidence
    pub fn new(code: impl Into<String>, start: f64, confidence: ConfidenceScore) -> Self {
        let code = code.into();
        Self {
            id: Uuid::new_v4(),
            label: code.clone(),
            text: code.clone(),
            code,
            characterization: None,
            quantification: None,
            confidence,
            evidence: String::new(),
            start,
            end: start,
            is_range_defect: false,
            validation_flags: Vec::new(),
            approval: ApprovalState::Pending,
        }
    }

    /// Copy with a new interval; the range flag is derived from it
    pub fn with_interval(mut self, start: f64, end: f64) -> Self {
        self.start = start;
        self.end = end;
        self.is_range_defect = end > start + RANGE_DEFECT_MIN_LENGTH;
        self
    }

    pub fn with_confidence(mut self, confidence: ConfidenceScore) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_quantification(mut self, quantification: Option<Quantification>) -> Self {
        self.quantification = quantification;
        self
    }

    pub fn with_characterization(mut self, characterization: Option<Characterization>) -> Self {
        self.characterization = characterization;
        self
    }

    /// Copy with additional validation flags appended in order
    pub fn with_flags<I>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.validation_flags.extend(flags);
        self
    }

    pub fn with_approval(mut self, approval: ApprovalState) -> Self {
        self.approval = approval;
        self
    }

    /// Overall confidence (mean of the three dimensions)
    pub fn overall_confidence(&self) -> f64 {
        self.confidence.overall()
    }

    pub fn has_flags(&self) -> bool {
        !self.validation_flags.is_empty()
    }

    /// Normalized code used for grouping and comparison
    pub fn code_key(&self) -> String {
        self.code.trim().to_ascii_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_new_clamps() {
        let c = ConfidenceScore::new(1.5, -0.2, f64::NAN);
        assert_eq!(c.detection(), 1.0);
        assert_eq!(c.classification(), 0.0);
        assert_eq!(c.quantification(), 0.0);
        assert!(c.is_in_range());
    }

    #[test]
    fn test_overall_is_mean() {
        let c = ConfidenceScore::new(0.9, 0.6, 0.3);
        assert!((c.overall() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_deserialized_out_of_range_is_detected() {
        let c: ConfidenceScore = serde_json::from_str(
            r#"{"detection": 1.4, "classification": 0.5, "quantification": 0.5}"#,
        )
        .unwrap();
        assert!(!c.is_in_range());
        assert!(c.clamped().is_in_range());
        assert_eq!(c.clamped().detection(), 1.0);
    }

    #[test]
    fn test_with_interval_derives_range_flag() {
        let obs = Observation::new("BCC", 10.0, ConfidenceScore::default());
        assert!(!obs.clone().with_interval(10.0, 10.1).is_range_defect);
        assert!(obs.with_interval(10.0, 10.5).is_range_defect);
    }

    #[test]
    fn test_characterization_parse() {
        assert_eq!(Characterization::parse(" b "), Some(Characterization::B));
        assert_eq!(Characterization::parse("E"), None);
        assert_eq!(Characterization::parse(""), None);
    }

    #[test]
    fn test_observation_json_defaults() {
        let obs: Observation = serde_json::from_str(
            r#"{
                "code": "BAE",
                "label": "Break",
                "text": "Break",
                "confidence": {"detection": 0.8, "classification": 0.7, "quantification": 0.6},
                "start": 5.4,
                "end": 5.4
            }"#,
        )
        .unwrap();
        assert_eq!(obs.approval, ApprovalState::Pending);
        assert!(obs.validation_flags.is_empty());
        assert!(obs.quantification.is_none());
    }
}
