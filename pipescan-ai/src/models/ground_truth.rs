//! Ground truth entries (manually verified reference observations)

use super::observation::Characterization;
use serde::{Deserialize, Serialize};

/// Verified reference observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthEntry {
    pub code: String,
    #[serde(default)]
    pub text: String,
    pub start: f64,
    #[serde(default)]
    pub end: Option<f64>,
    #[serde(default)]
    pub is_range_defect: bool,
    #[serde(default)]
    pub characterization: Option<Characterization>,
    #[serde(default)]
    pub quant_value: Option<f64>,
    #[serde(default)]
    pub quant_unit: Option<String>,
    #[serde(default)]
    pub clock_position: Option<String>,
    /// Recorded playback time of the defect, when the protocol has one
    #[serde(default)]
    pub timestamp_seconds: Option<f64>,
}

impl GroundTruthEntry {
    pub fn point(code: impl Into<String>, start: f64) -> Self {
        Self {
            code: code.into(),
            text: String::new(),
            start,
            end: None,
            is_range_defect: false,
            characterization: None,
            quant_value: None,
            quant_unit: None,
            clock_position: None,
            timestamp_seconds: None,
        }
    }

    pub fn range(code: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            end: Some(end),
            is_range_defect: true,
            ..Self::point(code, start)
        }
    }

    /// End of the interval (start for point entries)
    pub fn end_or_start(&self) -> f64 {
        self.end.unwrap_or(self.start)
    }
}
