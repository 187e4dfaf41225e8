//! Evaluation of merged observations against ground truth
//!
//! For every ground truth entry the best overlapping prediction is chosen
//! (exact code match first, then nearest start) and counted as a top-1 hit
//! when its code matches.

use crate::models::{GroundTruthEntry, Observation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Position tolerance (meters) around a ground truth interval
pub const DEFAULT_POSITION_TOLERANCE: f64 = 1.0;

/// Best prediction for one ground truth entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMatch {
    pub expected_code: String,
    pub expected_start: f64,
    pub predicted_code: Option<String>,
    pub hit: bool,
    /// |predicted start − expected start|, when any candidate overlapped
    pub meter_delta: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeStats {
    pub ground_truth: usize,
    pub hits: usize,
}

impl CodeStats {
    pub fn accuracy(&self) -> f64 {
        if self.ground_truth == 0 {
            0.0
        } else {
            self.hits as f64 / self.ground_truth as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub ground_truth_count: usize,
    pub prediction_count: usize,
    pub top1_hits: usize,
    pub top1_accuracy: f64,
    pub average_confidence: f64,
    /// Share of predictions carrying at least one validation flag
    pub mismatch_rate: f64,
    pub matches: Vec<EntryMatch>,
    /// Keyed by normalized ground truth code
    pub per_code: BTreeMap<String, CodeStats>,
}

impl EvaluationReport {
    /// True when there was no ground truth to evaluate against
    pub fn is_empty(&self) -> bool {
        self.ground_truth_count == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    tolerance: f64,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(DEFAULT_POSITION_TOLERANCE)
    }
}

impl Evaluator {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance: tolerance.max(0.0),
        }
    }

    pub fn evaluate(
        &self,
        predictions: &[Observation],
        ground_truth: &[GroundTruthEntry],
    ) -> EvaluationReport {
        if ground_truth.is_empty() {
            return EvaluationReport {
                prediction_count: predictions.len(),
                ..Default::default()
            };
        }

        let mut matches = Vec::with_capacity(ground_truth.len());
        let mut per_code: BTreeMap<String, CodeStats> = BTreeMap::new();

        for gt in ground_truth {
            let expected = gt.code.trim().to_ascii_uppercase();
            let best = self.best_candidate(predictions, gt, &expected);

            let hit = best.map(|p| p.code_key() == expected).unwrap_or(false);
            let stats = per_code.entry(expected.clone()).or_default();
            stats.ground_truth += 1;
            if hit {
                stats.hits += 1;
            }

            matches.push(EntryMatch {
                expected_code: expected,
                expected_start: gt.start,
                predicted_code: best.map(|p| p.code.clone()),
                hit,
                meter_delta: best.map(|p| (p.start - gt.start).abs()),
            });
        }

        let top1_hits = matches.iter().filter(|m| m.hit).count();
        let (average_confidence, mismatch_rate) = if predictions.is_empty() {
            (0.0, 0.0)
        } else {
            let n = predictions.len() as f64;
            let confidence: f64 = predictions.iter().map(Observation::overall_confidence).sum();
            let flagged = predictions.iter().filter(|p| p.has_flags()).count();
            (confidence / n, flagged as f64 / n)
        };

        let report = EvaluationReport {
            ground_truth_count: ground_truth.len(),
            prediction_count: predictions.len(),
            top1_hits,
            top1_accuracy: top1_hits as f64 / ground_truth.len() as f64,
            average_confidence,
            mismatch_rate,
            matches,
            per_code,
        };

        info!(
            ground_truth = report.ground_truth_count,
            predictions = report.prediction_count,
            top1_accuracy = report.top1_accuracy,
            "Evaluation complete"
        );
        report
    }

    fn best_candidate<'a>(
        &self,
        predictions: &'a [Observation],
        gt: &GroundTruthEntry,
        expected: &str,
    ) -> Option<&'a Observation> {
        let low = gt.start - self.tolerance;
        let high = gt.end_or_start() + self.tolerance;

        predictions
            .iter()
            .filter(|p| p.start <= high && p.end >= low)
            .min_by(|a, b| {
                let a_miss = a.code_key() != expected;
                let b_miss = b.code_key() != expected;
                a_miss.cmp(&b_miss).then_with(|| {
                    (a.start - gt.start)
                        .abs()
                        .total_cmp(&(b.start - gt.start).abs())
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConfidenceScore;

    fn prediction(code: &str, start: f64, end: f64) -> Observation {
        Observation::new(code, start, ConfidenceScore::new(0.9, 0.6, 0.3)).with_interval(start, end)
    }

    #[test]
    fn test_nearby_prediction_is_hit() {
        let report = Evaluator::default().evaluate(
            &[prediction("BAE", 5.4, 5.4)],
            &[GroundTruthEntry::point("BAE", 5.0)],
        );
        assert!(!report.is_empty());
        assert_eq!(report.top1_hits, 1);
        assert_eq!(report.top1_accuracy, 1.0);
        let delta = report.matches[0].meter_delta.unwrap();
        assert!((delta - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_empty_ground_truth_is_empty_report() {
        let report = Evaluator::default().evaluate(&[prediction("BAE", 1.0, 1.0)], &[]);
        assert!(report.is_empty());
        assert_eq!(report.top1_accuracy, 0.0);
        assert_eq!(report.prediction_count, 1);
    }

    #[test]
    fn test_exact_code_ranks_before_distance() {
        let report = Evaluator::default().evaluate(
            &[prediction("BAB", 5.0, 5.0), prediction("bae", 5.8, 5.8)],
            &[GroundTruthEntry::point("BAE", 5.0)],
        );
        assert!(report.matches[0].hit);
        assert_eq!(report.matches[0].predicted_code.as_deref(), Some("bae"));
    }

    #[test]
    fn test_wrong_code_or_far_prediction_misses() {
        let report = Evaluator::default().evaluate(
            &[prediction("BAB", 5.2, 5.2), prediction("BAE", 9.0, 9.0)],
            &[GroundTruthEntry::point("BAE", 5.0)],
        );
        assert_eq!(report.top1_hits, 0);
        assert_eq!(report.matches[0].predicted_code.as_deref(), Some("BAB"));

        let report = Evaluator::default().evaluate(&[], &[GroundTruthEntry::point("BAE", 5.0)]);
        assert_eq!(report.matches[0].meter_delta, None);
        assert_eq!(report.average_confidence, 0.0);
        assert_eq!(report.mismatch_rate, 0.0);
    }

    #[test]
    fn test_range_entry_overlap_uses_end() {
        let report = Evaluator::default().evaluate(
            &[prediction("BCC", 14.5, 15.0)],
            &[GroundTruthEntry::range("BCC", 10.0, 14.0)],
        );
        assert!(report.matches[0].hit);
    }

    #[test]
    fn test_aggregates_and_per_code() {
        let flagged = prediction("BAB", 2.0, 2.0).with_flags(["V03: x".to_string()]);
        let report = Evaluator::default().evaluate(
            &[flagged, prediction("BAE", 5.0, 5.0)],
            &[
                GroundTruthEntry::point("BAB", 2.0),
                GroundTruthEntry::point("BAE", 5.0),
                GroundTruthEntry::point("BAE", 30.0),
            ],
        );
        assert_eq!(report.top1_hits, 2);
        assert!((report.top1_accuracy - 2.0 / 3.0).abs() < 1e-9);
        assert!((report.average_confidence - 0.6).abs() < 1e-9);
        assert_eq!(report.mismatch_rate, 0.5);
        assert_eq!(report.per_code["BAE"], CodeStats { ground_truth: 2, hits: 1 });
        assert_eq!(report.per_code["BAE"].accuracy(), 0.5);
    }
}
