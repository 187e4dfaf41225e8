//! Observation Merger
//!
//! Same-code observations whose intervals touch (within a tolerance) are
//! merged into a single observation.
//!
//! # Algorithm
//! 1. Group by normalized code
//! 2. Sort each group by start
//! 3. Sweep: `next` joins `current` when `next.start <= current.end + tolerance`
//! 4. Concatenate groups, sort by start (then code)
//!
//! The higher overall-confidence observation of a pair wins and keeps all
//! its attributes; only the interval end is widened. Ties keep `current`.
//!
//! Merging its own output is a no-op.

use crate::models::{Observation, RANGE_DEFECT_MIN_LENGTH};
use std::collections::BTreeMap;
use tracing::debug;

/// Position gap (meters) under which observations merge
pub const DEFAULT_MERGE_TOLERANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct ObservationMerger {
    tolerance: f64,
}

impl Default for ObservationMerger {
    fn default() -> Self {
        Self::new(DEFAULT_MERGE_TOLERANCE)
    }
}

impl ObservationMerger {
    /// Negative or non-finite tolerances are treated as zero
    pub fn new(tolerance: f64) -> Self {
        let tolerance = if tolerance.is_finite() { tolerance.max(0.0) } else { 0.0 };
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn merge(&self, observations: Vec<Observation>) -> Vec<Observation> {
        let input_count = observations.len();

        let mut groups: BTreeMap<String, Vec<Observation>> = BTreeMap::new();
        for obs in observations {
            groups.entry(obs.code_key()).or_default().push(obs);
        }

        let mut merged = Vec::with_capacity(input_count);
        for (_, mut group) in groups {
            group.sort_by(|a, b| a.start.total_cmp(&b.start));

            let mut runs = group.into_iter();
            let Some(mut current) = runs.next() else {
                continue;
            };

            for next in runs {
                if next.start <= current.end + self.tolerance {
                    current = merge_pair(current, next);
                } else {
                    merged.push(current);
                    current = next;
                }
            }
            merged.push(current);
        }

        merged.sort_by(|a, b| {
            a.start
                .total_cmp(&b.start)
                .then_with(|| a.code_key().cmp(&b.code_key()))
        });

        debug!(input = input_count, output = merged.len(), "Observations merged");
        merged
    }
}

fn merge_pair(current: Observation, next: Observation) -> Observation {
    let end = current.end.max(next.end);
    let mut winner = if next.overall_confidence() > current.overall_confidence() {
        next
    } else {
        current
    };
    winner.end = end;
    winner.is_range_defect = winner.end > winner.start + RANGE_DEFECT_MIN_LENGTH;
    winner
}
