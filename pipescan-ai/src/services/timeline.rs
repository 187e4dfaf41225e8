//! Playback-time → pipe-position timeline
//!
//! Built from (time, position) samples read off the inspection video
//! overlay. Lookups interpolate linearly between neighbouring samples and
//! clamp outside the covered range.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub time_seconds: f64,
    pub position: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    points: Vec<TimelinePoint>,
}

impl Timeline {
    /// Non-finite samples are dropped; the rest are ordered by time
    pub fn new(points: impl IntoIterator<Item = TimelinePoint>) -> Self {
        let mut points: Vec<TimelinePoint> = points
            .into_iter()
            .filter(|p| p.time_seconds.is_finite() && p.position.is_finite())
            .collect();
        points.sort_by(|a, b| a.time_seconds.total_cmp(&b.time_seconds));
        Self { points }
    }

    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        Self::new(pairs.iter().map(|&(time_seconds, position)| TimelinePoint {
            time_seconds,
            position,
        }))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Position at `time_seconds`, or None for an empty timeline
    pub fn position_at(&self, time_seconds: f64) -> Option<f64> {
        let first = self.points.first()?;
        let last = self.points.last()?;

        if self.points.len() == 1 || time_seconds <= first.time_seconds {
            return Some(first.position);
        }
        if time_seconds >= last.time_seconds {
            return Some(last.position);
        }

        let upper = self
            .points
            .partition_point(|p| p.time_seconds <= time_seconds);
        let a = self.points[upper - 1];
        let b = self.points[upper];

        let span = b.time_seconds - a.time_seconds;
        if span <= 0.0 {
            return Some(a.position);
        }
        let ratio = (time_seconds - a.time_seconds) / span;
        Some(a.position + ratio * (b.position - a.position))
    }
}
