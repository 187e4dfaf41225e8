//! Training sample generation from verified ground truth
//!
//! Each entry becomes one sample, or several evenly spaced samples across
//! a long enough range defect. Every sample gets a playback time so the
//! matching frame can be extracted:
//! - `explicit`: the entry carries a recorded timestamp
//! - `timeline`: linear estimate, cross-checked against a position timeline
//! - `linear`: `position / max_position × duration`
//!
//! Signatures already in the caller's seen-set are skipped, so generating
//! twice from the same protocol adds nothing the second time.

use super::timeline::Timeline;
use crate::models::{GroundTruthEntry, Sample};
use chrono::Utc;
use pipescan_common::config::SamplingSection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Gap kept between the last generated time and the end of the video
const END_MARGIN_SECONDS: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSource {
    Linear,
    Timeline,
    Explicit,
}

/// Generated sample plus how its time was derived
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedSample {
    pub sample: Sample,
    /// Sampled position (meters)
    pub position: f64,
    pub time_seconds: f64,
    /// Position read back from the timeline at `time_seconds`
    pub detected_position: Option<f64>,
    pub position_source: PositionSource,
    /// |detected − sampled| position, when a timeline was available
    pub delta: Option<f64>,
    pub has_mismatch: bool,
    pub signature: String,
    /// Index of the point within its range (0 for point entries)
    pub frame_index: usize,
}

/// Per-video inputs to one generation run
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    pub case_id: &'a str,
    pub duration_seconds: f64,
    /// Directory generated frame images go to
    pub frames_dir: Option<&'a Path>,
    pub timeline: Option<&'a Timeline>,
}

#[derive(Debug, Clone)]
pub struct SampleGenerator {
    settings: SamplingSection,
}

impl Default for SampleGenerator {
    fn default() -> Self {
        Self::new(SamplingSection::default())
    }
}

impl SampleGenerator {
    pub fn new(settings: SamplingSection) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SamplingSection {
        &self.settings
    }

    /// Generate samples for `entries`, recording new signatures in `seen`
    pub fn generate(
        &self,
        entries: &[GroundTruthEntry],
        ctx: &GenerationContext<'_>,
        seen: &mut HashSet<String>,
    ) -> Vec<GeneratedSample> {
        let max_position = entries
            .iter()
            .map(GroundTruthEntry::end_or_start)
            .fold(0.0f64, f64::max);
        let max_position = if max_position > 0.0 {
            max_position
        } else {
            ctx.duration_seconds
        };

        let mut generated = Vec::new();
        let mut skipped = 0usize;

        for entry in entries {
            let code = entry.code.trim().to_ascii_uppercase();
            if code.is_empty() {
                continue;
            }

            for (frame_index, point) in self.sample_points(entry).into_iter().enumerate() {
                let signature = signature(&code, point, entry.end_or_start());
                if !seen.insert(signature.clone()) {
                    skipped += 1;
                    continue;
                }

                generated.push(self.build(
                    entry,
                    &code,
                    point,
                    frame_index,
                    signature,
                    max_position,
                    ctx,
                ));
            }
        }

        info!(
            case_id = ctx.case_id,
            generated = generated.len(),
            skipped,
            "Sample generation complete"
        );
        generated
    }

    /// Positions to sample for one entry
    fn sample_points(&self, entry: &GroundTruthEntry) -> Vec<f64> {
        if entry.timestamp_seconds.is_some() {
            return vec![entry.start];
        }

        let end = entry.end_or_start();
        let length = end - entry.start;
        let count = self.settings.range_sample_count;

        if entry.is_range_defect && length >= self.settings.min_range_length && count > 1 {
            let step = length / (count - 1) as f64;
            (0..count).map(|i| entry.start + step * i as f64).collect()
        } else {
            vec![entry.start]
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        entry: &GroundTruthEntry,
        code: &str,
        point: f64,
        frame_index: usize,
        signature: String,
        max_position: f64,
        ctx: &GenerationContext<'_>,
    ) -> GeneratedSample {
        let latest = (ctx.duration_seconds - END_MARGIN_SECONDS).max(0.0);

        let (time_seconds, source, detected) = match entry.timestamp_seconds {
            Some(ts) => (ts.clamp(0.0, latest), PositionSource::Explicit, None),
            None => {
                let linear = if max_position > 0.0 {
                    point / max_position * ctx.duration_seconds
                } else {
                    0.0
                };
                let time = linear.clamp(0.0, latest);
                match ctx.timeline.and_then(|t| t.position_at(time)) {
                    Some(pos) => (time, PositionSource::Timeline, Some(pos)),
                    None => (time, PositionSource::Linear, None),
                }
            }
        };

        let delta = detected.map(|pos| (pos - point).abs());
        let has_mismatch = delta
            .map(|d| d > self.settings.mismatch_threshold)
            .unwrap_or(false);
        if has_mismatch {
            debug!(code, point, ?detected, "Timeline position disagrees with protocol");
        }

        let id = format!(
            "{}_{}_{:.2}_{}",
            sanitize_case_id(ctx.case_id),
            code,
            point,
            Uuid::new_v4().simple()
        );
        let frame_ref = ctx
            .frames_dir
            .map(|dir| dir.join(format!("{}.png", id)).to_string_lossy().into_owned())
            .unwrap_or_default();
        let description = if entry.text.trim().is_empty() {
            code.to_string()
        } else {
            entry.text.trim().to_string()
        };

        GeneratedSample {
            sample: Sample {
                id,
                case_id: ctx.case_id.to_string(),
                code: code.to_string(),
                description,
                start: entry.start,
                end: entry.end_or_start(),
                is_range_defect: entry.is_range_defect,
                frame_ref,
                exported_at: Utc::now(),
                version_id: None,
            },
            position: point,
            time_seconds,
            detected_position: detected,
            position_source: source,
            delta,
            has_mismatch,
            signature,
            frame_index,
        }
    }
}

/// Deduplication key: `CODE|point|end`, positions rounded to 0.1 m
pub fn signature(code: &str, point: f64, end: f64) -> String {
    format!("{}|{:.1}|{:.1}", code, round1(point), round1(end))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn sanitize_case_id(case_id: &str) -> String {
    case_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(timeline: Option<&'a Timeline>) -> GenerationContext<'a> {
        GenerationContext {
            case_id: "Haltung 12/3",
            duration_seconds: 100.0,
            frames_dir: None,
            timeline,
        }
    }

    #[test]
    fn test_point_entry_linear_time() {
        let entries = [GroundTruthEntry::point("bab", 25.0), GroundTruthEntry::point("BAE", 50.0)];
        let mut seen = HashSet::new();
        let samples = SampleGenerator::default().generate(&entries, &ctx(None), &mut seen);

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].sample.code, "BAB");
        assert_eq!(samples[0].time_seconds, 50.0);
        assert_eq!(samples[0].position_source, PositionSource::Linear);
        // last entry sits at max position, clamped away from the end
        assert!((samples[1].time_seconds - 99.9).abs() < 1e-9);
        assert!(samples[0].sample.id.starts_with("Haltung_12_3_BAB_25.00_"));
        assert!(samples[0].sample.frame_ref.is_empty());
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_range_entry_evenly_spaced() {
        let entries = [GroundTruthEntry::range("BCC", 10.0, 14.0)];
        let samples = SampleGenerator::default().generate(&entries, &ctx(None), &mut HashSet::new());

        let points: Vec<f64> = samples.iter().map(|s| s.position).collect();
        assert_eq!(points, vec![10.0, 11.0, 12.0, 13.0, 14.0]);
        let indices: Vec<usize> = samples.iter().map(|s| s.frame_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert!(samples.iter().all(|s| s.sample.start == 10.0 && s.sample.end == 14.0));
    }

    #[test]
    fn test_short_range_single_point() {
        let entries = [GroundTruthEntry::range("BCC", 10.0, 10.3)];
        let samples = SampleGenerator::default().generate(&entries, &ctx(None), &mut HashSet::new());
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].position, 10.0);
    }

    #[test]
    fn test_regeneration_is_idempotent() {
        let entries = [GroundTruthEntry::range("BCC", 10.0, 14.0), GroundTruthEntry::point("BAB", 3.0)];
        let generator = SampleGenerator::default();
        let mut seen = HashSet::new();

        assert_eq!(generator.generate(&entries, &ctx(None), &mut seen).len(), 6);
        assert!(generator.generate(&entries, &ctx(None), &mut seen).is_empty());
    }

    #[test]
    fn test_explicit_timestamp_wins() {
        let mut entry = GroundTruthEntry::range("BCC", 10.0, 14.0);
        entry.timestamp_seconds = Some(250.0);
        let samples = SampleGenerator::default().generate(&[entry], &ctx(None), &mut HashSet::new());

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].position_source, PositionSource::Explicit);
        assert!((samples[0].time_seconds - 99.9).abs() < 1e-9);
    }

    #[test]
    fn test_timeline_mismatch() {
        let timeline = Timeline::from_pairs(&[(0.0, 0.0), (100.0, 60.0)]);
        let entries = [GroundTruthEntry::point("BAB", 10.0), GroundTruthEntry::point("BAE", 50.0)];
        let samples =
            SampleGenerator::default().generate(&entries, &ctx(Some(&timeline)), &mut HashSet::new());

        // 10 m → 20 s → timeline says 12 m
        assert_eq!(samples[0].position_source, PositionSource::Timeline);
        assert!((samples[0].delta.unwrap() - 2.0).abs() < 1e-9);
        assert!(samples[0].has_mismatch);
    }

    #[test]
    fn test_frame_ref_uses_frames_dir() {
        let dir = Path::new("/tmp/frames");
        let context = GenerationContext {
            frames_dir: Some(dir),
            ..ctx(None)
        };
        let samples = SampleGenerator::default().generate(
            &[GroundTruthEntry::point("BAB", 1.0)],
            &context,
            &mut HashSet::new(),
        );
        let expected = dir.join(format!("{}.png", samples[0].sample.id));
        assert_eq!(samples[0].sample.frame_ref, expected.to_string_lossy());
    }

    #[test]
    fn test_signature_rounding() {
        assert_eq!(signature("BAB", 10.04, 12.96), "BAB|10.0|13.0");
    }
}
