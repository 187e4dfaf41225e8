//! Frame analysis workflow
//!
//! Runs inspection frames through the observation pipeline:
//! 1. Vision detection (frame → raw descriptions)
//! 2. Few-shot classification (description → observation)
//! 3. Code validation and plausibility checks
//! 4. Accumulation and merging
//!
//! Progress is reported through [`PipelineEvent`]s on an optional channel.

pub mod pipeline;

pub use pipeline::{Pipeline, PipelineConfig};

use crate::models::Observation;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One extracted inspection frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameInput {
    pub path: PathBuf,
    /// Playback time of the frame (seconds)
    #[serde(default)]
    pub time_seconds: f64,
    /// Pipe position (meters) when read off the video overlay
    #[serde(default)]
    pub position: Option<f64>,
}

/// One inspection run: the frames of a single pipe section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub case_id: String,
    pub frames: Vec<FrameInput>,
    /// Section start (meters)
    #[serde(default)]
    pub start: f64,
    /// Section end (meters)
    #[serde(default)]
    pub end: f64,
    #[serde(default)]
    pub duration_seconds: f64,
}

impl AnalysisRun {
    /// Position of `frame`: its own when known, otherwise interpolated
    /// from its playback time over the section
    pub fn frame_position(&self, frame: &FrameInput) -> f64 {
        if let Some(position) = frame.position {
            return position;
        }
        if self.duration_seconds <= 0.0 {
            return self.start;
        }
        let ratio = (frame.time_seconds / self.duration_seconds).clamp(0.0, 1.0);
        self.start + ratio * (self.end - self.start)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

/// Outcome of a run; partial when cancelled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub case_id: String,
    pub status: RunStatus,
    /// Merged observations, ordered by start
    pub observations: Vec<Observation>,
    /// Accepted observations before merging
    pub raw_count: usize,
    pub frames_processed: usize,
    pub frames_total: usize,
}

/// Pipeline progress events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    RunStarted {
        case_id: String,
        total_frames: usize,
    },

    FrameStarted {
        /// Frame index (0-based)
        frame_index: usize,
        total_frames: usize,
        /// Position used for the frame (meters)
        position: f64,
    },

    FrameCompleted {
        frame_index: usize,
        /// Raw descriptions from vision detection
        descriptions: usize,
        /// Observations accepted from those descriptions
        observations: usize,
    },

    /// Observation classified and checked
    ObservationAccepted {
        frame_index: usize,
        code: String,
        start: f64,
        flags: usize,
    },

    MergeCompleted {
        raw: usize,
        merged: usize,
    },

    RunFinished {
        case_id: String,
        observations: usize,
        frames_processed: usize,
    },

    RunCancelled {
        case_id: String,
        frames_processed: usize,
    },

    Error {
        frame_index: Option<usize>,
        message: String,
    },
}
