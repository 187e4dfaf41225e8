//! Pipeline Orchestrator
//!
//! Drives the per-frame stages and accumulates their observations.
//!
//! # Stages
//! - **Detection**: frame → raw descriptions
//! - **Classification**: description (+ few-shot examples) → observation
//! - **Checks**: code validation, then plausibility
//! - **Merge**: once all frames are done (or the run is cancelled)
//!
//! # Error Handling
//! - Per-frame isolation: a failed detection or classification yields no
//!   observations for that unit and the run continues
//! - Cancellation stops the frame loop; everything accumulated so far is
//!   merged and returned with [`RunStatus::Cancelled`]
//!
//! # Concurrency
//! Up to `max_concurrent_frames` frames are in flight at once. Results are
//! consumed in frame order by the run task, so accumulation needs no lock.

use super::{AnalysisResult, AnalysisRun, FrameInput, PipelineEvent, RunStatus};
use crate::catalog::CodeCatalog;
use crate::error::{AiError, AiResult};
use crate::fusion::ObservationMerger;
use crate::models::Observation;
use crate::services::{Classifier, VisionDetector};
use crate::validators::{CodeValidator, ObservationRule, PlausibilityChecker};
use futures::stream::{self, StreamExt};
use pipescan_common::config::AnalysisSection;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Frames processed concurrently (1 = strictly sequential)
    pub max_concurrent_frames: usize,
    /// Position gap (meters) under which same-code observations merge
    pub merge_tolerance: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AnalysisSection::default())
    }
}

impl From<&AnalysisSection> for PipelineConfig {
    fn from(section: &AnalysisSection) -> Self {
        Self {
            max_concurrent_frames: section.max_concurrent_frames.max(1),
            merge_tolerance: section.merge_tolerance,
        }
    }
}

struct FrameOutcome {
    descriptions: usize,
    observations: Vec<Observation>,
}

pub struct Pipeline {
    detector: VisionDetector,
    classifier: Classifier,
    rules: Vec<Box<dyn ObservationRule>>,
    merger: ObservationMerger,
    config: PipelineConfig,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl Pipeline {
    pub fn new(
        detector: VisionDetector,
        classifier: Classifier,
        catalog: Arc<CodeCatalog>,
        config: PipelineConfig,
    ) -> Self {
        let rules: Vec<Box<dyn ObservationRule>> = vec![
            Box::new(CodeValidator::new(catalog)),
            Box::new(PlausibilityChecker::new()),
        ];

        Self {
            detector,
            classifier,
            rules,
            merger: ObservationMerger::new(config.merge_tolerance),
            config,
            event_tx: None,
        }
    }

    /// Report progress on `event_tx`
    pub fn with_events(mut self, event_tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Analyse every frame of `run`
    ///
    /// Never fails: service problems reduce the result, cancellation cuts
    /// it short.
    pub async fn run(&self, run: &AnalysisRun, cancel: &CancellationToken) -> AnalysisResult {
        let total_frames = run.frames.len();
        info!(
            case_id = %run.case_id,
            frames = total_frames,
            concurrency = self.config.max_concurrent_frames,
            "Analysis run started"
        );
        self.emit_event(PipelineEvent::RunStarted {
            case_id: run.case_id.clone(),
            total_frames,
        })
        .await;

        let mut accumulated = Vec::new();
        let mut frames_processed = 0usize;
        let mut status = RunStatus::Completed;

        let mut outcomes = stream::iter(run.frames.iter().enumerate())
            .map(|(frame_index, frame)| {
                let position = run.frame_position(frame);
                self.process_frame(frame_index, total_frames, frame, position, cancel)
            })
            .buffered(self.config.max_concurrent_frames.max(1));

        while let Some((frame_index, outcome)) = outcomes.next().await {
            match outcome {
                Ok(frame) => {
                    frames_processed += 1;
                    self.emit_event(PipelineEvent::FrameCompleted {
                        frame_index,
                        descriptions: frame.descriptions,
                        observations: frame.observations.len(),
                    })
                    .await;
                    accumulated.extend(frame.observations);
                }
                Err(AiError::Cancelled) => {
                    status = RunStatus::Cancelled;
                    break;
                }
                Err(e) => {
                    warn!(frame_index, error = %e, "Frame failed, continuing");
                    self.emit_event(PipelineEvent::Error {
                        frame_index: Some(frame_index),
                        message: e.to_string(),
                    })
                    .await;
                }
            }
        }
        drop(outcomes);

        let raw_count = accumulated.len();
        let observations = self.merger.merge(accumulated);
        self.emit_event(PipelineEvent::MergeCompleted {
            raw: raw_count,
            merged: observations.len(),
        })
        .await;

        match status {
            RunStatus::Completed => {
                info!(
                    case_id = %run.case_id,
                    raw = raw_count,
                    merged = observations.len(),
                    "Analysis run finished"
                );
                self.emit_event(PipelineEvent::RunFinished {
                    case_id: run.case_id.clone(),
                    observations: observations.len(),
                    frames_processed,
                })
                .await;
            }
            RunStatus::Cancelled => {
                info!(
                    case_id = %run.case_id,
                    frames_processed,
                    frames_total = total_frames,
                    "Analysis run cancelled, returning partial results"
                );
                self.emit_event(PipelineEvent::RunCancelled {
                    case_id: run.case_id.clone(),
                    frames_processed,
                })
                .await;
            }
        }

        AnalysisResult {
            case_id: run.case_id.clone(),
            status,
            observations,
            raw_count,
            frames_processed,
            frames_total: total_frames,
        }
    }

    async fn process_frame(
        &self,
        frame_index: usize,
        total_frames: usize,
        frame: &FrameInput,
        position: f64,
        cancel: &CancellationToken,
    ) -> (usize, AiResult<FrameOutcome>) {
        let outcome = self
            .analyse_frame(frame_index, total_frames, frame, position, cancel)
            .await;
        (frame_index, outcome)
    }

    async fn analyse_frame(
        &self,
        frame_index: usize,
        total_frames: usize,
        frame: &FrameInput,
        position: f64,
        cancel: &CancellationToken,
    ) -> AiResult<FrameOutcome> {
        if cancel.is_cancelled() {
            return Err(AiError::Cancelled);
        }

        self.emit_event(PipelineEvent::FrameStarted {
            frame_index,
            total_frames,
            position,
        })
        .await;

        let descriptions = self.detector.detect(&frame.path, position, cancel).await?;
        debug!(frame_index, descriptions = descriptions.len(), "Frame detected");

        let mut observations = Vec::new();
        for description in &descriptions {
            let Some(observation) = self.classifier.classify(description, position, cancel).await?
            else {
                continue;
            };

            let observation = self
                .rules
                .iter()
                .fold(observation, |obs, rule| rule.apply(obs));

            debug!(
                frame_index,
                code = %observation.code,
                flags = observation.validation_flags.len(),
                "Observation accepted"
            );
            self.emit_event(PipelineEvent::ObservationAccepted {
                frame_index,
                code: observation.code.clone(),
                start: observation.start,
                flags: observation.validation_flags.len(),
            })
            .await;
            observations.push(observation);
        }

        Ok(FrameOutcome {
            descriptions: descriptions.len(),
            observations,
        })
    }

    async fn emit_event(&self, event: PipelineEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }
}
