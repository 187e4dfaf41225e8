//! Frame pipeline integration tests with scripted model backends

mod helpers;

use helpers::fakes::{KeywordEmbedder, ScriptedChat};
use helpers::{create_sample, create_test_db};
use pipescan_ai::catalog::CodeCatalog;
use pipescan_ai::services::{Classifier, EmbeddingClient, KnowledgeBase, Retriever, VisionDetector};
use pipescan_ai::workflow::{
    AnalysisRun, FrameInput, Pipeline, PipelineConfig, PipelineEvent, RunStatus,
};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn write_frames(dir: &Path, positions: &[f64]) -> Vec<FrameInput> {
    positions
        .iter()
        .enumerate()
        .map(|(i, &position)| {
            let path = dir.join(format!("frame_{:03}.png", i));
            std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();
            FrameInput {
                path,
                time_seconds: i as f64,
                position: Some(position),
            }
        })
        .collect()
}

fn run_for(frames: Vec<FrameInput>) -> AnalysisRun {
    AnalysisRun {
        case_id: "case-1".to_string(),
        frames,
        start: 0.0,
        end: 50.0,
        duration_seconds: 100.0,
    }
}

fn pipeline(chat: Arc<ScriptedChat>, config: PipelineConfig) -> Pipeline {
    let catalog = Arc::new(CodeCatalog::builtin());
    Pipeline::new(
        VisionDetector::new(chat.clone(), "vision"),
        Classifier::new(chat, "text", catalog.clone()),
        catalog,
        config,
    )
}

#[tokio::test]
async fn test_adjacent_frames_merge_into_one_observation() {
    let dir = TempDir::new().unwrap();
    let chat = Arc::new(ScriptedChat::new(&["longitudinal crack"]));
    let run = run_for(write_frames(dir.path(), &[10.0, 10.3, 10.6, 30.0]));

    let result = pipeline(chat, PipelineConfig::default())
        .run(&run, &CancellationToken::new())
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.frames_processed, 4);
    assert_eq!(result.raw_count, 4);
    assert_eq!(result.observations.len(), 2);

    let first = &result.observations[0];
    assert_eq!(first.code, "BAB");
    assert_eq!(first.start, 10.0);
    assert_eq!(first.end, 10.6);
    assert!(first.is_range_defect);
    assert!(first.validation_flags.is_empty());
    assert_eq!(result.observations[1].start, 30.0);
}

#[tokio::test]
async fn test_unknown_codes_are_discarded_and_rules_flag() {
    let dir = TempDir::new().unwrap();
    let chat = Arc::new(ScriptedChat::new(&["something odd", "percent fracture"]));
    let run = run_for(write_frames(dir.path(), &[5.0]));

    let result = pipeline(chat, PipelineConfig::default())
        .run(&run, &CancellationToken::new())
        .await;

    assert_eq!(result.raw_count, 1);
    let obs = &result.observations[0];
    assert_eq!(obs.code, "BAB");
    // BAB measured in % breaks both the catalog unit and plausibility
    assert!(obs.validation_flags.iter().any(|f| f.starts_with("V03")));
    assert!(obs.validation_flags.iter().any(|f| f.starts_with("P01")));
    assert!((obs.confidence.classification() - 0.5).abs() < 1e-9);
    assert!((obs.confidence.quantification() - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_missing_frame_does_not_stop_run() {
    let dir = TempDir::new().unwrap();
    let chat = Arc::new(ScriptedChat::new(&["crack"]));
    let mut frames = write_frames(dir.path(), &[1.0, 20.0]);
    frames[0].path = dir.path().join("missing.png");

    let result = pipeline(chat, PipelineConfig::default())
        .run(&run_for(frames), &CancellationToken::new())
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.frames_processed, 2);
    assert_eq!(result.observations.len(), 1);
    assert_eq!(result.observations[0].start, 20.0);
}

#[tokio::test]
async fn test_cancellation_returns_partial_results() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    // frame 0 uses calls 1-2 (vision + classification); call 3 cancels
    let chat = Arc::new(ScriptedChat::new(&["crack"]).cancelling_after(2, cancel.clone()));
    let run = run_for(write_frames(dir.path(), &[1.0, 20.0, 40.0]));

    let result = pipeline(chat.clone(), PipelineConfig::default())
        .run(&run, &cancel)
        .await;

    assert_eq!(result.status, RunStatus::Cancelled);
    assert_eq!(result.frames_processed, 1);
    assert_eq!(result.frames_total, 3);
    assert_eq!(result.observations.len(), 1);
    assert_eq!(result.observations[0].start, 1.0);
    // frame 2 never reached the model
    assert_eq!(chat.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_concurrent_frames_keep_order() {
    let dir = TempDir::new().unwrap();
    let chat = Arc::new(ScriptedChat::new(&["crack", "deposit"]));
    let run = run_for(write_frames(dir.path(), &[40.0, 30.0, 20.0, 10.0]));
    let config = PipelineConfig {
        max_concurrent_frames: 3,
        ..PipelineConfig::default()
    };

    let (tx, mut rx) = mpsc::channel(256);
    let result = pipeline(chat, config)
        .with_events(tx)
        .run(&run, &CancellationToken::new())
        .await;

    assert_eq!(result.observations.len(), 8);
    let starts: Vec<f64> = result.observations.iter().map(|o| o.start).collect();
    assert_eq!(starts, vec![10.0, 10.0, 20.0, 20.0, 30.0, 30.0, 40.0, 40.0]);

    let mut completed = Vec::new();
    let mut finished = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            PipelineEvent::FrameCompleted { frame_index, observations, .. } => {
                assert_eq!(observations, 2);
                completed.push(frame_index);
            }
            PipelineEvent::RunFinished { observations, .. } => {
                assert_eq!(observations, 8);
                finished = true;
            }
            _ => {}
        }
    }
    assert_eq!(completed, vec![0, 1, 2, 3]);
    assert!(finished);
}

#[tokio::test]
async fn test_interpolated_positions_without_overlay() {
    let dir = TempDir::new().unwrap();
    let chat = Arc::new(ScriptedChat::new(&["crack"]));
    let mut frames = write_frames(dir.path(), &[0.0, 0.0]);
    frames[0].position = None;
    frames[0].time_seconds = 50.0;
    frames[1].position = None;
    frames[1].time_seconds = 200.0;

    let result = pipeline(chat, PipelineConfig::default())
        .run(&run_for(frames), &CancellationToken::new())
        .await;

    let starts: Vec<f64> = result.observations.iter().map(|o| o.start).collect();
    assert_eq!(starts, vec![25.0, 50.0]);
}

#[tokio::test]
async fn test_few_shot_examples_reach_the_prompt() {
    let dir = TempDir::new().unwrap();
    let (_db_dir, pool) = create_test_db().await;
    let embedder = EmbeddingClient::new(Arc::new(KeywordEmbedder));
    let cancel = CancellationToken::new();

    KnowledgeBase::new(pool.clone(), embedder.clone())
        .rebuild(&[create_sample("s1", "BAB", "hairline crack near joint")], &cancel)
        .await
        .unwrap();

    let chat = Arc::new(ScriptedChat::new(&["crack at crown"]));
    let catalog = Arc::new(CodeCatalog::builtin());
    let classifier = Classifier::new(chat.clone(), "text", catalog.clone())
        .with_retriever(Arc::new(Retriever::new(pool, embedder)), 3);
    let pipeline = Pipeline::new(
        VisionDetector::new(chat.clone(), "vision"),
        classifier,
        catalog,
        PipelineConfig::default(),
    );

    let result = pipeline
        .run(&run_for(write_frames(dir.path(), &[3.0])), &cancel)
        .await;

    assert_eq!(result.observations.len(), 1);
    let prompts = chat.prompts.lock().unwrap();
    let classification_prompt = prompts.last().unwrap();
    assert!(classification_prompt.contains("--- Similar examples ---"));
    assert!(classification_prompt.contains("Description: hairline crack near joint"));
    assert!(classification_prompt.contains("Code: BAB"));
}
