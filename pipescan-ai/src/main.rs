//! pipescan-ai - Sewer inspection frame analysis
//!
//! Command-line front end:
//! - `analyze`: frame manifest → merged observations
//! - `evaluate`: observations + ground truth → accuracy metrics
//! - `samples`: ground truth → training samples (optionally indexed)
//! - `kb`: knowledge base maintenance
//! - `health`: model service probe
//! - `init-config`: write the effective bootstrap configuration to disk

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pipescan_ai::config::AiConfig;
use pipescan_ai::models::{GroundTruthEntry, Observation, Sample};
use pipescan_ai::services::{
    Evaluator, GeneratedSample, GenerationContext, RebuildProgress, SampleGenerator, Timeline,
    TimelinePoint,
};
use pipescan_ai::workflow::{AnalysisRun, PipelineEvent, RunStatus};
use pipescan_ai::AppState;
use pipescan_common::config::{
    default_config_path, load_or_default, write_toml_config, LoggingConfig, RootFolderInitializer,
    TomlConfig,
};

const VERSION_INFO: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", ",
    env!("BUILD_PROFILE"),
    ")"
);

/// Command-line arguments for pipescan-ai
#[derive(Parser, Debug)]
#[command(name = "pipescan-ai")]
#[command(about = "Sewer inspection frame analysis and knowledge base tooling")]
#[command(version = VERSION_INFO)]
struct Args {
    /// Bootstrap TOML configuration file
    #[arg(short, long, env = "PIPESCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder for the knowledge base and generated frames
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse the frames listed in a run manifest (JSON)
    Analyze {
        manifest: PathBuf,
        /// Write observations here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare observations (JSON array) against ground truth (JSON array)
    Evaluate {
        predictions: PathBuf,
        ground_truth: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate training samples from ground truth (JSON array)
    Samples {
        ground_truth: PathBuf,
        #[arg(long)]
        case_id: String,
        /// Video duration in seconds
        #[arg(long)]
        duration: f64,
        /// Position timeline (JSON array of {time_seconds, position})
        #[arg(long)]
        timeline: Option<PathBuf>,
        /// Seen-signature file; read before and updated after generation
        #[arg(long)]
        seen: Option<PathBuf>,
        /// Frame output directory (defaults to <root>/frames)
        #[arg(long)]
        frames_dir: Option<PathBuf>,
        /// Index generated samples into the knowledge base
        #[arg(long)]
        index: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Knowledge base maintenance
    Kb {
        #[command(subcommand)]
        action: KbCommand,
    },

    /// Check that the model service is reachable and the models are present
    Health,

    /// Write the effective configuration to the config file
    InitConfig {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum KbCommand {
    /// Index samples (JSON array) under the open version
    Index { samples: PathBuf },
    /// Remove one sample
    Deindex { sample_id: String },
    /// Clear the store and index samples (JSON array) under a new version
    Rebuild { samples: PathBuf },
    /// Record a version snapshot
    Version {
        #[arg(short, long, default_value = "")]
        notes: String,
    },
    /// Show one version
    Show { version_id: String },
    /// Sample count and versions
    Status,
}

/// Sample file entries: plain samples or `samples` command output
#[derive(Deserialize)]
#[serde(untagged)]
enum SampleRecord {
    Generated(Box<GeneratedSample>),
    Plain(Sample),
}

impl SampleRecord {
    fn into_sample(self) -> Sample {
        match self {
            SampleRecord::Generated(generated) => generated.sample,
            SampleRecord::Plain(sample) => sample,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (toml_config, config_source) = load_or_default(args.config.as_deref());
    init_tracing(&toml_config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        built = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Starting pipescan-ai"
    );
    config_source.log();

    let config = AiConfig::resolve(&toml_config, args.root_folder.clone());
    info!("Root folder: {}", config.root_folder.display());

    match args.command {
        Command::Analyze { manifest, output } => analyze(config, &manifest, output.as_deref()).await,
        Command::Evaluate {
            predictions,
            ground_truth,
            output,
        } => evaluate(&config, &predictions, &ground_truth, output.as_deref()),
        Command::Samples {
            ground_truth,
            case_id,
            duration,
            timeline,
            seen,
            frames_dir,
            index,
            output,
        } => {
            let generated = generate_samples(
                &config,
                &ground_truth,
                &case_id,
                duration,
                timeline.as_deref(),
                seen.as_deref(),
                frames_dir,
            )?;
            write_json(&generated, output.as_deref())?;

            if index {
                let samples: Vec<Sample> = generated.into_iter().map(|g| g.sample).collect();
                let state = open_state(config).await?;
                index_samples(&state, &samples).await?;
            }
            Ok(())
        }
        Command::Kb { action } => knowledge_base(config, action).await,
        Command::Health => health(config).await,
        Command::InitConfig { force } => init_config(&toml_config, args.config.as_deref(), force),
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let default_filter = format!("pipescan_ai={},pipescan_common={}", logging.level, logging.level);

    let file_layer = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}

async fn open_state(config: AiConfig) -> Result<AppState> {
    AppState::initialize(config)
        .await
        .context("Failed to initialize knowledge base and model client")
}

/// Token cancelled on Ctrl+C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, cancelling");
                token.cancel();
            }
            Err(e) => warn!("Ctrl+C handler unavailable: {}", e),
        }
    });
    cancel
}

async fn analyze(config: AiConfig, manifest: &Path, output: Option<&Path>) -> Result<()> {
    let run: AnalysisRun = read_json(manifest)?;
    let state = open_state(config).await?;

    let (event_tx, mut event_rx) = mpsc::channel::<PipelineEvent>(64);
    let pipeline = state.build_pipeline().with_events(event_tx);

    let progress = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match &event {
                PipelineEvent::FrameCompleted {
                    frame_index,
                    descriptions,
                    observations,
                } => info!(frame_index, descriptions, observations, "Frame completed"),
                PipelineEvent::Error {
                    frame_index,
                    message,
                } => warn!(?frame_index, "{}", message),
                other => debug!(event = ?other, "Pipeline event"),
            }
        }
    });

    let cancel = cancel_on_ctrl_c();
    let result = pipeline.run(&run, &cancel).await;
    drop(pipeline);
    let _ = progress.await;

    if result.status == RunStatus::Cancelled {
        warn!(
            frames_processed = result.frames_processed,
            frames_total = result.frames_total,
            "Run cancelled, writing partial results"
        );
    }

    write_json(&result, output)
}

fn evaluate(
    config: &AiConfig,
    predictions: &Path,
    ground_truth: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let predictions: Vec<Observation> = read_json(predictions)?;
    let ground_truth: Vec<GroundTruthEntry> = read_json(ground_truth)?;

    let report = Evaluator::new(config.evaluation.position_tolerance).evaluate(&predictions, &ground_truth);
    if report.is_empty() {
        warn!("Ground truth is empty, nothing to evaluate");
    }

    write_json(&report, output)
}

fn generate_samples(
    config: &AiConfig,
    ground_truth: &Path,
    case_id: &str,
    duration: f64,
    timeline: Option<&Path>,
    seen_path: Option<&Path>,
    frames_dir: Option<PathBuf>,
) -> Result<Vec<GeneratedSample>> {
    let entries: Vec<GroundTruthEntry> = read_json(ground_truth)?;

    let timeline = match timeline {
        Some(path) => Some(Timeline::new(read_json::<Vec<TimelinePoint>>(path)?)),
        None => None,
    };

    let mut seen: HashSet<String> = match seen_path {
        Some(path) if path.exists() => read_json(path)?,
        _ => HashSet::new(),
    };

    let frames_dir = frames_dir
        .unwrap_or_else(|| RootFolderInitializer::new(config.root_folder.clone()).frames_dir());

    let ctx = GenerationContext {
        case_id,
        duration_seconds: duration,
        frames_dir: Some(&frames_dir),
        timeline: timeline.as_ref(),
    };
    let generated = SampleGenerator::new(config.sampling.clone()).generate(&entries, &ctx, &mut seen);

    let mismatches = generated.iter().filter(|g| g.has_mismatch).count();
    if mismatches > 0 {
        warn!(mismatches, "Timeline positions disagree with the protocol");
    }

    if let Some(path) = seen_path {
        let mut signatures: Vec<&String> = seen.iter().collect();
        signatures.sort();
        write_json(&signatures, Some(path))?;
    }

    Ok(generated)
}

async fn knowledge_base(config: AiConfig, action: KbCommand) -> Result<()> {
    let state = open_state(config).await?;
    let kb = &state.knowledge_base;

    match action {
        KbCommand::Index { samples } => {
            let samples = read_samples(&samples)?;
            index_samples(&state, &samples).await
        }
        KbCommand::Deindex { sample_id } => {
            kb.deindex_sample(&sample_id)
                .await
                .with_context(|| format!("Failed to deindex {}", sample_id))?;
            info!(sample_id = %sample_id, "Sample removed");
            Ok(())
        }
        KbCommand::Rebuild { samples } => {
            let samples = read_samples(&samples)?;
            let cancel = cancel_on_ctrl_c();
            let (progress_tx, mut progress_rx) = mpsc::channel::<RebuildProgress>(64);
            let progress = tokio::spawn(async move {
                while let Some(step) = progress_rx.recv().await {
                    info!(
                        processed = step.processed,
                        total = step.total,
                        failed = step.failed,
                        "Rebuild progress"
                    );
                }
            });

            let result = kb.rebuild_with_progress(&samples, &cancel, Some(&progress_tx)).await;
            drop(progress_tx);
            let _ = progress.await;

            let report = result.context("Knowledge base rebuild failed")?;
            info!(
                version_id = %report.version_id,
                indexed = report.indexed,
                failed = report.failed,
                "Rebuild complete"
            );
            Ok(())
        }
        KbCommand::Version { notes } => {
            let version = kb.create_version(&notes).await.context("Failed to create version")?;
            write_json(&version, None)
        }
        KbCommand::Show { version_id } => match kb.version(&version_id).await? {
            Some(version) => write_json(&version, None),
            None => bail!("Version {} not found", version_id),
        },
        KbCommand::Status => {
            #[derive(Serialize)]
            struct Status {
                samples: i64,
                versions: Vec<pipescan_ai::models::Version>,
            }
            let status = Status {
                samples: kb.count().await?,
                versions: kb.versions().await?,
            };
            write_json(&status, None)
        }
    }
}

async fn index_samples(state: &AppState, samples: &[Sample]) -> Result<()> {
    let cancel = cancel_on_ctrl_c();
    let mut indexed = 0usize;

    for sample in samples {
        if state
            .knowledge_base
            .index_sample(sample, &cancel)
            .await
            .with_context(|| format!("Failed to index {}", sample.id))?
        {
            indexed += 1;
        }
    }

    info!(indexed, failed = samples.len() - indexed, "Samples indexed");
    Ok(())
}

async fn health(config: AiConfig) -> Result<()> {
    let settings = config.ollama.clone();
    let client = pipescan_ai::services::OllamaClient::new(settings.clone())
        .context("Failed to create model client")?;

    let status = client.health().await;
    if !status.reachable {
        bail!(
            "Model service at {} unreachable: {}",
            settings.base_url,
            status.error.unwrap_or_default()
        );
    }

    info!(models = status.models.len(), "Model service reachable");
    let mut missing = Vec::new();
    for model in [&settings.vision_model, &settings.text_model, &settings.embed_model] {
        if status.is_model_available(model) {
            info!(model = %model, "Model available");
        } else {
            warn!(model = %model, "Model missing");
            missing.push(model.as_str());
        }
    }

    if !missing.is_empty() {
        bail!("Missing models: {}", missing.join(", "));
    }
    Ok(())
}

fn init_config(toml_config: &TomlConfig, path: Option<&Path>, force: bool) -> Result<()> {
    let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(p) => p,
        None => bail!("No config directory available, pass --config"),
    };
    if path.exists() && !force {
        bail!("{} already exists, use --force to replace it", path.display());
    }

    write_toml_config(toml_config, &path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Configuration written to {}", path.display());
    Ok(())
}

fn read_samples(path: &Path) -> Result<Vec<Sample>> {
    let records: Vec<SampleRecord> = read_json(path)?;
    Ok(records.into_iter().map(SampleRecord::into_sample).collect())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            println!("{}", json);
            Ok(())
        }
    }
}
