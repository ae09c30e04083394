//! magi-client - Main entry point
//!
//! Drives one pipeline workflow from the terminal:
//! upload → analysis → configuration → processing → complete.
//!
//! Workflow events are rendered as they arrive; Ctrl+C cancels the
//! in-flight request or status polling.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use magi_common::config::{resolve_config, TomlConfig, ENV_CONFIG_PATH};
use magi_common::events::{EventBus, Stage, WorkflowEvent};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use magi_client::models::{
    AnalysisResult, ProcessConfig, UploadCandidate, UploadExtras, UploadSource, VideoUpload,
};
use magi_client::{ControllerSettings, HttpPipelineApi, UploadGate, WorkflowController};

/// Command-line arguments for magi-client
#[derive(Parser, Debug)]
#[command(name = "magi-client")]
#[command(about = "Workflow client for the Magi video pipeline")]
#[command(version, long_version = env!("MAGI_BUILD_INFO"))]
struct Cli {
    /// Config file (defaults to <config dir>/magi/config.toml)
    #[arg(long, global = true, env = ENV_CONFIG_PATH)]
    config: Option<PathBuf>,

    /// Pipeline server base URL (overrides MAGI_SERVER_URL and the config file)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a video and follow it through processing
    Run(RunArgs),
    /// Check whether a file would be accepted for upload
    Check {
        /// Video file
        video: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Video file to process
    video: PathBuf,

    /// Processing option as key=value (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = ProcessConfig::parse_assignment)]
    set: Vec<(String, String)>,

    /// Download output files when processing completes
    #[arg(long)]
    download: bool,

    /// Where to put downloads (overrides download_dir from the config file)
    #[arg(long)]
    download_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = resolve_config(cli.config.as_deref(), cli.server.as_deref())
        .context("Failed to load configuration")?;
    init_tracing(&config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        server_url = %config.server_url,
        "Starting magi-client"
    );

    match cli.command {
        Command::Check { video } => check(&config, &video).await,
        Command::Run(args) => run(config, args).await,
    }
}

/// Install the global subscriber: `RUST_LOG` wins over the configured level
fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

async fn check(config: &TomlConfig, video: &Path) -> Result<()> {
    let candidate = UploadCandidate::from_path(video)
        .await
        .with_context(|| format!("Cannot read {}", video.display()))?;
    let gate = UploadGate::new(config.max_upload_bytes);

    match gate.validate(&candidate) {
        Ok(()) => {
            println!(
                "{}: accepted ({} bytes, {})",
                candidate.name,
                candidate.size_bytes,
                if candidate.mime_type.is_empty() {
                    "type unknown, accepted by extension"
                } else {
                    candidate.mime_type.as_str()
                }
            );
            Ok(())
        }
        Err(rejection) => bail!("{}: {}", candidate.name, rejection),
    }
}

async fn run(config: TomlConfig, args: RunArgs) -> Result<()> {
    let api = Arc::new(HttpPipelineApi::from_config(&config).context("Invalid server URL")?);
    let event_bus = EventBus::new(100);
    let mut controller = WorkflowController::new(
        api.clone(),
        ControllerSettings::from(&config),
        event_bus.clone(),
    );

    let renderer = tokio::spawn(render_events(controller.subscribe()));

    let token = controller.cancellation_token();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, cancelling workflow");
            token.cancel();
        }
    });

    let outcome = drive(&mut controller, &api, &config, args).await;

    drop(controller);
    drop(event_bus);
    if let Err(e) = renderer.await {
        warn!(error = %e, "Event renderer ended abnormally");
    }
    outcome
}

/// Steps 1-4 plus the optional download
async fn drive(
    controller: &mut WorkflowController,
    api: &HttpPipelineApi,
    config: &TomlConfig,
    args: RunArgs,
) -> Result<()> {
    let candidate = UploadCandidate::from_path(&args.video)
        .await
        .with_context(|| format!("Cannot read {}", args.video.display()))?;
    let upload = VideoUpload::new(candidate, UploadSource::File(args.video.clone()));

    let stage = controller.submit_upload(upload).await.context("Upload failed")?;
    if stage == Stage::Analysis {
        // Analysis failures are retryable; try once more before giving up
        warn!("Retrying video analysis");
        controller
            .request_analysis()
            .await
            .context("Video analysis failed")?;
    }

    if let Some(analysis) = controller.analysis() {
        print_analysis(analysis, controller.extras());
    }

    let form_values: ProcessConfig = args.set.into_iter().collect();
    controller
        .submit_config(form_values)
        .await
        .context("Processing did not start")?;

    match controller.wait_for_completion().await {
        Stage::Complete => {}
        Stage::Failed => bail!(
            "Processing failed: {}",
            controller.pending_error().unwrap_or("unknown error")
        ),
        stage => bail!("Workflow cancelled during {}", stage),
    }

    for file in controller.output_files() {
        println!("  output: {} ({})", file.name, api.absolute_url(&file.download_path())?);
    }
    if let Some(path) = controller.editor_url() {
        println!("  editor: {}", api.absolute_url(&path)?);
    }

    if args.download {
        let dest = args
            .download_dir
            .or_else(|| config.download_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        for file in controller.output_files() {
            let path = api
                .download_output(file, &dest)
                .await
                .with_context(|| format!("Failed to download {}", file.name))?;
            println!("  saved: {}", path.display());
        }
    }

    Ok(())
}

fn print_analysis(analysis: &AnalysisResult, extras: &UploadExtras) {
    for line in analysis_lines(analysis, extras) {
        println!("{}", line);
    }
}

/// Analysis summary as printed after upload
fn analysis_lines(analysis: &AnalysisResult, extras: &UploadExtras) -> Vec<String> {
    const UNKNOWN: &str = "unknown";
    let mut lines = Vec::new();

    let summary = analysis.summary();
    lines.push(format!(
        "Video: duration {}, resolution {}, size {}",
        summary.duration.as_deref().unwrap_or(UNKNOWN),
        summary.resolution.as_deref().unwrap_or(UNKNOWN),
        summary.file_size.as_deref().unwrap_or(UNKNOWN)
    ));
    for (n, track) in analysis.audio_tracks().iter().enumerate() {
        lines.push(format!(
            "  audio {}: {} ({})",
            n + 1,
            track.language.as_deref().unwrap_or(UNKNOWN),
            track.codec.as_deref().unwrap_or(UNKNOWN)
        ));
    }
    for (n, track) in analysis.subtitle_tracks().iter().enumerate() {
        lines.push(format!(
            "  subtitle {}: {} ({})",
            n + 1,
            track.language.as_deref().unwrap_or(UNKNOWN),
            track.format.as_deref().unwrap_or(UNKNOWN)
        ));
    }
    for subtitle in analysis.external_subtitles() {
        lines.push(format!(
            "  external subtitle: {} ({})",
            subtitle.filename,
            subtitle.language.as_deref().unwrap_or(UNKNOWN)
        ));
    }
    if let Some(models) = &extras.whisper_models {
        lines.push(format!(
            "  whisper models: {} (recommended: {})",
            models
                .models
                .iter()
                .map(|m| m.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            models.default_choice().unwrap_or("none")
        ));
    }
    lines
}

/// Print workflow events until the bus closes
async fn render_events(mut rx: broadcast::Receiver<WorkflowEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event renderer fell behind");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            WorkflowEvent::StageChanged { new_stage, .. } => match new_stage.step_number() {
                Some(step) => println!("[{}/5] {}", step, new_stage),
                None => println!("[x] {}", new_stage),
            },
            WorkflowEvent::SessionStarted {
                session_id,
                file_name,
                ..
            } => println!("Uploaded {} (session {})", file_name, session_id),
            WorkflowEvent::ProgressUpdated {
                progress,
                stage_label,
                ..
            } => println!("  {:5.1}%  {}", progress, stage_label),
            WorkflowEvent::ErrorRaised { message, .. } => eprintln!("error: {}", message),
            WorkflowEvent::WorkflowCompleted { output_files, .. } => {
                println!("Done: {} output file(s)", output_files.len())
            }
            WorkflowEvent::AnalysisReady { .. }
            | WorkflowEvent::ProcessingStarted { .. }
            | WorkflowEvent::SessionReset { .. } => {}
        }
    }
}
