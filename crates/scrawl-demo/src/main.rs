//! Scrawl demo: headless front end for the digit pipeline.
//!
//! `classify` runs one image through load, normalize, classify, and
//! interpret. `replay` feeds a recorded event list through the async
//! session and prints every update as a JSON line.

mod engine;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use scrawl_core::{ClassifierAdapter, ResultInterpreter, ScrawlConfig, ScrawlError};
use scrawl_pipeline::{PipelineController, PipelineEvent, SessionError, spawn_session};

use crate::engine::LinearEngine;

const TOP_K: usize = 3;

#[derive(Parser)]
#[command(name = "scrawl-demo")]
#[command(version, about = "Classify handwritten digits drawn on a canvas")]
struct Cli {
    /// JSON config file. Defaults plus `SCRAWL_*` overrides when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON weights for the linear engine. Without them predictions report
    /// that no model is loaded.
    #[arg(long, global = true, env = "SCRAWL_WEIGHTS")]
    weights: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load an image onto the canvas and predict its digit.
    Classify {
        /// Image file (any format the `image` crate decodes).
        image: PathBuf,
    },

    /// Replay a JSON array of pipeline events through a session.
    Replay {
        /// File containing `[{"type": "Paint", "data": {...}}, ...]`.
        events: PathBuf,

        /// Write the final canvas as a grayscale PNG.
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
}

/// Errors surfaced by the demo binary.
#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid weights: {0}")]
    Weights(String),

    #[error(transparent)]
    Pipeline(#[from] ScrawlError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("could not write snapshot: {0}")]
    Snapshot(#[from] image::ImageError),
}

fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), DemoError> {
    let config = match &cli.config {
        Some(path) => ScrawlConfig::load(path).map_err(ScrawlError::from)?,
        None => ScrawlConfig::from_env().map_err(ScrawlError::from)?,
    };
    let controller = PipelineController::new(&config, bind_engine(cli.weights.as_deref())?);

    match cli.command {
        Command::Classify { image } => classify(controller, &image),
        Command::Replay { events, snapshot } => {
            replay(controller, &events, snapshot.as_deref()).await
        }
    }
}

fn bind_engine(weights: Option<&Path>) -> Result<ClassifierAdapter, DemoError> {
    match weights {
        Some(path) => Ok(ClassifierAdapter::new(LinearEngine::load(path)?)),
        None => {
            tracing::info!("No weights given; running without a model");
            Ok(ClassifierAdapter::unbound())
        }
    }
}

fn classify(mut controller: PipelineController, image: &Path) -> Result<(), DemoError> {
    controller.load_image_path(image)?;

    let job = controller.begin_prediction()?;
    let completion = job.run();
    let distribution = completion.outcome.clone().ok();

    let outcome = controller.complete(completion);
    println!("{}", controller.headline());
    if let scrawl_pipeline::CompletionOutcome::Failed(e) = outcome {
        return Err(e.into());
    }

    if let Some(distribution) = distribution {
        let ranked = ResultInterpreter
            .ranked(&distribution, TOP_K)
            .map_err(ScrawlError::from)?;
        for (rank, result) in ranked.iter().enumerate() {
            println!("  #{} digit {}  {:.2}%", rank + 1, result.label, result.confidence);
        }
    }
    Ok(())
}

async fn replay(
    controller: PipelineController,
    events_path: &Path,
    snapshot: Option<&Path>,
) -> Result<(), DemoError> {
    let text = std::fs::read_to_string(events_path).map_err(|source| DemoError::Io {
        path: events_path.to_path_buf(),
        source,
    })?;
    let events: Vec<PipelineEvent> = serde_json::from_str(&text)?;
    tracing::info!("Replaying {} events from {}", events.len(), events_path.display());

    let session = spawn_session(controller);
    for event in events {
        session.send(event)?;
    }

    let (controller, updates) = session.shutdown().await?;
    for update in &updates {
        println!("{}", serde_json::to_string(update)?);
    }
    println!("{}", controller.headline());
    tracing::info!("Final state {:?}: {}", controller.state(), controller.status());

    if let Some(path) = snapshot {
        controller.canvas().to_gray_image().save(path)?;
        tracing::info!("Wrote canvas snapshot to {}", path.display());
    }
    Ok(())
}
