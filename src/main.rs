//! Corpus daemon
//!
//! Rebuilds the corpus from the documents directory, then ingests PDFs as
//! they are uploaded until interrupted.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use quizcorpus_lib::config::Config;
use quizcorpus_lib::corpus::Corpus;
use quizcorpus_lib::documents::embeddings::build_embedder;
use quizcorpus_lib::watcher::{UploadWatcher, DEFAULT_DEBOUNCE};

#[derive(Parser)]
#[command(name = "quizcorpus")]
#[command(about = "Build the question corpus and keep it in sync with uploads", long_about = None)]
struct Args {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Debounce window for upload events, in milliseconds
    #[arg(long, default_value_t = DEFAULT_DEBOUNCE.as_millis() as u64)]
    debounce_ms: u64,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).context("loading config")?;
    let embedder = build_embedder(&config.embedding).context("building embedder")?;
    let corpus = Arc::new(Corpus::new(&config, embedder));
    let documents_dir = config.paths.documents_dir.clone();

    // Blocking HTTP clients live outside the async runtime
    match corpus.rebuild_from_dir(&documents_dir) {
        Ok(report) => info!(
            documents = report.documents.len(),
            questions = report.stats.question_count,
            images = report.stats.image_count,
            associations = report.stats.association_count,
            "Startup rebuild complete"
        ),
        Err(e) => error!(error = %e, "Startup rebuild aborted"),
    }

    let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
    runtime.block_on(watch_uploads(
        corpus.clone(),
        documents_dir,
        Duration::from_millis(args.debounce_ms),
    ))?;
    drop(runtime);

    info!(questions = corpus.stats().question_count, "Stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

/// Ingest uploads one at a time until Ctrl+C.
async fn watch_uploads(corpus: Arc<Corpus>, dir: PathBuf, debounce: Duration) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
    let watcher = UploadWatcher::start(&dir, debounce, tx).context("watching upload directory")?;
    info!(dir = %watcher.dir().display(), "Waiting for uploads. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            Some(path) = rx.recv() => {
                let corpus = corpus.clone();
                let shown = path.display().to_string();
                match tokio::task::spawn_blocking(move || corpus.ingest_file(&path)).await {
                    Ok(Ok(result)) => info!(
                        path = %shown,
                        questions = result.question_segments.len(),
                        images = result.image_records.len(),
                        associations = result.associations.len(),
                        "Ingested upload"
                    ),
                    Ok(Err(e)) => error!(path = %shown, error = %e, "Failed to ingest upload"),
                    Err(e) => error!(path = %shown, error = %e, "Ingestion task panicked"),
                }
            }
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping upload watcher");
                break;
            }
        }
    }

    Ok(())
}
