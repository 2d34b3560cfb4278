//! CLI entry point for the coursepack tool.

use std::collections::HashSet;
use std::io::{self, IsTerminal, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use coursepack_core::{
    Database, LibraryStore, MemoryLibraryStore, PackagePhase, PackageItem, Pipeline,
    PipelineConfig, PipelineEvent, SqliteLibraryStore,
};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");
    info!("Coursepack starting");

    // Read the catalogue: from the positional file or stdin
    let catalog_text = match &args.catalog {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalogue {}", path.display()))?,
        None if !io::stdin().is_terminal() => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
        None => {
            info!("No catalogue provided. Pass a JSON file or pipe one via stdin.");
            info!("Example: coursepack catalogue.json");
            return Ok(());
        }
    };

    let items: Vec<PackageItem> = serde_json::from_str(&catalog_text)
        .context("catalogue is not a JSON array of package descriptors")?;

    if items.is_empty() {
        info!("No packages in catalogue");
        return Ok(());
    }

    info!(packages = items.len(), "Parsed catalogue");

    let images_root = args
        .images
        .clone()
        .unwrap_or_else(|| args.output.join("images"));
    let mut config = PipelineConfig::new(args.output.clone(), images_root);
    config.concurrency = usize::from(args.concurrency);
    config.runtime_assets_dir = args.assets.clone();

    let library: Arc<dyn LibraryStore> = if args.ephemeral {
        Arc::new(MemoryLibraryStore::new())
    } else {
        let state_dir = args.output.join(".coursepack");
        std::fs::create_dir_all(&state_dir)?;
        let db = Database::new(&state_dir.join("library.db")).await?;
        Arc::new(SqliteLibraryStore::new(db))
    };

    let pipeline = Arc::new(Pipeline::new(config, library));

    // Subscribe before enqueueing so no transition is missed
    let mut events = pipeline.subscribe();

    let mut tracked: HashSet<_> = HashSet::new();
    for item in items {
        let id = item.id.clone();
        if pipeline.enqueue(item) {
            tracked.insert(id);
        } else {
            warn!(id = %id, "duplicate package id in catalogue, skipped");
        }
    }

    if tracked.is_empty() {
        info!("Nothing to do");
        return Ok(());
    }

    let total = tracked.len();
    let (spinner_handle, stop) = spawn_progress_ui(!args.quiet, Arc::clone(&pipeline), total);

    let mut installed = 0usize;
    let mut failed = 0usize;
    let mut cancelled = 0usize;

    while !tracked.is_empty() {
        match events.recv().await {
            Ok(event) => {
                if !event.is_terminal() {
                    continue;
                }
                let id = event.package_id().clone();
                if !tracked.remove(&id) {
                    continue;
                }
                match event {
                    PipelineEvent::Installed { .. } => installed += 1,
                    PipelineEvent::Cancelled { .. } => cancelled += 1,
                    PipelineEvent::Failed { error, .. } => {
                        warn!(id = %id, error = %error, "package failed");
                        failed += 1;
                    }
                    _ => {}
                }
            }
            // Progress bursts can outpace a slow terminal; terminal events
            // are sparse, so just keep reading.
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }

    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = spinner_handle {
        let _ = handle.await;
    }

    info!(installed, failed, cancelled, total, "Run complete");
    Ok(())
}

/// Spawns the progress UI (spinner) when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
fn spawn_progress_ui(
    use_spinner: bool,
    pipeline: Arc<Pipeline>,
    total: usize,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let handle = tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        while !flag.load(Ordering::SeqCst) {
            let snapshot = pipeline.snapshot();
            let in_flight = snapshot.len();
            let done = total.saturating_sub(in_flight);
            let downloading = snapshot
                .iter()
                .filter(|status| status.phase == PackagePhase::Downloading)
                .count();
            let installing = snapshot
                .iter()
                .filter(|status| status.phase == PackagePhase::Installing)
                .count();

            spinner.set_message(format!(
                "[{}/{}] {} downloading, {} installing...",
                done.min(total),
                total,
                downloading,
                installing
            ));
            tokio::time::sleep(Duration::from_millis(120)).await;
        }

        spinner.finish_and_clear();
    });
    (Some(handle), stop)
}
