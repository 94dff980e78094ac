//! fs-monitor: headless file change-status monitor.
//!
//! Watches the configured files and folders, keeps their change status
//! relative to a JSON baseline, and reports every classified change.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use monitor_core::worker::{self, MonitorHandle};
use monitor_core::{Engine, EventBus, MonitorEvent, NativeProbe, StatusSnapshot, StatusStore};
use monitor_daemon::{Config, FileBaseline, NotifySource, StatusStorage};

#[derive(Parser, Debug)]
#[command(name = "fs-monitor")]
#[command(about = "File change-status monitor")]
struct Args {
    /// Directory holding config.json
    #[arg(short, long, default_value = ".fs-monitor")]
    config: PathBuf,

    /// Additional file or folder to monitor (repeatable)
    #[arg(short, long)]
    watch: Vec<PathBuf>,

    /// Baseline JSON file (overrides config)
    #[arg(long)]
    baseline: Option<PathBuf>,

    /// State file for the status store (overrides config)
    #[arg(long)]
    state: Option<PathBuf>,

    /// Print notifications as JSON lines on stdout
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

fn report(event: &MonitorEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Failed to serialize notification: {}", e),
        }
        return;
    }

    match event {
        MonitorEvent::WatchInstallFailed { path, reason } => {
            warn!("Watch failed for {}: {}", path, reason)
        }
        MonitorEvent::PredictionTargetNotFound { path } => {
            warn!("Monitored path not found: {}", path)
        }
        MonitorEvent::SourceTerminated { reason } => error!("Event source terminated: {}", reason),
        other => info!("{:?}", other),
    }
}

async fn persist(handle: &MonitorHandle, storage: &StatusStorage) {
    match handle.snapshot().await {
        Ok(snapshot) => save(storage, &snapshot),
        Err(e) => warn!("Failed to snapshot status store: {}", e),
    }
}

fn save(storage: &StatusStorage, snapshot: &StatusSnapshot) {
    if let Err(e) = storage.save(snapshot) {
        error!("Failed to persist status store to {:?}: {:#}", storage.path(), e);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,monitor_core=debug,monitor_daemon=debug"
    } else {
        "info,monitor_core=info,monitor_daemon=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting fs-monitor");

    let config = Config::load(&args.config)?;
    let mut predictions = config.predictions.clone();
    predictions.extend(args.watch.iter().cloned());
    info!("Monitoring {} path(s)", predictions.len());

    let baseline = match args.baseline.as_ref().or(config.baseline_file.as_ref()) {
        Some(path) => Arc::new(FileBaseline::load(path)?),
        None => {
            info!("No baseline configured, every item counts as new");
            Arc::new(FileBaseline::empty())
        }
    };

    let storage = args
        .state
        .clone()
        .or_else(|| config.state_file.clone())
        .map(StatusStorage::new);
    let store = match &storage {
        Some(storage) => match storage.load()? {
            Some(snapshot) => {
                info!("Restored status store from {:?}", storage.path());
                StatusStore::restore(snapshot)
            }
            None => StatusStore::new(),
        },
        None => StatusStore::new(),
    };

    let bus = Arc::new(EventBus::new());
    let mut notifications = bus.subscribe();

    let (sender, inbox) = worker::inbox();
    let source = NotifySource::new(sender.clone(), config.rename_window())?;
    let engine = Engine::new(source, Arc::clone(&baseline), NativeProbe, Arc::clone(&bus))
        .with_store(store);
    let handle = worker::spawn(engine, predictions, (sender, inbox))?;

    let mut persist_timer = tokio::time::interval(config.persist_interval());
    persist_timer.tick().await;

    info!("Monitor running. Press Ctrl+C to stop.");

    // Main event loop
    loop {
        tokio::select! {
            Some(event) = notifications.recv() => {
                report(&event, args.json);
                if matches!(event, MonitorEvent::SourceTerminated { .. }) {
                    break;
                }
            }

            _ = persist_timer.tick() => {
                if let Err(e) = baseline.reload() {
                    warn!("Failed to reload baseline: {:#}", e);
                }
                if let Some(storage) = &storage {
                    persist(&handle, storage).await;
                }
            }

            // Handle graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Shutting down");
    let exit = tokio::task::spawn_blocking(move || handle.shutdown()).await??;
    for event in notifications.drain() {
        report(&event, args.json);
    }
    if let Some(storage) = &storage {
        save(storage, &exit.snapshot);
    }
    info!("Monitor stopped: {:?}", exit.reason);
    Ok(())
}
