mod commands;
mod config;
mod models;
mod notify;
mod scheduler;
mod scrapers;
mod store;

use anyhow::{Context, Result};
use commands::CommandRouter;
use config::Config;
use notify::WebhookNotifier;
use scheduler::Scheduler;
use scrapers::{DaftFetcher, Extractor};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};
use store::{DedupStore, Snapshot};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Console output plus a plain-text copy in the log file
fn init_logging(log_file: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file {}", log_file.display()))?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        )
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_logging(&config.log_file)?;

    info!("🏠 Daft Watch");
    info!("==========================================");

    let fetcher = Arc::new(DaftFetcher::with_params(&config.search, config.fetch_timeout)?);
    info!("Search URL: {}", fetcher.url());

    let notifier = Arc::new(WebhookNotifier::new(
        &config.webhook_url,
        &config.webhook_username,
    )?);

    let store = DedupStore::load(&config.dedup_path, config.dedup_max_entries).await;
    if store.is_empty() {
        info!(
            "No known addresses in {}, every current listing will be announced",
            store.path().display()
        );
    }

    let snapshot = Snapshot::load(&config.snapshot_path).await;
    info!(
        "Snapshot holds {} records ({} processed)",
        snapshot.records().len(),
        snapshot.processed_count()
    );

    // Capacity 1: repeated manual triggers collapse into one pending run
    let (trigger_tx, trigger_rx) = mpsc::channel(1);
    let router = CommandRouter::new(config.owner_id.clone(), trigger_tx, notifier.clone());
    tokio::spawn(commands::run_console(router, commands::console_identity()));

    let scheduler = Scheduler::new(
        fetcher,
        Extractor::new(config.extract_policy()),
        notifier,
        store,
        config.poll_interval,
    )
    .with_snapshot(snapshot);

    scheduler.run(trigger_rx).await;

    Ok(())
}
