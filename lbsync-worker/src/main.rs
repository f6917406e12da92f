//! lbsync-worker: load balancer reconciliation worker.
//!
//! This daemon:
//! - Reads desired-state requests from the bus (stdin lines)
//! - Reconciles each one against the provider in its own task
//! - Publishes the result on `<subject>.done` or `<subject>.error` (stdout)

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lbsync_worker::bus::StdioBus;
use lbsync_worker::provider::{FleetFile, MemoryProvider};
use lbsync_worker::{Config, Processor, Worker};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries bus traffic
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lbsync_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::parse();

    let fleet = match &config.fleet {
        Some(path) => FleetFile::load(path)
            .await
            .with_context(|| format!("Failed to load fleet from {}", path.display()))?,
        None => {
            warn!("No fleet file given, starting with an empty fleet");
            FleetFile::default()
        }
    };
    info!(
        "Loaded fleet: {} load balancers, {} accounts",
        fleet.load_balancers.len(),
        fleet.accounts.len()
    );

    if config.dry_run {
        info!("Dry run: plans are logged, nothing is applied");
    }

    let provider = Arc::new(MemoryProvider::from_fleet(fleet));
    let processor = Processor::new(provider, config.dry_run);
    let worker = Worker::new(Arc::new(StdioBus::new()), processor, config.subjects());

    worker
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("Worker stopped")?;

    info!("Worker exited");
    Ok(())
}
