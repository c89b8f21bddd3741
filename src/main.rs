//! ICS gateway - camera-driven task order dispatch
//!
//! Correlates per-path occupancy from the vision pipeline into confirmed
//! (start, end) cargo movements and submits them to the order-intake API.
//!
//! Module structure:
//! - `domain/` - Core business types (ZoneId, PathId, PairKey)
//! - `io/` - External interfaces (order API, state ingest listener)
//! - `services/` - Business logic (Correlator, LockManager, DispatchWorker)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use ics_gateway::infra::{Config, Metrics};
use ics_gateway::io::{start_state_listener, HttpOrderApi, StateListenerConfig};
use ics_gateway::services::{create_dispatch_worker, Correlator, LockManager, StateStore};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// ICS gateway - occupancy correlation and order dispatch
#[derive(Parser, Debug)]
#[command(name = "ics-gateway", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "ics-gateway starting");

    let args = Args::parse();

    // An inconsistent pairing table must never reach the loop
    let config = Config::from_file(&args.config)?;

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        api_url = %config.api_url(),
        zones = %config.zones().len(),
        poll_interval_ms = %config.poll_interval().as_millis(),
        confirm_threshold_s = %config.confirm_threshold().as_secs(),
        sent_timeout_s = %config.sent_timeout().as_secs(),
        ingest_port = %config.ingest_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create shared components
    let store = Arc::new(StateStore::new());
    let locks = Arc::new(LockManager::new());
    let metrics = Arc::new(Metrics::new());

    // Dispatch worker: submissions run off the correlation loop
    let api = Arc::new(HttpOrderApi::new(&config, metrics.clone())?);
    let (job_tx, outcome_rx, worker) =
        create_dispatch_worker(api, config.max_inflight(), 64, metrics.clone());
    tokio::spawn(worker.run());

    // State ingest TCP listener
    let listener_config =
        StateListenerConfig { port: config.ingest_port(), enabled: config.ingest_enabled() };
    let listener_store = store.clone();
    let listener_metrics = metrics.clone();
    let listener_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) =
            start_state_listener(listener_config, listener_store, listener_metrics, listener_shutdown)
                .await
        {
            tracing::error!(error = %e, "State listener error");
        }
    });

    // Start metrics reporter (lock-free reads with full summary)
    tokio::spawn(ics_gateway::infra::metrics::run_reporter(
        metrics.clone(),
        config.metrics_interval_secs(),
        shutdown_rx.clone(),
    ));

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run the correlation loop until shutdown
    let mut correlator = Correlator::new(config, store, locks, metrics, job_tx);
    correlator.run(outcome_rx, shutdown_rx).await;

    info!("ics-gateway shutdown complete");
    Ok(())
}
