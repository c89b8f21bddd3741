//! TCP listener for vision-pipeline occupancy updates
//!
//! Listens on port 25901 for connections from the detection pipeline.
//! Protocol: one JSON object per line,
//! `{"zone": 4, "updates": {"10000565": true, "10000557": false}}`.
//! Each line is applied as one batch so updates for unrelated keys are
//! never clobbered.

use crate::domain::{PathId, ZoneId};
use crate::infra::metrics::Metrics;
use crate::services::state_store::StateStore;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// State listener configuration
#[derive(Debug, Clone)]
pub struct StateListenerConfig {
    pub port: u16,
    pub enabled: bool,
}

impl Default for StateListenerConfig {
    fn default() -> Self {
        Self { port: 25901, enabled: true }
    }
}

/// One line on the wire: a batch of occupancy readings for a zone
#[derive(Debug, Deserialize)]
struct StateBatch {
    zone: u32,
    updates: HashMap<String, bool>,
}

fn parse_batch(line: &str) -> Result<StateBatch, serde_json::Error> {
    serde_json::from_str(line)
}

/// Start the state ingest TCP listener
///
/// Accepts connections from the vision pipeline and applies batched
/// occupancy updates to the shared StateStore.
pub async fn start_state_listener(
    config: StateListenerConfig,
    store: Arc<StateStore>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if !config.enabled {
        info!("state_listener_disabled");
        return Ok(());
    }

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!(port = %config.port, "state_listener_started");

    loop {
        tokio::select! {
            // Check for shutdown
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("state_listener_shutdown");
                    return Ok(());
                }
            }
            // Accept new connections
            result = listener.accept() => {
                match result {
                    Ok((socket, addr)) => {
                        let store = store.clone();
                        let m = metrics.clone();
                        tokio::spawn(async move {
                            handle_state_connection(socket, addr, store, m).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "state_listener_accept_failed");
                    }
                }
            }
        }
    }
}

async fn handle_state_connection(
    socket: tokio::net::TcpStream,
    addr: SocketAddr,
    store: Arc<StateStore>,
    metrics: Arc<Metrics>,
) {
    let peer_ip = addr.ip().to_string();
    debug!(ip = %peer_ip, "state_connection_accepted");

    let reader = BufReader::new(socket);
    let mut lines = reader.lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_batch(line) {
            Ok(batch) => {
                let count = batch.updates.len() as u64;
                store.batch_update(
                    ZoneId(batch.zone),
                    batch.updates.into_iter().map(|(path, occupied)| (PathId(path), occupied)),
                );
                metrics.record_state_batch(count);
            }
            Err(e) => {
                metrics.record_state_batch_rejected();
                warn!(peer_ip = %peer_ip, error = %e, "state_batch_invalid");
            }
        }
    }

    debug!(peer_ip = %peer_ip, "state_connection_closed");
}
