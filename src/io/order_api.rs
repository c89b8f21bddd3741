//! Order-intake API client
//!
//! Submits a confirmed (start, end) pair to the external order-management
//! endpoint. Success is signaled solely by the sentinel code in the JSON
//! response body - a 2xx status with a failure-coded body is a failure.
//! Transport errors and failure-coded responses are both retried a bounded
//! number of times with a fixed backoff; one order ID covers all attempts
//! of a submission so retries never duplicate orders.

use crate::domain::PairKey;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Seam between the correlation engine and the order API transport
#[async_trait]
pub trait OrderApi: Send + Sync {
    /// Submit one confirmed pair. Returns overall success after retries.
    async fn submit(&self, pair: &PairKey) -> bool;
}

/// Persisted, crash-recoverable order counter
///
/// The counter file holds the next value as decimal text and is rewritten
/// on every take, so a restart resumes where the previous run stopped.
pub struct OrderSequence {
    path: PathBuf,
    guard: Mutex<()>,
}

impl OrderSequence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), guard: Mutex::new(()) }
    }

    /// Take the next counter value, persisting the increment
    pub fn next(&self) -> anyhow::Result<u64> {
        let _guard = self.guard.lock();

        let count = match fs::read_to_string(&self.path) {
            Ok(content) => content.trim().parse::<u64>().unwrap_or(1),
            Err(_) => 1,
        };

        fs::write(&self.path, (count + 1).to_string())
            .with_context(|| format!("Failed to persist order counter {}", self.path.display()))?;

        Ok(count)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskOrder {
    model_process_code: String,
    from_system: String,
    order_id: String,
    task_order_detail: Vec<TaskPathEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskPathEntry {
    task_path: String,
}

/// Retry `attempt` up to `max_attempts` times with a fixed backoff between
/// tries. Stops at the first success.
pub(crate) async fn retry_with_backoff<F, Fut>(
    max_attempts: u32,
    backoff: Duration,
    metrics: &Metrics,
    mut attempt: F,
) -> bool
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for n in 1..=max_attempts {
        if attempt(n).await {
            return true;
        }
        if n < max_attempts {
            metrics.record_dispatch_retry();
            tokio::time::sleep(backoff).await;
        }
    }
    false
}

/// HTTP implementation of the order API
pub struct HttpOrderApi {
    url: String,
    success_code: i64,
    order_prefix: String,
    from_system: String,
    model_process_code: String,
    max_retries: u32,
    retry_backoff: Duration,
    client: reqwest::Client,
    sequence: OrderSequence,
    metrics: Arc<Metrics>,
}

impl HttpOrderApi {
    /// Build the client once at boot; a client that cannot honor the
    /// configured timeout must not start dispatching.
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.api_timeout())
            .build()
            .context("Failed to build order API HTTP client")?;

        Ok(Self {
            url: config.api_url().to_string(),
            success_code: config.api_success_code(),
            order_prefix: config.order_prefix().to_string(),
            from_system: config.from_system().to_string(),
            model_process_code: config.model_process_code().to_string(),
            max_retries: config.max_retries(),
            retry_backoff: config.retry_backoff(),
            client,
            sequence: OrderSequence::new(config.counter_file()),
            metrics,
        })
    }

    /// POST the payload once and extract the body's response code
    async fn post_once(&self, payload: &TaskOrder) -> anyhow::Result<i64> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .with_context(|| format!("invalid response body (http status {})", status))?;

        Ok(body.get("code").and_then(|v| v.as_i64()).unwrap_or(-1))
    }
}

#[async_trait]
impl OrderApi for HttpOrderApi {
    async fn submit(&self, pair: &PairKey) -> bool {
        let order_id = match self.sequence.next() {
            Ok(count) => {
                format!("{}_{}_{}", self.order_prefix, Utc::now().format("%Y%m%d"), count)
            }
            Err(e) => {
                error!(pair = %pair, error = %e, "order_counter_failed");
                return false;
            }
        };

        // One payload for all attempts: retries never duplicate orders
        let payload = TaskOrder {
            model_process_code: self.model_process_code.clone(),
            from_system: self.from_system.clone(),
            order_id: order_id.clone(),
            task_order_detail: vec![TaskPathEntry { task_path: pair.task_path() }],
        };

        // Shared references are Copy, so the move closure hands each
        // attempt future its own copies instead of borrowing the closure.
        let this = self;
        let payload_ref = &payload;
        let order_id_ref = order_id.as_str();
        let sent = retry_with_backoff(
            self.max_retries,
            self.retry_backoff,
            self.metrics.as_ref(),
            move |attempt| async move {
                match this.post_once(payload_ref).await {
                    Ok(code) if code == this.success_code => {
                        info!(
                            pair = %pair,
                            order_id = %order_id_ref,
                            attempt = %attempt,
                            "order_submitted"
                        );
                        true
                    }
                    Ok(code) => {
                        warn!(
                            pair = %pair,
                            order_id = %order_id_ref,
                            attempt = %attempt,
                            max_attempts = %this.max_retries,
                            code = %code,
                            "order_rejected"
                        );
                        false
                    }
                    Err(e) => {
                        error!(
                            pair = %pair,
                            order_id = %order_id_ref,
                            attempt = %attempt,
                            max_attempts = %this.max_retries,
                            error = %e,
                            "order_post_failed"
                        );
                        false
                    }
                }
            },
        )
        .await;

        if !sent {
            error!(
                pair = %pair,
                order_id = %order_id,
                attempts = %self.max_retries,
                "order_retries_exhausted"
            );
        }
        sent
    }
}
