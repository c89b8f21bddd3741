//! Dispatch worker - submits confirmed pairs off the hot path
//!
//! Decouples order submission from the correlation loop so a slow or
//! failing HTTP call can never stall matching. The correlator enqueues
//! jobs via an mpsc channel; the worker runs each submission as its own
//! task, bounded by a semaphore, and reports the outcome back on a second
//! channel. All lock/sent bookkeeping stays on the correlator task.

use crate::domain::PairKey;
use crate::infra::metrics::Metrics;
use crate::io::order_api::OrderApi;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

/// A confirmed pair awaiting submission
#[derive(Debug)]
pub struct DispatchJob {
    pub pair: PairKey,
    /// When the job was enqueued (for queue delay measurement)
    pub enqueued_at: Instant,
}

/// Result of one submission, fed back into the correlation loop
#[derive(Debug)]
pub struct DispatchOutcome {
    pub pair: PairKey,
    pub success: bool,
}

/// Worker that processes dispatch jobs with bounded concurrency
pub struct DispatchWorker {
    api: Arc<dyn OrderApi>,
    job_rx: mpsc::Receiver<DispatchJob>,
    outcome_tx: mpsc::Sender<DispatchOutcome>,
    permits: Arc<Semaphore>,
    metrics: Arc<Metrics>,
}

impl DispatchWorker {
    pub fn new(
        api: Arc<dyn OrderApi>,
        job_rx: mpsc::Receiver<DispatchJob>,
        outcome_tx: mpsc::Sender<DispatchOutcome>,
        max_inflight: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            api,
            job_rx,
            outcome_tx,
            permits: Arc::new(Semaphore::new(max_inflight.max(1))),
            metrics,
        }
    }

    /// Run the worker, processing jobs until the channel closes
    pub async fn run(mut self) {
        info!("dispatch_worker_started");

        while let Some(job) = self.job_rx.recv().await {
            let queue_delay_us = job.enqueued_at.elapsed().as_micros() as u64;
            self.metrics.record_dispatch_queue_delay(queue_delay_us);

            // Backlog indicator: jobs should leave the queue within one tick
            if queue_delay_us > 1_000_000 {
                warn!(
                    pair = %job.pair,
                    queue_delay_us = %queue_delay_us,
                    "dispatch_queue_delay_high"
                );
            }

            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break, // Semaphore closed, shutting down
            };

            let api = self.api.clone();
            let outcome_tx = self.outcome_tx.clone();
            let metrics = self.metrics.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let start = Instant::now();
                let success = api.submit(&job.pair).await;
                let latency_us = start.elapsed().as_micros() as u64;

                if success {
                    metrics.record_dispatch_success();
                } else {
                    metrics.record_dispatch_failure();
                }
                info!(
                    pair = %job.pair,
                    success = %success,
                    latency_us = %latency_us,
                    "dispatch_finished"
                );

                // Correlator gone means we are shutting down; drop silently
                let _ = outcome_tx.send(DispatchOutcome { pair: job.pair, success }).await;
            });
        }

        info!("dispatch_worker_stopped");
    }
}

/// Create the dispatch job/outcome channels and the worker
///
/// Returns the job sender (for the correlator), the outcome receiver (for
/// the correlator), and the worker to be spawned.
pub fn create_dispatch_worker(
    api: Arc<dyn OrderApi>,
    max_inflight: usize,
    buffer_size: usize,
    metrics: Arc<Metrics>,
) -> (mpsc::Sender<DispatchJob>, mpsc::Receiver<DispatchOutcome>, DispatchWorker) {
    let (job_tx, job_rx) = mpsc::channel(buffer_size);
    let (outcome_tx, outcome_rx) = mpsc::channel(buffer_size);
    let worker = DispatchWorker::new(api, job_rx, outcome_tx, max_inflight, metrics);
    (job_tx, outcome_rx, worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PathId, ZoneId};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Scripted order API: pops the next result per submission
    struct MockOrderApi {
        results: Mutex<Vec<bool>>,
        submissions: Mutex<Vec<PairKey>>,
    }

    impl MockOrderApi {
        fn new(results: Vec<bool>) -> Self {
            Self { results: Mutex::new(results), submissions: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl OrderApi for MockOrderApi {
        async fn submit(&self, pair: &PairKey) -> bool {
            self.submissions.lock().push(pair.clone());
            let mut results = self.results.lock();
            if results.is_empty() {
                true
            } else {
                results.remove(0)
            }
        }
    }

    fn pair(start: &str, end: &str) -> PairKey {
        PairKey::new(ZoneId(1), PathId::from(start), PathId::from(end))
    }

    #[tokio::test]
    async fn test_outcome_reported_for_each_job() {
        let api = Arc::new(MockOrderApi::new(vec![true, false]));
        let metrics = Arc::new(Metrics::new());
        let (job_tx, mut outcome_rx, worker) =
            create_dispatch_worker(api.clone(), 2, 16, metrics.clone());
        tokio::spawn(worker.run());

        job_tx.send(DispatchJob { pair: pair("S1", "E1"), enqueued_at: Instant::now() }).await.unwrap();
        let outcome = outcome_rx.recv().await.unwrap();
        assert_eq!(outcome.pair, pair("S1", "E1"));
        assert!(outcome.success);

        job_tx.send(DispatchJob { pair: pair("S2", "E2"), enqueued_at: Instant::now() }).await.unwrap();
        let outcome = outcome_rx.recv().await.unwrap();
        assert_eq!(outcome.pair, pair("S2", "E2"));
        assert!(!outcome.success);

        let summary = metrics.report();
        assert_eq!(summary.dispatch_success, 1);
        assert_eq!(summary.dispatch_failure, 1);
    }

    #[tokio::test]
    async fn test_worker_stops_when_job_channel_closes() {
        let api = Arc::new(MockOrderApi::new(vec![]));
        let metrics = Arc::new(Metrics::new());
        let (job_tx, _outcome_rx, worker) = create_dispatch_worker(api, 1, 4, metrics);

        let handle = tokio::spawn(worker.run());
        drop(job_tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_each_pair_submitted_once() {
        let api = Arc::new(MockOrderApi::new(vec![true]));
        let metrics = Arc::new(Metrics::new());
        let (job_tx, mut outcome_rx, worker) =
            create_dispatch_worker(api.clone(), 4, 16, metrics);
        tokio::spawn(worker.run());

        job_tx.send(DispatchJob { pair: pair("S1", "E1"), enqueued_at: Instant::now() }).await.unwrap();
        outcome_rx.recv().await.unwrap();

        let submissions = api.submissions.lock();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0], pair("S1", "E1"));
    }
}
