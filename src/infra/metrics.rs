//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting swaps interval counters
//! back to zero atomically.
//!
//! NOTE: All atomics use Relaxed ordering intentionally - these are
//! statistical counters only. Do NOT use them for coordination or logic
//! decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::info;

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Gateway-wide metrics, shared across tasks via Arc
#[derive(Default)]
pub struct Metrics {
    // Correlation loop
    ticks: AtomicU64,
    pairs_locked: AtomicU64,
    released_invalid: AtomicU64,
    released_timeout: AtomicU64,
    released_stuck: AtomicU64,
    released_failed: AtomicU64,
    released_completed: AtomicU64,
    rotations: AtomicU64,

    // Dispatch
    dispatches_triggered: AtomicU64,
    dispatch_success: AtomicU64,
    dispatch_failure: AtomicU64,
    dispatch_retries: AtomicU64,
    dispatch_queue_full: AtomicU64,
    dispatch_queue_delay_max_us: AtomicU64,

    // Ingest
    state_batches: AtomicU64,
    state_updates: AtomicU64,
    state_batches_rejected: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pair_locked(&self) {
        self.pairs_locked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_release(&self, reason: crate::domain::ReleaseReason) {
        use crate::domain::ReleaseReason::*;
        let counter = match reason {
            InvalidState => &self.released_invalid,
            Timeout => &self.released_timeout,
            Stuck => &self.released_stuck,
            DispatchFailed => &self.released_failed,
            Completed => &self.released_completed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_triggered(&self) {
        self.dispatches_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_success(&self) {
        self.dispatch_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_failure(&self) {
        self.dispatch_failure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_retry(&self) {
        self.dispatch_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_queue_full(&self) {
        self.dispatch_queue_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_queue_delay(&self, delay_us: u64) {
        update_atomic_max(&self.dispatch_queue_delay_max_us, delay_us);
    }

    pub fn record_state_batch(&self, updates: u64) {
        self.state_batches.fetch_add(1, Ordering::Relaxed);
        self.state_updates.fetch_add(updates, Ordering::Relaxed);
    }

    pub fn record_state_batch_rejected(&self) {
        self.state_batches_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot and reset interval counters
    pub fn report(&self) -> MetricsSummary {
        MetricsSummary {
            at: Instant::now(),
            ticks: self.ticks.swap(0, Ordering::Relaxed),
            pairs_locked: self.pairs_locked.swap(0, Ordering::Relaxed),
            released_invalid: self.released_invalid.swap(0, Ordering::Relaxed),
            released_timeout: self.released_timeout.swap(0, Ordering::Relaxed),
            released_stuck: self.released_stuck.swap(0, Ordering::Relaxed),
            released_failed: self.released_failed.swap(0, Ordering::Relaxed),
            released_completed: self.released_completed.swap(0, Ordering::Relaxed),
            rotations: self.rotations.swap(0, Ordering::Relaxed),
            dispatches_triggered: self.dispatches_triggered.swap(0, Ordering::Relaxed),
            dispatch_success: self.dispatch_success.swap(0, Ordering::Relaxed),
            dispatch_failure: self.dispatch_failure.swap(0, Ordering::Relaxed),
            dispatch_retries: self.dispatch_retries.swap(0, Ordering::Relaxed),
            dispatch_queue_full: self.dispatch_queue_full.swap(0, Ordering::Relaxed),
            dispatch_queue_delay_max_us: self.dispatch_queue_delay_max_us.swap(0, Ordering::Relaxed),
            state_batches: self.state_batches.swap(0, Ordering::Relaxed),
            state_updates: self.state_updates.swap(0, Ordering::Relaxed),
            state_batches_rejected: self.state_batches_rejected.swap(0, Ordering::Relaxed),
        }
    }
}

/// Log interval summaries until the shutdown signal fires
pub async fn run_reporter(
    metrics: Arc<Metrics>,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                metrics.report().log();
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

/// Interval snapshot produced by `Metrics::report`
#[derive(Debug)]
pub struct MetricsSummary {
    pub at: Instant,
    pub ticks: u64,
    pub pairs_locked: u64,
    pub released_invalid: u64,
    pub released_timeout: u64,
    pub released_stuck: u64,
    pub released_failed: u64,
    pub released_completed: u64,
    pub rotations: u64,
    pub dispatches_triggered: u64,
    pub dispatch_success: u64,
    pub dispatch_failure: u64,
    pub dispatch_retries: u64,
    pub dispatch_queue_full: u64,
    pub dispatch_queue_delay_max_us: u64,
    pub state_batches: u64,
    pub state_updates: u64,
    pub state_batches_rejected: u64,
}

impl MetricsSummary {
    /// Log the summary as a single structured event
    pub fn log(&self) {
        info!(
            ticks = %self.ticks,
            pairs_locked = %self.pairs_locked,
            released_invalid = %self.released_invalid,
            released_timeout = %self.released_timeout,
            released_stuck = %self.released_stuck,
            released_failed = %self.released_failed,
            released_completed = %self.released_completed,
            rotations = %self.rotations,
            dispatches_triggered = %self.dispatches_triggered,
            dispatch_success = %self.dispatch_success,
            dispatch_failure = %self.dispatch_failure,
            dispatch_retries = %self.dispatch_retries,
            dispatch_queue_full = %self.dispatch_queue_full,
            dispatch_queue_delay_max_us = %self.dispatch_queue_delay_max_us,
            state_batches = %self.state_batches,
            state_updates = %self.state_updates,
            state_batches_rejected = %self.state_batches_rejected,
            "metrics_summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReleaseReason;

    #[test]
    fn test_counters_reset_on_report() {
        let metrics = Metrics::new();
        metrics.record_tick();
        metrics.record_tick();
        metrics.record_pair_locked();
        metrics.record_release(ReleaseReason::InvalidState);
        metrics.record_dispatch_triggered();

        let summary = metrics.report();
        assert_eq!(summary.ticks, 2);
        assert_eq!(summary.pairs_locked, 1);
        assert_eq!(summary.released_invalid, 1);
        assert_eq!(summary.dispatches_triggered, 1);

        let summary = metrics.report();
        assert_eq!(summary.ticks, 0);
        assert_eq!(summary.pairs_locked, 0);
    }

    #[test]
    fn test_queue_delay_max() {
        let metrics = Metrics::new();
        metrics.record_dispatch_queue_delay(100);
        metrics.record_dispatch_queue_delay(500);
        metrics.record_dispatch_queue_delay(200);
        let summary = metrics.report();
        assert_eq!(summary.dispatch_queue_delay_max_us, 500);
    }

    #[tokio::test]
    async fn test_reporter_stops_on_shutdown() {
        let metrics = Arc::new(Metrics::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_reporter(metrics, 60, shutdown_rx));
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn test_release_reasons_counted_separately() {
        let metrics = Metrics::new();
        metrics.record_release(ReleaseReason::Timeout);
        metrics.record_release(ReleaseReason::Completed);
        metrics.record_release(ReleaseReason::Completed);
        let summary = metrics.report();
        assert_eq!(summary.released_timeout, 1);
        assert_eq!(summary.released_completed, 2);
        assert_eq!(summary.released_invalid, 0);
    }
}
