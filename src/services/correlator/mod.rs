//! Pair correlation engine
//!
//! The Correlator is the periodic scheduler that turns per-path occupancy
//! into confirmed (start, end) movements:
//! - Candidate selection from round-robin queues (head-first, per zone)
//! - Debounce timing with post-lock re-validation
//! - Fire-and-forget dispatch hand-off to the worker
//! - Sent-pair supervision (arrival, timeout, dispatch failure)
//! - Queue rotation for fairness once a zone's pairs are exhausted
//!
//! All lock, timer, and sent bookkeeping is mutated on this task only;
//! dispatch outcomes come back over a channel and are folded in between
//! ticks.

mod engine;

use crate::domain::{PairKey, PathId, ZoneId};
use crate::infra::config::{Config, ZoneConfig};
use crate::infra::metrics::Metrics;
use crate::services::dispatch_worker::{DispatchJob, DispatchOutcome};
use crate::services::lock_manager::LockManager;
use crate::services::path_queue::PathQueue;
use crate::services::state_store::StateStore;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Mutable per-pair record
///
/// `timer` is when debounce tracking began; None means not tracking.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PairState {
    pub(crate) timer: Option<Instant>,
}

/// Per-zone runtime state: candidate queues and the pair registry
pub(crate) struct ZoneRuntime {
    pub(crate) id: ZoneId,
    pub(crate) starts: PathQueue,
    pub(crate) ends: PathQueue,
    pub(crate) pair_states: FxHashMap<PairKey, PairState>,
}

impl ZoneRuntime {
    fn new(spec: &ZoneConfig) -> Self {
        let mut zone = Self {
            id: spec.id,
            starts: PathQueue::new(spec.starts.iter().cloned()),
            ends: PathQueue::new(spec.ends.iter().cloned()),
            pair_states: FxHashMap::default(),
        };
        zone.rebuild_pair_states();
        zone
    }

    /// Recreate the start x end pair registry, preserving mid-flight timers
    /// so an in-progress debounce is not lost by rotation.
    pub(crate) fn rebuild_pair_states(&mut self) {
        let mut fresh = FxHashMap::default();
        for start in self.starts.iter() {
            for end in self.ends.iter() {
                let key = PairKey::new(self.id, start.clone(), end.clone());
                let timer = self.pair_states.get(&key).and_then(|state| state.timer);
                fresh.insert(key, PairState { timer });
            }
        }
        self.pair_states = fresh;
    }
}

/// The correlation scheduler
pub struct Correlator {
    pub(crate) zones: Vec<ZoneRuntime>,
    pub(crate) store: Arc<StateStore>,
    pub(crate) locks: Arc<LockManager>,
    /// Dispatched pairs awaiting downstream confirmation, by send time
    pub(crate) sent: FxHashMap<PairKey, Instant>,
    pub(crate) job_tx: mpsc::Sender<DispatchJob>,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) config: Config,
    pub(crate) poll_interval: Duration,
    pub(crate) confirm_threshold: Duration,
    pub(crate) sent_timeout: Duration,
    pub(crate) stuck_timer: Duration,
}

impl Correlator {
    pub fn new(
        config: Config,
        store: Arc<StateStore>,
        locks: Arc<LockManager>,
        metrics: Arc<Metrics>,
        job_tx: mpsc::Sender<DispatchJob>,
    ) -> Self {
        let zones = config.zones().iter().map(ZoneRuntime::new).collect();
        Self {
            zones,
            store,
            locks,
            sent: FxHashMap::default(),
            job_tx,
            metrics,
            poll_interval: config.poll_interval(),
            confirm_threshold: config.confirm_threshold(),
            sent_timeout: config.sent_timeout(),
            stuck_timer: config.stuck_timer(),
            config,
        }
    }

    /// Drive the engine until shutdown
    ///
    /// Suspension happens only between ticks, never mid-evaluation, so each
    /// tick sees a self-consistent view of its own bookkeeping.
    pub async fn run(
        &mut self,
        mut outcome_rx: mpsc::Receiver<DispatchOutcome>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(self.poll_interval);
        info!(
            zones = %self.zones.len(),
            poll_interval_ms = %self.poll_interval.as_millis(),
            confirm_threshold_s = %self.confirm_threshold.as_secs(),
            "correlator_started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Instant::now());
                }
                outcome = outcome_rx.recv() => {
                    match outcome {
                        Some(o) => self.handle_outcome(o),
                        None => break, // Worker gone
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("correlator_shutdown");
                        break;
                    }
                }
            }
        }
    }

    /// Evaluate every zone once
    pub fn tick(&mut self, now: Instant) {
        self.metrics.record_tick();
        for idx in 0..self.zones.len() {
            self.evaluate_zone(idx, now);
        }
    }

    /// Fold a dispatch outcome back into the bookkeeping
    ///
    /// Success keeps the pair in `sent` until the end path confirms or the
    /// sent-timeout fires. Failure releases the claims so the movement
    /// re-enters candidate selection on a later tick.
    pub fn handle_outcome(&mut self, outcome: DispatchOutcome) {
        if outcome.success {
            debug!(pair = %outcome.pair, "dispatch_confirmed");
            return;
        }

        if self.sent.remove(&outcome.pair).is_some() {
            self.release(&outcome.pair, crate::domain::ReleaseReason::DispatchFailed);
            warn!(pair = %outcome.pair, "dispatch_failed_pair_released");
        }
    }

    /// True if the start path is referenced by any sent pair in the system
    pub(crate) fn is_start_sent(&self, start: &PathId) -> bool {
        self.sent.keys().any(|key| &key.start == start)
    }

    pub(crate) fn is_end_sent(&self, end: &PathId) -> bool {
        self.sent.keys().any(|key| &key.end == end)
    }
}
