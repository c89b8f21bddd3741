//! Per-tick zone evaluation
//!
//! Phase order within one zone's tick: candidate selection, timer start,
//! timer advancement (confirm / abort / stuck), sent supervision, rotation.
//! End selection happens before start selection, and both state reads for a
//! pair are taken as close together as practical; the post-lock
//! re-validation makes the engine correct even when they are not atomic.

use super::Correlator;
use crate::domain::{PairKey, ReleaseReason};
use crate::services::dispatch_worker::DispatchJob;
use std::time::Instant;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

enum TimerAction {
    Dispatch,
    Abort,
    ForceRelease,
}

impl Correlator {
    pub(crate) fn evaluate_zone(&mut self, idx: usize, now: Instant) {
        if let Some(key) = self.select_candidate(idx) {
            self.begin_timing(idx, key, now);
        }
        self.advance_timers(idx, now);
        self.supervise_sent(idx, now);
        self.maybe_rotate(idx);
    }

    /// Pick the zone's candidate pair for this tick, head-first
    ///
    /// End first: the first end id that is unclaimed, not sent, and reading
    /// clear through the ownership map. Then the first start id that is
    /// unclaimed, not referenced by any sent pair anywhere, and reading
    /// occupied.
    fn select_candidate(&self, idx: usize) -> Option<PairKey> {
        let zone = &self.zones[idx];

        let end = zone.ends.iter().find(|end| {
            !self.locks.is_end_claimed(end)
                && !self.is_end_sent(end)
                && !self.store.get_state(self.config.end_owner(end, zone.id), end)
        })?;

        let start = zone.starts.iter().find(|start| {
            !self.locks.is_start_claimed(start)
                && !self.is_start_sent(start)
                && self.store.get_state(zone.id, start)
        })?;

        Some(PairKey::new(zone.id, start.clone(), end.clone()))
    }

    /// Claim the candidate's paths and start its debounce window
    ///
    /// States may have flipped between selection and lock acquisition, so
    /// both are re-read under the claim; a stale candidate is released on
    /// the spot and never starts timing.
    fn begin_timing(&mut self, idx: usize, key: PairKey, now: Instant) {
        {
            let zone = &self.zones[idx];
            let already_timing =
                zone.pair_states.get(&key).map(|state| state.timer.is_some()).unwrap_or(true);
            if already_timing || self.sent.contains_key(&key) {
                return;
            }
        }

        if !self.locks.lock_pair(&key) {
            return;
        }

        let start_occupied = self.store.get_state(key.zone, &key.start);
        let end_clear = !self.store.get_state(self.config.end_owner(&key.end, key.zone), &key.end);

        if start_occupied && end_clear {
            if let Some(state) = self.zones[idx].pair_states.get_mut(&key) {
                state.timer = Some(now);
            }
            self.metrics.record_pair_locked();
            info!(pair = %key, "pair_timing_started");
        } else {
            self.release(&key, ReleaseReason::InvalidState);
            debug!(pair = %key, "pair_stale_after_lock");
        }
    }

    /// Advance every timing pair: dispatch, abort, or force-release
    fn advance_timers(&mut self, idx: usize, now: Instant) {
        let mut actions: Vec<(PairKey, TimerAction)> = Vec::new();
        {
            let zone = &self.zones[idx];
            for (key, state) in &zone.pair_states {
                let Some(started) = state.timer else { continue };
                let elapsed = now.duration_since(started);

                // Safety net: a debounce window this old means dispatch has
                // not been able to fire for a long time - treat as anomaly
                if elapsed >= self.stuck_timer {
                    actions.push((key.clone(), TimerAction::ForceRelease));
                    continue;
                }

                let start_occupied = self.store.get_state(key.zone, &key.start);
                let end_clear =
                    !self.store.get_state(self.config.end_owner(&key.end, key.zone), &key.end);

                if start_occupied && end_clear {
                    if elapsed >= self.confirm_threshold {
                        actions.push((key.clone(), TimerAction::Dispatch));
                    }
                } else {
                    actions.push((key.clone(), TimerAction::Abort));
                }
            }
        }

        for (key, action) in actions {
            match action {
                TimerAction::Dispatch => self.trigger_dispatch(idx, key, now),
                TimerAction::Abort => {
                    self.clear_timer(idx, &key);
                    self.release(&key, ReleaseReason::InvalidState);
                    debug!(pair = %key, "pair_aborted_invalid_state");
                }
                TimerAction::ForceRelease => {
                    self.clear_timer(idx, &key);
                    self.release(&key, ReleaseReason::Stuck);
                    warn!(pair = %key, "pair_timer_stuck_released");
                }
            }
        }
    }

    /// Hand the confirmed pair to the dispatch worker, fire-and-forget
    ///
    /// On a full queue the timer is kept so the pair retries on the next
    /// tick once the worker drains.
    fn trigger_dispatch(&mut self, idx: usize, key: PairKey, now: Instant) {
        let job = DispatchJob { pair: key.clone(), enqueued_at: now };
        match self.job_tx.try_send(job) {
            Ok(()) => {
                self.clear_timer(idx, &key);
                self.sent.insert(key.clone(), now);
                self.metrics.record_dispatch_triggered();
                info!(pair = %key, "dispatch_triggered");
            }
            Err(TrySendError::Full(_)) => {
                self.metrics.record_dispatch_queue_full();
                warn!(pair = %key, "dispatch_queue_full");
            }
            Err(TrySendError::Closed(_)) => {
                warn!(pair = %key, "dispatch_channel_closed");
            }
        }
    }

    /// Resolve sent pairs: arrival at the end path or sent-timeout
    fn supervise_sent(&mut self, idx: usize, now: Instant) {
        let zone_id = self.zones[idx].id;

        let mut resolved: Vec<(PairKey, ReleaseReason)> = Vec::new();
        for (key, sent_at) in &self.sent {
            if key.zone != zone_id {
                continue;
            }
            let end_occupied =
                self.store.get_state(self.config.end_owner(&key.end, key.zone), &key.end);
            if end_occupied {
                resolved.push((key.clone(), ReleaseReason::Completed));
            } else if now.duration_since(*sent_at) >= self.sent_timeout {
                resolved.push((key.clone(), ReleaseReason::Timeout));
            }
        }

        for (key, reason) in resolved {
            self.sent.remove(&key);
            self.release(&key, reason);
            match reason {
                ReleaseReason::Completed => info!(pair = %key, "pair_completed"),
                _ => warn!(pair = %key, "sent_pair_timed_out"),
            }
        }
    }

    /// Rotate the zone's queues once every pair is sent or terminally
    /// invalid (start clear or end occupied), then rebuild the registry.
    fn maybe_rotate(&mut self, idx: usize) {
        let exhausted = {
            let zone = &self.zones[idx];
            !zone.pair_states.is_empty()
                && zone.pair_states.keys().all(|key| {
                    if self.sent.contains_key(key) {
                        return true;
                    }
                    let start_occupied = self.store.get_state(key.zone, &key.start);
                    let end_occupied =
                        self.store.get_state(self.config.end_owner(&key.end, key.zone), &key.end);
                    !start_occupied || end_occupied
                })
        };
        if !exhausted {
            return;
        }

        let zone = &mut self.zones[idx];
        zone.starts.rotate();
        zone.ends.rotate();
        zone.rebuild_pair_states();
        self.metrics.record_rotation();
        debug!(zone = %zone.id, "zone_queues_rotated");
    }

    pub(crate) fn clear_timer(&mut self, idx: usize, key: &PairKey) {
        if let Some(state) = self.zones[idx].pair_states.get_mut(key) {
            state.timer = None;
        }
    }

    /// Release the pair's claims, counting the release only if one happened
    pub(crate) fn release(&self, key: &PairKey, reason: ReleaseReason) {
        if self.locks.release_pair(key, reason) {
            self.metrics.record_release(reason);
        }
    }
}
