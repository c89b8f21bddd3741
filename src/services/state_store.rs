//! Thread-safe occupancy state shared between ingest and correlation
//!
//! Last-known boolean occupancy per (zone, path). The vision pipeline
//! writes through `update_state`/`batch_update`; the correlation loop only
//! reads. Readings may be stale by up to the pipeline's sampling interval
//! and a start read and an end read taken in the same scan are not atomic -
//! the correlator re-validates after locking to cover this.

use crate::domain::{PathId, ZoneId};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

#[derive(Default)]
pub struct StateStore {
    states: Mutex<FxHashMap<(ZoneId, PathId), bool>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last-known occupancy, defaulting to clear for unknown keys
    pub fn get_state(&self, zone: ZoneId, path: &PathId) -> bool {
        let states = self.states.lock();
        states.get(&(zone, path.clone())).copied().unwrap_or(false)
    }

    pub fn update_state(&self, zone: ZoneId, path: PathId, occupied: bool) {
        let mut states = self.states.lock();
        states.insert((zone, path), occupied);
    }

    /// Apply a batch of updates under one lock acquisition
    ///
    /// Only the given keys are touched; unrelated entries are untouched.
    pub fn batch_update(&self, zone: ZoneId, updates: impl IntoIterator<Item = (PathId, bool)>) {
        let mut states = self.states.lock();
        let mut applied = 0usize;
        for (path, occupied) in updates {
            states.insert((zone, path), occupied);
            applied += 1;
        }
        debug!(zone = %zone, updates = %applied, "state_batch_applied");
    }

    /// Number of known (zone, path) keys
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_key_defaults_to_clear() {
        let store = StateStore::new();
        assert!(!store.get_state(ZoneId(1), &PathId::from("10000452")));
    }

    #[test]
    fn test_update_and_read() {
        let store = StateStore::new();
        store.update_state(ZoneId(1), PathId::from("S1"), true);
        assert!(store.get_state(ZoneId(1), &PathId::from("S1")));

        store.update_state(ZoneId(1), PathId::from("S1"), false);
        assert!(!store.get_state(ZoneId(1), &PathId::from("S1")));
    }

    #[test]
    fn test_same_path_different_zones() {
        let store = StateStore::new();
        store.update_state(ZoneId(1), PathId::from("E1"), true);
        assert!(store.get_state(ZoneId(1), &PathId::from("E1")));
        assert!(!store.get_state(ZoneId(2), &PathId::from("E1")));
    }

    #[test]
    fn test_batch_update_does_not_clobber_unrelated_keys() {
        let store = StateStore::new();
        store.update_state(ZoneId(1), PathId::from("S1"), true);
        store.update_state(ZoneId(2), PathId::from("S2"), true);

        store.batch_update(
            ZoneId(1),
            vec![(PathId::from("E1"), true), (PathId::from("S1"), false)],
        );

        assert!(!store.get_state(ZoneId(1), &PathId::from("S1")));
        assert!(store.get_state(ZoneId(1), &PathId::from("E1")));
        // Untouched by the batch
        assert!(store.get_state(ZoneId(2), &PathId::from("S2")));
    }
}
