//! Path claim tracking for in-flight pairs
//!
//! The mutual-exclusion gate of the engine: a start or end path is claimed
//! by at most one pair at any instant. Claims are taken when a pair begins
//! its debounce window and held through the sent phase; they are dropped
//! only on abort, completion, timeout, or dispatch failure.
//!
//! All claim state lives behind a single mutex so lock/release are atomic
//! with respect to concurrent evaluation of other zones.

use crate::domain::{PairKey, PathId, ReleaseReason};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

#[derive(Default)]
struct LockTable {
    locked: FxHashSet<PairKey>,
    /// start path -> claiming pair
    active_starts: FxHashMap<PathId, PairKey>,
    /// end path -> claiming pair
    active_ends: FxHashMap<PathId, PairKey>,
}

#[derive(Default)]
pub struct LockManager {
    table: Mutex<LockTable>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim both paths of a pair
    ///
    /// Fails without side effects if either path is claimed by a different
    /// pair. Re-locking the current holder is a no-op returning true.
    pub fn lock_pair(&self, pair: &PairKey) -> bool {
        let mut table = self.table.lock();

        if table.locked.contains(pair) {
            return true;
        }

        let start_conflict =
            table.active_starts.get(&pair.start).map(|held| held != pair).unwrap_or(false);
        let end_conflict =
            table.active_ends.get(&pair.end).map(|held| held != pair).unwrap_or(false);
        if start_conflict || end_conflict {
            debug!(pair = %pair, "lock_pair_conflict");
            return false;
        }

        table.locked.insert(pair.clone());
        table.active_starts.insert(pair.start.clone(), pair.clone());
        table.active_ends.insert(pair.end.clone(), pair.clone());
        debug!(pair = %pair, "pair_locked");
        true
    }

    /// Atomically drop both claims if held by this pair
    ///
    /// Idempotent: releasing an already-released pair is a no-op. Returns
    /// whether a claim was actually dropped.
    pub fn release_pair(&self, pair: &PairKey, reason: ReleaseReason) -> bool {
        let mut table = self.table.lock();

        if !table.locked.remove(pair) {
            return false;
        }

        if table.active_starts.get(&pair.start) == Some(pair) {
            table.active_starts.remove(&pair.start);
        }
        if table.active_ends.get(&pair.end) == Some(pair) {
            table.active_ends.remove(&pair.end);
        }

        info!(pair = %pair, reason = %reason.as_str(), "pair_released");
        true
    }

    pub fn is_locked(&self, pair: &PairKey) -> bool {
        self.table.lock().locked.contains(pair)
    }

    pub fn is_start_claimed(&self, start: &PathId) -> bool {
        self.table.lock().active_starts.contains_key(start)
    }

    pub fn is_end_claimed(&self, end: &PathId) -> bool {
        self.table.lock().active_ends.contains_key(end)
    }

    /// Number of currently locked pairs
    #[allow(dead_code)]
    pub fn locked_count(&self) -> usize {
        self.table.lock().locked.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ZoneId;

    fn pair(zone: u32, start: &str, end: &str) -> PairKey {
        PairKey::new(ZoneId(zone), PathId::from(start), PathId::from(end))
    }

    #[test]
    fn test_lock_and_release() {
        let locks = LockManager::new();
        let p = pair(1, "S1", "E1");

        assert!(locks.lock_pair(&p));
        assert!(locks.is_locked(&p));
        assert!(locks.is_start_claimed(&PathId::from("S1")));
        assert!(locks.is_end_claimed(&PathId::from("E1")));

        assert!(locks.release_pair(&p, ReleaseReason::Completed));
        assert!(!locks.is_locked(&p));
        assert!(!locks.is_start_claimed(&PathId::from("S1")));
        assert!(!locks.is_end_claimed(&PathId::from("E1")));
    }

    #[test]
    fn test_conflicting_start_rejected() {
        let locks = LockManager::new();
        assert!(locks.lock_pair(&pair(1, "S1", "E1")));

        // Same start, different end
        assert!(!locks.lock_pair(&pair(1, "S1", "E2")));
        assert!(!locks.is_locked(&pair(1, "S1", "E2")));
        // Failed lock must leave no partial claim
        assert!(!locks.is_end_claimed(&PathId::from("E2")));
    }

    #[test]
    fn test_conflicting_end_rejected() {
        let locks = LockManager::new();
        assert!(locks.lock_pair(&pair(1, "S1", "E1")));
        assert!(!locks.lock_pair(&pair(1, "S2", "E1")));
        assert!(!locks.is_start_claimed(&PathId::from("S2")));
    }

    #[test]
    fn test_relock_same_pair_is_noop() {
        let locks = LockManager::new();
        let p = pair(1, "S1", "E1");
        assert!(locks.lock_pair(&p));
        assert!(locks.lock_pair(&p));
        assert_eq!(locks.locked_count(), 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let locks = LockManager::new();
        let p = pair(1, "S1", "E1");
        locks.lock_pair(&p);

        assert!(locks.release_pair(&p, ReleaseReason::InvalidState));
        assert!(!locks.release_pair(&p, ReleaseReason::InvalidState));
        assert!(!locks.is_start_claimed(&PathId::from("S1")));
    }

    #[test]
    fn test_release_unknown_pair_is_noop() {
        let locks = LockManager::new();
        assert!(!locks.release_pair(&pair(9, "X", "Y"), ReleaseReason::Timeout));
    }

    #[test]
    fn test_independent_pairs_coexist() {
        let locks = LockManager::new();
        assert!(locks.lock_pair(&pair(1, "S1", "E1")));
        assert!(locks.lock_pair(&pair(2, "S2", "E2")));
        assert_eq!(locks.locked_count(), 2);
    }
}
