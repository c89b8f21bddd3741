//! Round-robin candidate queue for a zone's start or end paths
//!
//! Only queue heads are favored during candidate selection, so `rotate`
//! is what guarantees every configured combination eventually gets a turn
//! at the head. With N starts and M ends held at admissible states, all
//! min(N,M) pairings surface within N+M rotation cycles.

use crate::domain::PathId;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct PathQueue {
    paths: VecDeque<PathId>,
}

impl PathQueue {
    pub fn new(paths: impl IntoIterator<Item = PathId>) -> Self {
        Self { paths: paths.into_iter().collect() }
    }

    /// Move the head to the tail
    pub fn rotate(&mut self) {
        if let Some(head) = self.paths.pop_front() {
            self.paths.push_back(head);
        }
    }

    /// Head-first iteration order
    pub fn iter(&self) -> impl Iterator<Item = &PathId> {
        self.paths.iter()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    #[cfg(test)]
    pub fn head(&self) -> Option<&PathId> {
        self.paths.front()
    }
}
