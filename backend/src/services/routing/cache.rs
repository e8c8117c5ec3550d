//! Route result cache with a generation counter.
//!
//! The generation identifies the current set of routing parameters. Bumping it
//! (supersede) marks all in-flight work as stale; clearing the cache
//! (invalidate) always bumps it too. Only Reachable and Unreachable results of
//! the current generation are stored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::api::TargetId;
use crate::models::{RouteKey, RouteResult};

#[derive(Debug, Default)]
pub struct RouteCache {
    generation: AtomicU64,
    entries: RwLock<HashMap<RouteKey, RouteResult>>,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Start a new generation, keeping cached entries. Returns the new generation.
    pub fn supersede(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Drop every entry and start a new generation.
    pub fn invalidate(&self) -> u64 {
        let mut entries = self.entries.write();
        entries.clear();
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self, key: &RouteKey) -> Option<RouteResult> {
        self.entries.read().get(key).cloned()
    }

    /// Store a definitive result. Returns false when the result is not
    /// cacheable or belongs to an older generation.
    pub fn insert(&self, result: &RouteResult) -> bool {
        if !result.is_definitive() {
            return false;
        }
        // Holding the write lock orders this check against `invalidate`.
        let mut entries = self.entries.write();
        if !self.is_current(result.generation) {
            return false;
        }
        entries.insert(result.key(), result.clone());
        true
    }

    /// Drop every entry routed to `target`. Returns how many were removed.
    pub fn evict_target(&self, target: TargetId) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| key.target != target);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
