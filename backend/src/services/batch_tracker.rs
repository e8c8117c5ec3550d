//! Progress tracking for route generations.
//!
//! Every `request_routes` call registers its pairs under the route generation it
//! was issued with. The record collects counters (cache hits, outcomes, stale
//! drops, retries) and a short log, and is kept for a bounded number of
//! generations so the HTTP layer can report on recent batches.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::models::{RouteResult, RouteStatus, RoutingMode};

/// Number of generations kept before the oldest records are evicted.
pub const DEFAULT_HISTORY: usize = 32;

/// Keep per-generation logs short; the interesting part is the counters.
const MAX_LOG_ENTRIES: usize = 64;

/// A single log entry with timestamp and message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Running,
    Completed,
    Superseded,
}

/// Counters and log for one route generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecord {
    pub generation: u64,
    pub mode: RoutingMode,
    pub status: BatchStatus,
    /// Distinct (point, target) pairs requested.
    pub requested_pairs: usize,
    pub cache_hits: usize,
    /// Pairs sent to the provider.
    pub issued: usize,
    pub reachable: usize,
    pub unreachable: usize,
    pub failed: usize,
    pub retries: usize,
    /// Results that arrived after the generation was superseded.
    pub stale_dropped: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub logs: Vec<LogEntry>,
}

impl BatchRecord {
    fn new(generation: u64, mode: RoutingMode) -> Self {
        Self {
            generation,
            mode,
            status: BatchStatus::Running,
            requested_pairs: 0,
            cache_hits: 0,
            issued: 0,
            reachable: 0,
            unreachable: 0,
            failed: 0,
            retries: 0,
            stale_dropped: 0,
            started_at: Utc::now(),
            finished_at: None,
            logs: Vec::new(),
        }
    }

    /// Results surfaced so far, cache hits included.
    pub fn resolved(&self) -> usize {
        self.cache_hits + self.reachable + self.unreachable + self.failed
    }

    fn push_log(&mut self, level: LogLevel, message: String) {
        if self.logs.len() < MAX_LOG_ENTRIES {
            self.logs.push(LogEntry {
                timestamp: Utc::now(),
                level,
                message,
            });
        }
    }
}

/// In-memory tracker keyed by route generation.
#[derive(Clone)]
pub struct BatchTracker {
    batches: Arc<RwLock<BTreeMap<u64, BatchRecord>>>,
    history: usize,
}

impl BatchTracker {
    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }

    pub fn with_history(history: usize) -> Self {
        Self {
            batches: Arc::new(RwLock::new(BTreeMap::new())),
            history: history.max(1),
        }
    }

    /// Register a request under `generation`.
    ///
    /// A second request under the same generation adds to the existing record.
    pub fn start(&self, generation: u64, mode: RoutingMode, requested: usize, cache_hits: usize) {
        let mut batches = self.batches.write();
        let record = batches
            .entry(generation)
            .or_insert_with(|| BatchRecord::new(generation, mode));
        record.status = BatchStatus::Running;
        record.finished_at = None;
        record.requested_pairs += requested;
        record.cache_hits += cache_hits;
        record.push_log(
            LogLevel::Info,
            format!(
                "Requested {} pairs ({} from cache) in {} mode",
                requested, cache_hits, mode
            ),
        );

        while batches.len() > self.history {
            let Some(oldest) = batches.keys().next().copied() else {
                break;
            };
            batches.remove(&oldest);
        }
    }

    /// Count a result surfaced from the provider.
    pub fn record(&self, result: &RouteResult) {
        let mut batches = self.batches.write();
        if let Some(record) = batches.get_mut(&result.generation) {
            match result.status {
                RouteStatus::Reachable => record.reachable += 1,
                RouteStatus::Unreachable => record.unreachable += 1,
                RouteStatus::Failed => record.failed += 1,
                RouteStatus::Pending => {}
            }
        }
    }

    /// Count a pair actually sent to the provider (once, whatever the retries).
    pub fn record_issued(&self, generation: u64) {
        if let Some(record) = self.batches.write().get_mut(&generation) {
            record.issued += 1;
        }
    }

    pub fn record_retry(&self, generation: u64) {
        if let Some(record) = self.batches.write().get_mut(&generation) {
            record.retries += 1;
        }
    }

    pub fn record_stale(&self, generation: u64) {
        if let Some(record) = self.batches.write().get_mut(&generation) {
            record.stale_dropped += 1;
        }
    }

    pub fn log(&self, generation: u64, level: LogLevel, message: impl Into<String>) {
        if let Some(record) = self.batches.write().get_mut(&generation) {
            record.push_log(level, message.into());
        }
    }

    /// Mark the generation's request as finished.
    pub fn finish(&self, generation: u64, superseded: bool) {
        if let Some(record) = self.batches.write().get_mut(&generation) {
            // A superseded generation never goes back to completed.
            if record.status != BatchStatus::Superseded {
                record.status = if superseded {
                    BatchStatus::Superseded
                } else {
                    BatchStatus::Completed
                };
            }
            record.finished_at = Some(Utc::now());
            let message = format!(
                "{} of {} pairs resolved ({} stale dropped)",
                record.resolved(),
                record.requested_pairs,
                record.stale_dropped
            );
            record.push_log(LogLevel::Info, message);
        }
    }

    /// Mark every running generation older than `current` as superseded.
    pub fn supersede_before(&self, current: u64) {
        let mut batches = self.batches.write();
        for record in batches.range_mut(..current).map(|(_, r)| r) {
            if record.status == BatchStatus::Running {
                record.status = BatchStatus::Superseded;
                record.push_log(
                    LogLevel::Warning,
                    format!("Superseded by generation {}", current),
                );
            }
        }
    }

    pub fn get(&self, generation: u64) -> Option<BatchRecord> {
        self.batches.read().get(&generation).cloned()
    }

    pub fn latest(&self) -> Option<BatchRecord> {
        self.batches.read().values().next_back().cloned()
    }

    /// All retained records, oldest first.
    pub fn list(&self) -> Vec<BatchRecord> {
        self.batches.read().values().cloned().collect()
    }
}

impl Default for BatchTracker {
    fn default() -> Self {
        Self::new()
    }
}
