//! Read-only progress counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-run work counters, updated by the workers.
#[derive(Debug, Default)]
pub struct ProgressCounters {
    seeds_claimed: AtomicU64,
    searches: AtomicU64,
    descriptions: AtomicU64,
    errors: AtomicU64,
    skipped: AtomicU64,
}

impl ProgressCounters {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A seed term was claimed by a worker.
    pub fn record_seed(&self) {
        self.seeds_claimed.fetch_add(1, Ordering::Relaxed);
    }

    /// A search completed.
    pub fn record_search(&self) {
        self.searches.fetch_add(1, Ordering::Relaxed);
    }

    /// A description was fetched and mined.
    pub fn record_description(&self) {
        self.descriptions.fetch_add(1, Ordering::Relaxed);
    }

    /// A task failed and was dropped.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// A task was skipped (not found, not public, malformed).
    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Seeds claimed so far.
    #[must_use]
    pub fn seeds_claimed(&self) -> u64 {
        self.seeds_claimed.load(Ordering::Relaxed)
    }

    /// Searches completed so far.
    #[must_use]
    pub fn searches(&self) -> u64 {
        self.searches.load(Ordering::Relaxed)
    }

    /// Descriptions mined so far.
    #[must_use]
    pub fn descriptions(&self) -> u64 {
        self.descriptions.load(Ordering::Relaxed)
    }

    /// Failed tasks so far.
    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Skipped tasks so far.
    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// A consistent-enough view of a run, for monitors.
///
/// Fields are read one by one without a global lock; under load they may
/// be a few updates apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Communities in the graph.
    pub communities: usize,
    /// Communities whose description was mined.
    pub confirmed: usize,
    /// Mention edges.
    pub mentions: usize,
    /// Pending describe tasks.
    pub queue_depth: usize,
    /// Work items accepted but not yet finished.
    pub in_flight: usize,
    /// Seed terms handed to workers.
    pub seeds_claimed: u64,
    /// Seed terms in this run.
    pub seeds_total: usize,
    /// Completed searches.
    pub searches: u64,
    /// Mined descriptions.
    pub descriptions: u64,
    /// Upstream calls, retries included.
    pub api_calls: u64,
    /// Retries performed.
    pub retries: u64,
    /// Tasks dropped after an error.
    pub errors: u64,
    /// Tasks skipped as not found, not public or malformed.
    pub skipped: u64,
}

impl std::fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "communities={} confirmed={} mentions={} queue={} in_flight={} seeds={}/{} calls={} retries={} errors={} skipped={}",
            self.communities,
            self.confirmed,
            self.mentions,
            self.queue_depth,
            self.in_flight,
            self.seeds_claimed,
            self.seeds_total,
            self.api_calls,
            self.retries,
            self.errors,
            self.skipped,
        )
    }
}
