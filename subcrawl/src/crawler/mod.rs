//! The concurrent discovery engine.
//!
//! [`WorkerPool`] runs a fixed number of tokio tasks over shared state:
//! the [`GraphStore`](crate::graph::GraphStore), the
//! [`DiscoveryQueue`](crate::queue::DiscoveryQueue), one
//! [`ApiClient`](crate::client::ApiClient) and the seed term feed. Each
//! worker either searches a seed term or describes a queued community,
//! records what it learns and queues newly referenced names. The run ends
//! when all work is drained, a cap is reached, the token is cancelled or a
//! worker hits a fatal error.

mod pool;
mod tracker;
mod worker;

mod integration_tests;

pub use pool::{ProgressHandle, WorkerPool, WorkerPoolBuilder};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::observability::ProgressSnapshot;

/// Why a run ended without a fatal error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// Every seed was searched and every queued community described.
    Exhausted,
    /// `max_communities` communities were confirmed.
    CommunityCap {
        /// The configured cap.
        limit: usize,
    },
    /// `max_api_calls` upstream calls were made.
    CallBudget {
        /// The configured budget.
        limit: u64,
    },
    /// The run's token was cancelled.
    Cancelled {
        /// Reason given to the token.
        reason: String,
    },
}

impl StopReason {
    /// Returns true if the run stopped before draining its work.
    #[must_use]
    pub fn is_early(&self) -> bool {
        !matches!(self, Self::Exhausted)
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted => f.write_str("exhausted"),
            Self::CommunityCap { limit } => write!(f, "community cap of {limit} reached"),
            Self::CallBudget { limit } => write!(f, "call budget of {limit} spent"),
            Self::Cancelled { reason } => write!(f, "cancelled: {reason}"),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    /// Run identifier.
    pub run_id: Uuid,
    /// Why the run ended.
    pub stop_reason: StopReason,
    /// Final counters.
    pub progress: ProgressSnapshot,
    /// Wall-clock duration.
    pub elapsed: Duration,
}

/// What [`WorkerPool::restore`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreSummary {
    /// Communities in the snapshot.
    pub communities: usize,
    /// Communities queued for describing.
    pub requeued: usize,
    /// Confirmed communities marked seen instead.
    pub skipped: usize,
}
