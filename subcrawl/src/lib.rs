//! # Subcrawl
//!
//! A concurrent discovery engine that maps online communities by the
//! communities they mention.
//!
//! Starting from generated search terms, a pool of workers searches the
//! upstream API for matching communities, fetches each community's profile,
//! mines its description for references to other communities and queues
//! those in turn. The result is a directed mention graph with:
//!
//! - **Exact-once describing**: every name is queued at most once per run
//! - **Shared rate limiting**: one pacing budget across all workers
//! - **Retry with backoff**: throttling and transient failures are retried
//! - **Cooperative cancellation**: runs stop cleanly with a partial graph
//! - **Resumable state**: snapshots can be saved and restored
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use subcrawl::prelude::*;
//!
//! let api = Arc::new(RedditClient::new(RedditConfig::new(id, secret, agent))?);
//! let pool = WorkerPool::builder(api)
//!     .config(CrawlerConfig::default().with_workers(4).with_max_communities(500))
//!     .build()?;
//!
//! let report = pool.run().await?;
//! println!("{}: {}", report.stop_reason, report.progress);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod client;
pub mod config;
pub mod crawler;
pub mod discovery;
pub mod errors;
pub mod events;
pub mod graph;
pub mod observability;
pub mod persistence;
pub mod queue;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, StructuredTaskGroup};
    pub use crate::client::{
        ApiClient, BackoffConfig, CommunityApi, CommunityProfile, JitterStrategy,
        RateLimitConfig, RateLimiter, SearchHit,
    };
    #[cfg(feature = "reddit")]
    pub use crate::client::{RedditClient, RedditConfig};
    pub use crate::config::CrawlerConfig;
    pub use crate::crawler::{
        CrawlReport, ProgressHandle, RestoreSummary, StopReason, WorkerPool, WorkerPoolBuilder,
    };
    pub use crate::discovery::{canonical_name, RelationshipExtractor, SearchTerms};
    pub use crate::errors::{ApiError, CrawlError};
    pub use crate::events::{
        ChannelEventSink, CrawlEvent, EventSink, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::graph::{Community, GraphSnapshot, GraphStore, Mention};
    pub use crate::observability::ProgressSnapshot;
    pub use crate::persistence::{Autosaver, SnapshotFile};
    pub use crate::queue::{DiscoveryContext, DiscoveryQueue, DiscoveryTask};
}
