//! The worker pool and its builder.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use super::tracker::{CommunityGate, WorkTracker};
use super::worker::run_worker;
use super::{CrawlReport, RestoreSummary, StopReason};
use crate::cancellation::{CancellationToken, StructuredTaskGroup};
use crate::client::{ApiClient, CommunityApi, RateLimiter};
use crate::config::CrawlerConfig;
use crate::discovery::{RelationshipExtractor, SearchTerms};
use crate::errors::{CrawlError, Result};
use crate::events::{EventSink, NoOpEventSink};
use crate::graph::{GraphSnapshot, GraphStore};
use crate::observability::{ProgressCounters, ProgressSnapshot};
use crate::queue::{DiscoveryContext, DiscoveryQueue};

/// State shared by every worker of one run.
pub(crate) struct Shared {
    pub(crate) config: CrawlerConfig,
    pub(crate) client: ApiClient,
    pub(crate) graph: Arc<GraphStore>,
    pub(crate) queue: Arc<DiscoveryQueue>,
    pub(crate) token: Arc<CancellationToken>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) extractor: RelationshipExtractor,
    pub(crate) counters: ProgressCounters,
    pub(crate) tracker: WorkTracker,
    pub(crate) gate: Option<CommunityGate>,
    stop: Mutex<Option<StopReason>>,
}

impl Shared {
    /// Records why the run is ending and closes the queue. First reason wins.
    pub(crate) fn stop(&self, reason: StopReason) {
        {
            let mut stop = self.stop.lock();
            if stop.is_none() {
                info!(reason = %reason, "Stopping discovery");
                *stop = Some(reason);
            }
        }
        self.queue.close();
    }

    fn stop_reason(&self) -> Option<StopReason> {
        self.stop.lock().clone()
    }

    pub(crate) fn progress(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            communities: self.graph.len(),
            confirmed: self.graph.confirmed_count(),
            mentions: self.graph.mention_count(),
            queue_depth: self.queue.len(),
            in_flight: self.tracker.in_flight(),
            seeds_claimed: self.counters.seeds_claimed(),
            seeds_total: self.tracker.seeds_total(),
            searches: self.counters.searches(),
            descriptions: self.counters.descriptions(),
            api_calls: self.client.calls_made(),
            retries: self.client.retries(),
            errors: self.counters.errors(),
            skipped: self.counters.skipped(),
        }
    }
}

/// Cloneable read-only view of a pool's progress.
#[derive(Clone)]
pub struct ProgressHandle(Arc<Shared>);

impl ProgressHandle {
    /// Current progress.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.0.progress()
    }
}

impl std::fmt::Debug for ProgressHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ProgressHandle").field(&self.0.progress()).finish()
    }
}

/// Builder for [`WorkerPool`].
pub struct WorkerPoolBuilder {
    api: Arc<dyn CommunityApi>,
    config: CrawlerConfig,
    sink: Arc<dyn EventSink>,
    extractor: Option<RelationshipExtractor>,
    limiter: Option<Arc<RateLimiter>>,
    token: Option<Arc<CancellationToken>>,
    graph: Option<Arc<GraphStore>>,
}

impl WorkerPoolBuilder {
    /// Sets the run configuration.
    #[must_use]
    pub fn config(mut self, config: CrawlerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the event sink; events are discarded by default.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replaces the default `r/name` extractor.
    #[must_use]
    pub fn extractor(mut self, extractor: RelationshipExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Uses an existing rate limiter instead of one built from the config.
    #[must_use]
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn cancel_token(mut self, token: Arc<CancellationToken>) -> Self {
        self.token = Some(token);
        self
    }

    /// Records into an existing graph.
    #[must_use]
    pub fn graph(mut self, graph: Arc<GraphStore>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Validates the configuration and assembles the pool.
    pub fn build(self) -> Result<WorkerPool> {
        let config = self.config;
        config.validate()?;

        let limiter = match self.limiter {
            Some(limiter) => limiter,
            None => Arc::new(RateLimiter::new(config.rate_limit.as_ref(), config.max_api_calls)?),
        };
        let token = self.token.unwrap_or_else(|| Arc::new(CancellationToken::new()));
        let extractor = match self.extractor {
            Some(extractor) => extractor,
            None => RelationshipExtractor::new()?,
        };
        let seeds = match &config.seed_terms {
            Some(terms) => SearchTerms::from_terms(terms.iter().cloned()),
            None => SearchTerms::new(config.search_term_length),
        };

        let queue = Arc::new(DiscoveryQueue::new());
        {
            let queue = queue.clone();
            token.on_cancel(move || queue.close());
        }

        let client = ApiClient::new(self.api, limiter, config.backoff.clone(), token.clone())
            .with_search_limit(config.search_limit);

        let shared = Shared {
            gate: config.max_communities.map(CommunityGate::new),
            tracker: WorkTracker::new(queue.clone(), seeds),
            graph: self.graph.unwrap_or_default(),
            queue,
            token,
            sink: self.sink,
            extractor,
            client,
            counters: ProgressCounters::new(),
            stop: Mutex::new(None),
            config,
        };

        Ok(WorkerPool {
            shared: Arc::new(shared),
            run_id: Uuid::new_v4(),
            started: AtomicBool::new(false),
        })
    }
}

/// A fixed set of workers expanding the community graph.
///
/// A pool runs once. The graph, progress and cancellation token stay
/// readable while [`run`](Self::run) is in progress and after it returns.
pub struct WorkerPool {
    shared: Arc<Shared>,
    run_id: Uuid,
    started: AtomicBool,
}

impl WorkerPool {
    /// Starts a builder over an API backend.
    #[must_use]
    pub fn builder(api: Arc<dyn CommunityApi>) -> WorkerPoolBuilder {
        WorkerPoolBuilder {
            api,
            config: CrawlerConfig::default(),
            sink: Arc::new(NoOpEventSink),
            extractor: None,
            limiter: None,
            token: None,
            graph: None,
        }
    }

    /// Creates a pool with default extractor and no event sink.
    pub fn new(config: CrawlerConfig, api: Arc<dyn CommunityApi>) -> Result<Self> {
        Self::builder(api).config(config).build()
    }

    /// Identifier of this run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The graph being built.
    #[must_use]
    pub fn graph(&self) -> Arc<GraphStore> {
        self.shared.graph.clone()
    }

    /// Snapshot of the graph tagged with this run's id.
    #[must_use]
    pub fn snapshot(&self) -> GraphSnapshot {
        self.shared.graph.snapshot().with_run_id(self.run_id.to_string())
    }

    /// Token that aborts the run when cancelled.
    #[must_use]
    pub fn cancel_token(&self) -> Arc<CancellationToken> {
        self.shared.token.clone()
    }

    /// Current progress.
    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        self.shared.progress()
    }

    /// A handle for polling progress from another task.
    #[must_use]
    pub fn progress_handle(&self) -> ProgressHandle {
        ProgressHandle(self.shared.clone())
    }

    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &CrawlerConfig {
        &self.shared.config
    }

    /// Resumes from a saved snapshot. Must be called before [`run`](Self::run).
    ///
    /// Stubs are always queued again. Confirmed communities are queued again
    /// when `rescan_on_rediscovery` is set, and otherwise only marked seen.
    pub fn restore(&self, snapshot: &GraphSnapshot) -> Result<RestoreSummary> {
        if self.started.load(Ordering::SeqCst) {
            return Err(CrawlError::config("restore must happen before the pool runs"));
        }
        let shared = &self.shared;
        shared.graph.restore(snapshot)?;

        let mut summary = RestoreSummary {
            communities: snapshot.len(),
            ..RestoreSummary::default()
        };
        let rescan = shared.config.rescan_on_rediscovery;
        for name in shared.graph.names() {
            let confirmed = shared.graph.get(&name).is_some_and(|c| c.confirmed);
            if confirmed && !rescan {
                shared.queue.mark_seen(&name);
                summary.skipped += 1;
            } else if shared.tracker.enqueue(&name, DiscoveryContext::Restored) {
                summary.requeued += 1;
            }
        }

        info!(
            communities = summary.communities,
            requeued = summary.requeued,
            skipped = summary.skipped,
            "Restored snapshot"
        );
        Ok(summary)
    }

    /// Runs the pool to completion.
    ///
    /// Returns a report on normal termination (work drained, cap reached or
    /// cancelled) and `Err` for a fatal error such as rejected credentials.
    pub async fn run(&self) -> Result<CrawlReport> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(CrawlError::config("a worker pool can only run once"));
        }
        let shared = &self.shared;
        let started = Instant::now();

        if let Some(gate) = &shared.gate {
            gate.preload(shared.graph.confirmed_count());
            if gate.is_full() {
                shared.stop(StopReason::CommunityCap { limit: gate.cap() });
            }
        }

        info!(
            run_id = %self.run_id,
            workers = shared.config.workers,
            seeds = shared.tracker.seeds_total(),
            "Starting discovery"
        );

        let group = StructuredTaskGroup::with_token(shared.token.clone());
        for id in 0..shared.config.workers {
            let worker_shared = shared.clone();
            let span = tracing::info_span!("worker", id);
            group.spawn(&format!("worker-{id}"), move |_token| {
                run_worker(worker_shared).instrument(span)
            });
        }

        let outcome = group.wait().await;
        let progress = shared.progress();
        let elapsed = started.elapsed();

        if let Err(error) = outcome {
            warn!(run_id = %self.run_id, error = %error, "Discovery aborted");
            return Err(error);
        }

        let stop_reason = shared.stop_reason().unwrap_or_else(|| {
            if shared.token.is_cancelled() {
                StopReason::Cancelled {
                    reason: shared.token.reason().unwrap_or_default(),
                }
            } else {
                StopReason::Exhausted
            }
        });

        info!(
            run_id = %self.run_id,
            stop_reason = %stop_reason,
            communities = progress.communities,
            confirmed = progress.confirmed,
            mentions = progress.mentions,
            api_calls = progress.api_calls,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "Discovery finished"
        );

        Ok(CrawlReport {
            run_id: self.run_id,
            stop_reason,
            progress,
            elapsed,
        })
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("run_id", &self.run_id)
            .field("workers", &self.shared.config.workers)
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
