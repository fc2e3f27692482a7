//! The per-worker discovery loop.

use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::pool::Shared;
use super::StopReason;
use crate::client::SearchHit;
use crate::discovery::canonical_name;
use crate::errors::{ApiError, CrawlError, Result};
use crate::events::CrawlEvent;
use crate::queue::{DiscoveryContext, DiscoveryTask};

/// One unit of work.
#[derive(Debug)]
enum WorkItem {
    Search(String),
    Describe(DiscoveryTask),
}

impl WorkItem {
    fn name(&self) -> &str {
        match self {
            Self::Search(term) => term,
            Self::Describe(task) => &task.name,
        }
    }

    fn term(&self) -> Option<&str> {
        match self {
            Self::Search(term) => Some(term),
            Self::Describe(task) => task.context.search_term(),
        }
    }
}

/// Runs until the queue closes or the run is cancelled.
///
/// Only fatal errors are returned; everything else is logged, counted and
/// the worker moves on.
pub(crate) async fn run_worker(shared: Arc<Shared>) -> Result<()> {
    trace!("Worker started");
    while let Some(item) = next_item(&shared).await {
        let outcome = match &item {
            WorkItem::Search(term) => search(&shared, term).await,
            WorkItem::Describe(task) => describe(&shared, task).await,
        };
        shared.tracker.finish();

        if let Err(error) = outcome {
            if error.is_fatal() {
                return Err(error);
            }
            handle_task_error(&shared, &item, &error);
        }
    }
    trace!("Worker exiting");
    Ok(())
}

/// Picks the next item: queued work when the queue is deep, otherwise a
/// seed term, otherwise whatever the queue yields next.
async fn next_item(shared: &Shared) -> Option<WorkItem> {
    if shared.token.is_cancelled() {
        return None;
    }
    let queue = &shared.queue;
    if queue.len() >= shared.config.queue_high_watermark {
        if let Some(task) = queue.try_dequeue() {
            return Some(WorkItem::Describe(task));
        }
    }
    if !queue.is_closed() {
        if let Some(term) = shared.tracker.claim_seed() {
            shared.counters.record_seed();
            return Some(WorkItem::Search(term));
        }
    }
    queue.dequeue().await.map(WorkItem::Describe)
}

async fn search(shared: &Shared, term: &str) -> Result<()> {
    let hits = shared.client.search(term).await?;
    shared.counters.record_search();
    debug!(term = %term, hits = hits.len(), "Search completed");

    for SearchHit { name, nsfw } in hits {
        let Ok(name) = canonical_name(&name) else {
            debug!(term = %term, name = %name, "Skipping malformed search hit");
            shared.counters.record_skip();
            continue;
        };
        if shared.graph.upsert_community(&name, nsfw, Some(term))? {
            shared.sink.try_emit(CrawlEvent::community(name.as_str(), nsfw));
        }
        shared
            .tracker
            .enqueue(&name, DiscoveryContext::SearchTerm(term.to_string()));
    }
    Ok(())
}

async fn describe(shared: &Shared, task: &DiscoveryTask) -> Result<()> {
    if let Some(gate) = &shared.gate {
        if !gate.try_reserve() {
            shared.stop(StopReason::CommunityCap { limit: gate.cap() });
            return Ok(());
        }
    }
    let release = || {
        if let Some(gate) = &shared.gate {
            gate.release();
        }
    };

    let profile = match shared.client.describe(&task.name).await {
        Ok(profile) => profile,
        Err(error) => {
            release();
            return Err(error.into());
        }
    };
    if !profile.public {
        release();
        debug!(community = %task.name, "Skipping non-public community");
        shared.counters.record_skip();
        return Ok(());
    }

    let graph = &shared.graph;
    let name = task.name.as_str();
    if graph.upsert_community(name, profile.nsfw, task.context.search_term())? {
        shared.sink.try_emit(CrawlEvent::community(name, profile.nsfw));
    }
    if !graph.confirm(name)? {
        // Already confirmed (a rescan): no new slot was used.
        release();
    }
    shared.counters.record_description();

    let references = shared.extractor.extract(name, &profile.description);
    trace!(community = %name, references = references.len(), "Description mined");
    for target in references {
        let is_new = graph.upsert_community(&target, false, None)?;
        if is_new {
            shared.sink.try_emit(CrawlEvent::community(target.as_str(), false));
        }
        if graph.add_mention(name, &target)? {
            shared.sink.try_emit(CrawlEvent::mention(name, target.as_str()));
        }
        if is_new {
            shared
                .tracker
                .enqueue(&target, DiscoveryContext::MentionedBy(name.to_string()));
        }
    }

    if let Some(gate) = &shared.gate {
        if gate.is_full() && graph.confirmed_count() >= gate.cap() {
            shared.stop(StopReason::CommunityCap { limit: gate.cap() });
        }
    }
    Ok(())
}

fn handle_task_error(shared: &Shared, item: &WorkItem, error: &CrawlError) {
    let name = item.name();
    let term = item.term().unwrap_or("-");
    match error {
        CrawlError::Api(ApiError::NotFound { .. }) => {
            debug!(name = %name, term = %term, "Community not found, skipping");
            shared.counters.record_skip();
        }
        CrawlError::MalformedName { .. } => {
            debug!(name = %name, term = %term, error = %error, "Malformed name, skipping");
            shared.counters.record_skip();
        }
        CrawlError::Api(ApiError::CallBudgetExhausted { limit }) => {
            shared.stop(StopReason::CallBudget { limit: *limit });
        }
        CrawlError::Api(ApiError::Cancelled) => {
            trace!(name = %name, "Task interrupted by cancellation");
        }
        CrawlError::Api(ApiError::RetriesExhausted { attempts, last }) => {
            warn!(
                name = %name,
                term = %term,
                attempts = *attempts,
                error = %last,
                "Dropping task after retries"
            );
            shared.counters.record_error();
        }
        other => {
            warn!(name = %name, term = %term, attempts = 1, error = %other, "Dropping task");
            shared.counters.record_error();
        }
    }
}
