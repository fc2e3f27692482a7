//! Event sink trait and implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, Level};

use super::CrawlEvent;

/// Receives [`CrawlEvent`]s from the workers.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event, possibly waiting for capacity.
    async fn emit(&self, event: CrawlEvent);

    /// Emits an event without blocking.
    ///
    /// Must never panic; an event that cannot be delivered is dropped.
    fn try_emit(&self, event: CrawlEvent);
}

/// A sink that discards every event.
///
/// Used when no consumer is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: CrawlEvent) {}

    fn try_emit(&self, _event: CrawlEvent) {}
}

/// A sink that logs events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &CrawlEvent) {
        match (self.level, event) {
            (Level::DEBUG | Level::TRACE, CrawlEvent::CommunityDiscovered { name, nsfw }) => {
                debug!(event_type = event.event_type(), community = %name, nsfw, "Community discovered");
            }
            (Level::DEBUG | Level::TRACE, CrawlEvent::MentionDiscovered { source, target }) => {
                debug!(event_type = event.event_type(), source = %source, target = %target, "Mention discovered");
            }
            (_, CrawlEvent::CommunityDiscovered { name, nsfw }) => {
                info!(event_type = event.event_type(), community = %name, nsfw, "Community discovered");
            }
            (_, CrawlEvent::MentionDiscovered { source, target }) => {
                info!(event_type = event.event_type(), source = %source, target = %target, "Mention discovered");
            }
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: CrawlEvent) {
        self.log_event(&event);
    }

    fn try_emit(&self, event: CrawlEvent) {
        self.log_event(&event);
    }
}

/// A sink that keeps every event in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<CrawlEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events, in arrival order.
    #[must_use]
    pub fn events(&self) -> Vec<CrawlEvent> {
        self.events.read().clone()
    }

    /// Number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Names from `CommunityDiscovered` events, in arrival order.
    #[must_use]
    pub fn communities(&self) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter_map(|e| match e {
                CrawlEvent::CommunityDiscovered { name, .. } => Some(name.clone()),
                CrawlEvent::MentionDiscovered { .. } => None,
            })
            .collect()
    }

    /// `(source, target)` pairs from `MentionDiscovered` events.
    #[must_use]
    pub fn mentions(&self) -> Vec<(String, String)> {
        self.events
            .read()
            .iter()
            .filter_map(|e| match e {
                CrawlEvent::MentionDiscovered { source, target } => Some((source.clone(), target.clone())),
                CrawlEvent::CommunityDiscovered { .. } => None,
            })
            .collect()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: CrawlEvent) {
        self.events.write().push(event);
    }

    fn try_emit(&self, event: CrawlEvent) {
        self.events.write().push(event);
    }
}
