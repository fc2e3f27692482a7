//! Bounded channel sink for out-of-process consumers.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use super::{CrawlEvent, EventSink};

/// Delivery counters for a [`ChannelEventSink`].
#[derive(Debug, Default)]
pub struct ChannelMetrics {
    emitted: AtomicU64,
    dropped: AtomicU64,
}

impl ChannelMetrics {
    fn record_emit(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the new drop total.
    fn record_drop(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Events handed to the channel.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Events dropped because the channel was full or closed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Drop rate as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn drop_rate(&self) -> f64 {
        let emitted = self.emitted();
        let dropped = self.dropped();
        let total = emitted + dropped;
        if total == 0 {
            0.0
        } else {
            (dropped as f64 / total as f64) * 100.0
        }
    }

    /// Counters as JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "emitted": self.emitted(),
            "dropped": self.dropped(),
            "drop_rate_percent": (self.drop_rate() * 100.0).round() / 100.0
        })
    }
}

/// Forwards events into a bounded `tokio::mpsc` channel.
///
/// `try_emit` drops the event when the channel is full, so a slow consumer
/// can never stall discovery. The first drop, then every hundredth, is
/// logged.
#[derive(Debug)]
pub struct ChannelEventSink {
    tx: mpsc::Sender<CrawlEvent>,
    metrics: Arc<ChannelMetrics>,
}

impl ChannelEventSink {
    /// Creates the sink and the receiving end of its channel.
    ///
    /// A zero `capacity` is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<CrawlEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                metrics: Arc::new(ChannelMetrics::default()),
            },
            rx,
        )
    }

    /// Delivery counters, shareable after the sink is handed to a pool.
    #[must_use]
    pub fn metrics(&self) -> Arc<ChannelMetrics> {
        self.metrics.clone()
    }

    /// Events currently buffered.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: CrawlEvent) {
        if self.tx.send(event).await.is_ok() {
            self.metrics.record_emit();
        } else {
            self.metrics.record_drop();
        }
    }

    fn try_emit(&self, event: CrawlEvent) {
        match self.tx.try_send(event) {
            Ok(()) => self.metrics.record_emit(),
            Err(err) => {
                let dropped_total = self.metrics.record_drop();
                if dropped_total == 1 || dropped_total % 100 == 0 {
                    let reason = match err {
                        mpsc::error::TrySendError::Full(_) => "full",
                        mpsc::error::TrySendError::Closed(_) => "closed",
                    };
                    warn!(reason, dropped_total, "Event dropped");
                }
            }
        }
    }
}
