//! Discovery events for live consumers.
//!
//! Workers publish a [`CrawlEvent`] whenever the graph gains a community or
//! an edge. Publishing goes through [`EventSink::try_emit`], which never
//! blocks a worker; with no consumer configured, events are simply dropped.

mod channel;
mod sink;

pub use channel::{ChannelEventSink, ChannelMetrics};
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde::{Deserialize, Serialize};

/// A change to the community graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrawlEvent {
    /// A community entered the graph.
    CommunityDiscovered {
        /// Canonical name.
        name: String,
        /// NSFW flag at discovery time.
        nsfw: bool,
    },
    /// A new mention edge was recorded.
    MentionDiscovered {
        /// Mentioning community.
        source: String,
        /// Mentioned community.
        target: String,
    },
}

impl CrawlEvent {
    /// Creates a `CommunityDiscovered` event.
    #[must_use]
    pub fn community(name: impl Into<String>, nsfw: bool) -> Self {
        Self::CommunityDiscovered {
            name: name.into(),
            nsfw,
        }
    }

    /// Creates a `MentionDiscovered` event.
    #[must_use]
    pub fn mention(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::MentionDiscovered {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Dotted event type, e.g. `community.discovered`.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::CommunityDiscovered { .. } => "community.discovered",
            Self::MentionDiscovered { .. } => "mention.discovered",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = CrawlEvent::community("cats", true);
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({"type": "community_discovered", "name": "cats", "nsfw": true})
        );

        let event = CrawlEvent::mention("cats", "dogs");
        assert_eq!(event.event_type(), "mention.discovered");
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(serde_json::from_str::<CrawlEvent>(&json).unwrap(), event);
    }
}
