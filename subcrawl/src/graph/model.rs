//! Graph records and the serializable snapshot format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Read-only view of one community.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    /// Canonical name.
    pub name: String,
    /// NSFW flag, OR-merged across discoveries.
    pub nsfw: bool,
    /// Search terms that led here, in first-seen order.
    pub search_terms: Vec<String>,
    /// When the community was first recorded.
    pub discovered_at: DateTime<Utc>,
    /// Whether its own description has been mined.
    pub confirmed: bool,
    /// Communities this one mentions, sorted.
    pub mentions: Vec<String>,
}

/// A directed mention edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mention {
    /// The community whose description holds the reference.
    pub source: String,
    /// The referenced community.
    pub target: String,
}

impl Mention {
    /// Creates a mention.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Per-community entry of a [`GraphSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunitySnapshot {
    /// NSFW flag.
    #[serde(default)]
    pub nsfw: bool,
    /// Provenance search terms.
    #[serde(default)]
    pub search_terms: Vec<String>,
    /// Outgoing mentions.
    #[serde(default)]
    pub mentions: Vec<String>,
    /// First discovery time.
    #[serde(default = "Utc::now")]
    pub discovered_at: DateTime<Utc>,
    /// Whether the description was mined.
    #[serde(default)]
    pub confirmed: bool,
}

/// Snapshot bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// When the snapshot was taken.
    pub last_update: DateTime<Utc>,
    /// Run that produced it, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl Default for SnapshotMetadata {
    fn default() -> Self {
        Self {
            last_update: Utc::now(),
            run_id: None,
        }
    }
}

/// Point-in-time copy of the whole graph.
///
/// Serializes as
/// `{"communities": {name: {nsfw, search_terms, mentions, discovered_at, confirmed}}, "metadata": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Communities keyed by canonical name.
    #[serde(default)]
    pub communities: BTreeMap<String, CommunitySnapshot>,
    /// Bookkeeping.
    #[serde(default)]
    pub metadata: SnapshotMetadata,
}

impl GraphSnapshot {
    /// Tags the snapshot with a run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.metadata.run_id = Some(run_id.into());
        self
    }

    /// Number of communities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.communities.len()
    }

    /// Returns true if the snapshot holds no communities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.communities.is_empty()
    }

    /// Number of confirmed communities.
    #[must_use]
    pub fn confirmed_count(&self) -> usize {
        self.communities.values().filter(|c| c.confirmed).count()
    }

    /// Total number of mention edges.
    #[must_use]
    pub fn mention_count(&self) -> usize {
        self.communities.values().map(|c| c.mentions.len()).sum()
    }

    /// Every mention edge, ordered by source then target.
    pub fn mentions(&self) -> impl Iterator<Item = Mention> + '_ {
        self.communities.iter().flat_map(|(source, entry)| {
            entry
                .mentions
                .iter()
                .map(move |target| Mention::new(source.clone(), target.clone()))
        })
    }

    /// Mentions whose target has no community entry.
    #[must_use]
    pub fn dangling_mentions(&self) -> Vec<Mention> {
        self.mentions()
            .filter(|m| !self.communities.contains_key(&m.target))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_record() {
        let json = r#"{"communities": {"cats": {"nsfw": false, "search_terms": ["c"], "mentions": ["dogs"]}}}"#;
        let snapshot: GraphSnapshot = serde_json::from_str(json).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.mention_count(), 1);
        assert_eq!(snapshot.confirmed_count(), 0);
        assert_eq!(snapshot.dangling_mentions(), vec![Mention::new("cats", "dogs")]);
    }

    #[test]
    fn test_run_id_is_serialized_when_set() {
        let snapshot = GraphSnapshot::default().with_run_id("run-1");
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["metadata"]["run_id"], "run-1");
        assert!(value["communities"].as_object().unwrap().is_empty());

        let bare = serde_json::to_value(GraphSnapshot::default()).unwrap();
        assert!(bare["metadata"].get("run_id").is_none());
    }
}
