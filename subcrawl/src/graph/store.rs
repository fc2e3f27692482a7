//! Thread-safe community graph.

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::trace;

use super::model::{Community, CommunitySnapshot, GraphSnapshot, SnapshotMetadata};
use crate::discovery::canonical_name;
use crate::errors::Result;

#[derive(Debug)]
struct CommunityRecord {
    name: String,
    nsfw: bool,
    search_terms: Vec<String>,
    discovered_at: chrono::DateTime<Utc>,
    confirmed: bool,
    mentions: BTreeSet<usize>,
}

impl CommunityRecord {
    fn stub(name: String) -> Self {
        Self {
            name,
            nsfw: false,
            search_terms: Vec::new(),
            discovered_at: Utc::now(),
            confirmed: false,
            mentions: BTreeSet::new(),
        }
    }

    fn add_term(&mut self, term: &str) {
        if !self.search_terms.iter().any(|t| t == term) {
            self.search_terms.push(term.to_string());
        }
    }
}

#[derive(Debug, Default)]
struct Arena {
    index: HashMap<String, usize>,
    records: Vec<CommunityRecord>,
    mentions: usize,
    confirmed: usize,
}

impl Arena {
    /// Returns the slot for `name`, creating a stub if needed.
    fn slot(&mut self, name: &str) -> (usize, bool) {
        if let Some(&idx) = self.index.get(name) {
            return (idx, false);
        }
        let idx = self.records.len();
        self.records.push(CommunityRecord::stub(name.to_string()));
        self.index.insert(name.to_string(), idx);
        (idx, true)
    }

    fn link(&mut self, source: usize, target: usize) -> bool {
        let added = self.records[source].mentions.insert(target);
        if added {
            self.mentions += 1;
        }
        added
    }

    fn view(&self, idx: usize) -> Community {
        let record = &self.records[idx];
        let mut mentions: Vec<String> = record
            .mentions
            .iter()
            .map(|&t| self.records[t].name.clone())
            .collect();
        mentions.sort();
        Community {
            name: record.name.clone(),
            nsfw: record.nsfw,
            search_terms: record.search_terms.clone(),
            discovered_at: record.discovered_at,
            confirmed: record.confirmed,
            mentions,
        }
    }
}

/// Shared store of communities and mention edges.
///
/// Records live in an arena indexed by canonical name; edges refer to arena
/// slots, and slots are never removed, so every edge's endpoints always
/// exist. All mutation happens under a single write lock.
#[derive(Debug, Default)]
pub struct GraphStore {
    inner: RwLock<Arena>,
}

impl GraphStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a community, merging with any existing entry.
    ///
    /// Returns `Ok(true)` for exactly one caller per name: the one that
    /// created the entry. Later calls OR-merge `nsfw` and append
    /// `search_term` if not already present.
    pub fn upsert_community(&self, name: &str, nsfw: bool, search_term: Option<&str>) -> Result<bool> {
        let name = canonical_name(name)?;
        let mut arena = self.inner.write();
        let (idx, created) = arena.slot(&name);
        let record = &mut arena.records[idx];
        record.nsfw |= nsfw;
        if let Some(term) = search_term {
            record.add_term(term);
        }
        if created {
            trace!(community = %name, "Community recorded");
        }
        Ok(created)
    }

    /// Records that `source` mentions `target`.
    ///
    /// Missing endpoints are created as stubs in the same critical section.
    /// Returns whether the edge is new; a self-mention is ignored.
    pub fn add_mention(&self, source: &str, target: &str) -> Result<bool> {
        let source = canonical_name(source)?;
        let target = canonical_name(target)?;
        if source == target {
            return Ok(false);
        }
        let mut arena = self.inner.write();
        let (src, _) = arena.slot(&source);
        let (dst, _) = arena.slot(&target);
        Ok(arena.link(src, dst))
    }

    /// Marks a community as confirmed.
    ///
    /// Returns true on the first transition, false if it was already
    /// confirmed or is unknown.
    pub fn confirm(&self, name: &str) -> Result<bool> {
        let name = canonical_name(name)?;
        let mut arena = self.inner.write();
        let Some(&idx) = arena.index.get(&name) else {
            return Ok(false);
        };
        if arena.records[idx].confirmed {
            return Ok(false);
        }
        arena.records[idx].confirmed = true;
        arena.confirmed += 1;
        Ok(true)
    }

    /// Number of communities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Returns true if no community has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// Number of confirmed communities.
    #[must_use]
    pub fn confirmed_count(&self) -> usize {
        self.inner.read().confirmed
    }

    /// Number of mention edges.
    #[must_use]
    pub fn mention_count(&self) -> usize {
        self.inner.read().mentions
    }

    /// Returns true if `name` is recorded. Malformed names are never recorded.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        canonical_name(name).is_ok_and(|name| self.inner.read().index.contains_key(&name))
    }

    /// Returns a copy of one community.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Community> {
        let name = canonical_name(name).ok()?;
        let arena = self.inner.read();
        arena.index.get(&name).map(|&idx| arena.view(idx))
    }

    /// All community names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().index.keys().cloned().collect();
        names.sort();
        names
    }

    /// Takes a point-in-time copy of the graph.
    #[must_use]
    pub fn snapshot(&self) -> GraphSnapshot {
        let arena = self.inner.read();
        let communities: BTreeMap<String, CommunitySnapshot> = (0..arena.records.len())
            .map(|idx| {
                let view = arena.view(idx);
                (
                    view.name,
                    CommunitySnapshot {
                        nsfw: view.nsfw,
                        search_terms: view.search_terms,
                        mentions: view.mentions,
                        discovered_at: view.discovered_at,
                        confirmed: view.confirmed,
                    },
                )
            })
            .collect();
        GraphSnapshot {
            communities,
            metadata: SnapshotMetadata::default(),
        }
    }

    /// Merges a saved snapshot into the store.
    ///
    /// Every name is validated before anything is written, so a malformed
    /// snapshot leaves the store untouched. Mention targets without their own
    /// entry become stubs. Existing entries are merged the same way
    /// [`upsert_community`](Self::upsert_community) merges them; the earlier
    /// discovery time wins.
    pub fn restore(&self, snapshot: &GraphSnapshot) -> Result<()> {
        let mut entries = Vec::with_capacity(snapshot.communities.len());
        for (name, entry) in &snapshot.communities {
            let mentions = entry
                .mentions
                .iter()
                .map(String::as_str)
                .map(canonical_name)
                .collect::<Result<Vec<_>>>()?;
            entries.push((canonical_name(name)?, entry, mentions));
        }

        let mut arena = self.inner.write();
        for (name, entry, _) in &entries {
            let (idx, _) = arena.slot(name);
            let newly_confirmed = {
                let record = &mut arena.records[idx];
                record.nsfw |= entry.nsfw;
                for term in &entry.search_terms {
                    record.add_term(term);
                }
                record.discovered_at = record.discovered_at.min(entry.discovered_at);
                let newly_confirmed = entry.confirmed && !record.confirmed;
                record.confirmed |= entry.confirmed;
                newly_confirmed
            };
            if newly_confirmed {
                arena.confirmed += 1;
            }
        }
        for (name, _, mentions) in &entries {
            let (src, _) = arena.slot(name);
            for target in mentions {
                if target != name {
                    let (dst, _) = arena.slot(target);
                    arena.link(src, dst);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CrawlError;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_upsert_merges_on_rediscovery() {
        let graph = GraphStore::new();
        assert!(graph.upsert_community("Cats", false, Some("c")).unwrap());
        assert!(!graph.upsert_community("r/cats", true, Some("ca")).unwrap());
        assert!(!graph.upsert_community("cats", false, Some("c")).unwrap());

        let cats = graph.get("cats").unwrap();
        assert!(cats.nsfw);
        assert_eq!(cats.search_terms, vec!["c".to_string(), "ca".to_string()]);
        assert!(!cats.confirmed);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_malformed_names_are_rejected() {
        let graph = GraphStore::new();
        assert!(matches!(
            graph.upsert_community("", false, None),
            Err(CrawlError::MalformedName { .. })
        ));
        assert!(graph.add_mention("cats", "no way").is_err());
        assert!(graph.is_empty());
        assert!(!graph.contains("no way"));
    }

    #[test]
    fn test_add_mention_is_idempotent() {
        let graph = GraphStore::new();
        graph.upsert_community("a", false, None).unwrap();
        graph.upsert_community("b", false, None).unwrap();

        assert!(graph.add_mention("a", "b").unwrap());
        assert!(!graph.add_mention("a", "b").unwrap());
        assert!(!graph.add_mention("A", "r/B").unwrap());

        assert_eq!(graph.mention_count(), 1);
        assert_eq!(graph.snapshot().mention_count(), 1);
    }

    #[test]
    fn test_add_mention_creates_missing_endpoints() {
        let graph = GraphStore::new();
        assert!(graph.add_mention("cats", "dogs").unwrap());
        assert!(graph.contains("cats"));
        assert!(graph.contains("dogs"));
        assert!(graph.snapshot().dangling_mentions().is_empty());
    }

    #[test]
    fn test_self_mention_is_ignored() {
        let graph = GraphStore::new();
        assert!(!graph.add_mention("cats", "Cats").unwrap());
        assert_eq!(graph.mention_count(), 0);
    }

    #[test]
    fn test_confirm_transitions_once() {
        let graph = GraphStore::new();
        assert!(!graph.confirm("ghost").unwrap());
        graph.upsert_community("cats", false, None).unwrap();
        assert!(graph.confirm("cats").unwrap());
        assert!(!graph.confirm("cats").unwrap());
        assert_eq!(graph.confirmed_count(), 1);
    }

    #[test]
    fn test_concurrent_upserts_have_one_winner() {
        let graph = Arc::new(GraphStore::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let graph = graph.clone();
                let winners = winners.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        if graph.upsert_community(&format!("c{i}"), false, None).unwrap() {
                            winners.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 50);
        assert_eq!(graph.len(), 50);
    }

    #[test]
    fn test_concurrent_mentions_are_idempotent() {
        let graph = Arc::new(GraphStore::new());
        let new_edges = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let graph = graph.clone();
                let new_edges = new_edges.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let target = format!("c{}", (i + 1) % 50);
                        if graph.add_mention(&format!("c{i}"), &target).unwrap() {
                            new_edges.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(new_edges.load(Ordering::SeqCst), 50);
        assert_eq!(graph.len(), 50);
        assert_eq!(graph.mention_count(), 50);
        assert!(graph.snapshot().dangling_mentions().is_empty());
    }

    #[test]
    fn test_snapshot_restore_preserves_graph() {
        let graph = GraphStore::new();
        graph.upsert_community("cats", true, Some("c")).unwrap();
        graph.confirm("cats").unwrap();
        graph.add_mention("cats", "dogs").unwrap();
        graph.add_mention("cats", "birds").unwrap();
        let snapshot = graph.snapshot();

        let restored = GraphStore::new();
        restored.restore(&snapshot).unwrap();
        let again = restored.snapshot();

        assert_eq!(again.communities, snapshot.communities);
        assert_eq!(restored.confirmed_count(), 1);
        assert_eq!(restored.mention_count(), 2);
    }

    #[test]
    fn test_restore_creates_stubs_for_dangling_targets() {
        let json = r#"{"communities": {"Cats": {"nsfw": false, "search_terms": [], "mentions": ["Dogs"], "confirmed": true}}}"#;
        let snapshot: GraphSnapshot = serde_json::from_str(json).unwrap();

        let graph = GraphStore::new();
        graph.restore(&snapshot).unwrap();

        assert!(graph.contains("dogs"));
        assert!(!graph.get("dogs").unwrap().confirmed);
        assert_eq!(graph.get("cats").unwrap().mentions, vec!["dogs".to_string()]);
    }

    #[test]
    fn test_restore_rejects_malformed_without_partial_writes() {
        let json = r#"{"communities": {"cats": {"mentions": []}, "bad name": {"mentions": []}}}"#;
        let snapshot: GraphSnapshot = serde_json::from_str(json).unwrap();

        let graph = GraphStore::new();
        assert!(graph.restore(&snapshot).is_err());
        assert!(graph.is_empty());
    }
}
