//! Deduplicating work queue shared by the workers.
//!
//! A name is accepted at most once per run: the seen set is checked and
//! updated in the same critical section as the push, and it never shrinks.
//! [`DiscoveryQueue::dequeue`] returning `None` is the end-of-work signal.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tokio::sync::Notify;

use crate::discovery::canonical_name;

/// Why a name was queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DiscoveryContext {
    /// Returned by a search for this term.
    SearchTerm(String),
    /// Referenced in this community's description.
    MentionedBy(String),
    /// Re-queued from a saved snapshot.
    Restored,
}

impl DiscoveryContext {
    /// The search term, if the task came from a search.
    #[must_use]
    pub fn search_term(&self) -> Option<&str> {
        match self {
            Self::SearchTerm(term) => Some(term),
            _ => None,
        }
    }
}

impl std::fmt::Display for DiscoveryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SearchTerm(term) => write!(f, "search:{term}"),
            Self::MentionedBy(parent) => write!(f, "mention:{parent}"),
            Self::Restored => f.write_str("restored"),
        }
    }
}

/// A unit of describe work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryTask {
    /// Canonical community name.
    pub name: String,
    /// Provenance.
    pub context: DiscoveryContext,
}

#[derive(Debug, Default)]
struct QueueState {
    tasks: VecDeque<DiscoveryTask>,
    seen: HashSet<String>,
    closed: bool,
}

/// FIFO of [`DiscoveryTask`]s with a run-wide dedup set.
#[derive(Debug, Default)]
pub struct DiscoveryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl DiscoveryQueue {
    /// Creates an empty, open queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `name` unless it was seen before.
    ///
    /// Returns false for duplicates, malformed names and a closed queue.
    pub fn enqueue(&self, name: &str, context: DiscoveryContext) -> bool {
        let Ok(name) = canonical_name(name) else {
            return false;
        };
        {
            let mut state = self.state.lock();
            if state.closed || !state.seen.insert(name.clone()) {
                return false;
            }
            state.tasks.push_back(DiscoveryTask { name, context });
        }
        self.notify.notify_one();
        true
    }

    /// Records `name` as handled without queueing it.
    ///
    /// Returns false if it was already seen or is malformed.
    pub fn mark_seen(&self, name: &str) -> bool {
        canonical_name(name).is_ok_and(|name| self.state.lock().seen.insert(name))
    }

    /// Returns true if `name` was ever accepted or marked seen.
    #[must_use]
    pub fn has_seen(&self, name: &str) -> bool {
        canonical_name(name).is_ok_and(|name| self.state.lock().seen.contains(&name))
    }

    /// Waits for the next task; `None` once the queue is closed.
    pub async fn dequeue(&self) -> Option<DiscoveryTask> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return None;
                }
                if let Some(task) = state.tasks.pop_front() {
                    return Some(task);
                }
            }

            notified.await;
        }
    }

    /// Takes the next task without waiting.
    pub fn try_dequeue(&self) -> Option<DiscoveryTask> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        state.tasks.pop_front()
    }

    /// Closes the queue and wakes every waiter. Idempotent.
    ///
    /// Pending tasks are no longer handed out.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
    }

    /// Returns true once closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Returns true if no task is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().tasks.is_empty()
    }

    /// Number of distinct names ever accepted or marked seen.
    #[must_use]
    pub fn seen_count(&self) -> usize {
        self.state.lock().seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn search(term: &str) -> DiscoveryContext {
        DiscoveryContext::SearchTerm(term.to_string())
    }

    #[test]
    fn test_enqueue_dedups_across_spellings() {
        let queue = DiscoveryQueue::new();
        assert!(queue.enqueue("Cats", search("c")));
        assert!(!queue.enqueue("r/cats", search("ca")));
        assert!(!queue.enqueue("cats", DiscoveryContext::MentionedBy("dogs".into())));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.seen_count(), 1);

        let task = queue.try_dequeue().unwrap();
        assert_eq!(task.name, "cats");
        assert_eq!(task.context.search_term(), Some("c"));

        // Dequeued names stay seen.
        assert!(!queue.enqueue("cats", DiscoveryContext::Restored));
    }

    #[test]
    fn test_malformed_and_marked_names_are_refused() {
        let queue = DiscoveryQueue::new();
        assert!(!queue.enqueue("", DiscoveryContext::Restored));
        assert!(!queue.enqueue("not valid", DiscoveryContext::Restored));
        assert!(queue.mark_seen("dogs"));
        assert!(!queue.mark_seen("Dogs"));
        assert!(queue.has_seen("dogs"));
        assert!(!queue.enqueue("dogs", DiscoveryContext::Restored));
        assert!(queue.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_enqueue_of_one_name_succeeds_once() {
        let queue = Arc::new(DiscoveryQueue::new());
        let accepted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let queue = queue.clone();
                let accepted = accepted.clone();
                tokio::spawn(async move {
                    if queue.enqueue("popular", DiscoveryContext::MentionedBy(format!("p{i}"))) {
                        accepted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(accepted.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(), 1);
        assert!(queue.try_dequeue().is_some());
        assert!(queue.try_dequeue().is_none());
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_enqueue() {
        let queue = Arc::new(DiscoveryQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.enqueue("birds", search("b"));

        let task = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.map(|t| t.name).as_deref(), Some("birds"));
    }

    #[tokio::test]
    async fn test_close_wakes_all_waiters() {
        let queue = Arc::new(DiscoveryQueue::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.dequeue().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();
        queue.close();

        for waiter in waiters {
            let result = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
            assert!(result.is_none());
        }
        assert!(queue.is_closed());
        assert!(!queue.enqueue("late", DiscoveryContext::Restored));
    }

    #[test]
    fn test_closed_queue_hands_out_nothing() {
        let queue = DiscoveryQueue::new();
        queue.enqueue("cats", search("c"));
        queue.close();
        assert!(queue.try_dequeue().is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_context_display() {
        assert_eq!(search("ca").to_string(), "search:ca");
        assert_eq!(DiscoveryContext::MentionedBy("cats".into()).to_string(), "mention:cats");
        assert_eq!(DiscoveryContext::Restored.to_string(), "restored");
    }
}
