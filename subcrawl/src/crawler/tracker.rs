//! In-flight accounting and the confirmed-community cap.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::discovery::SearchTerms;
use crate::queue::{DiscoveryContext, DiscoveryQueue};

/// Tracks accepted-but-unfinished work and closes the queue when none is left.
///
/// Every queued task and every claimed seed counts as one unit until its
/// worker calls [`finish`](Self::finish). The queue is closed once the count
/// is zero and the seed feed is exhausted; both sides check the other so the
/// last one to arrive performs the close.
pub(crate) struct WorkTracker {
    queue: Arc<DiscoveryQueue>,
    seeds: Mutex<SearchTerms>,
    seeds_total: usize,
    seeds_exhausted: AtomicBool,
    in_flight: AtomicUsize,
}

impl WorkTracker {
    pub(crate) fn new(queue: Arc<DiscoveryQueue>, seeds: SearchTerms) -> Self {
        Self {
            queue,
            seeds_total: seeds.total(),
            seeds: Mutex::new(seeds),
            seeds_exhausted: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Claims the next seed term, counting it as in flight.
    pub(crate) fn claim_seed(&self) -> Option<String> {
        let term = {
            let mut seeds = self.seeds.lock();
            let term = seeds.next();
            if term.is_some() {
                // Counted under the feed lock so exhaustion can't be observed
                // between the claim and the increment.
                self.in_flight.fetch_add(1, Ordering::SeqCst);
            }
            term
        };
        if term.is_none() {
            self.exhaust_seeds();
        }
        term
    }

    fn exhaust_seeds(&self) {
        if !self.seeds_exhausted.swap(true, Ordering::SeqCst) {
            debug!("Seed terms exhausted");
        }
        if self.in_flight.load(Ordering::SeqCst) == 0 {
            self.close_drained();
        }
    }

    /// Enqueues `name`, counting it as in flight if accepted.
    pub(crate) fn enqueue(&self, name: &str, context: DiscoveryContext) -> bool {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let accepted = self.queue.enqueue(name, context);
        if !accepted {
            // The caller's own unit is still outstanding, so this never hits zero.
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        accepted
    }

    /// Marks one unit of work as done.
    pub(crate) fn finish(&self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 && self.seeds_exhausted.load(Ordering::SeqCst) {
            self.close_drained();
        }
    }

    fn close_drained(&self) {
        if !self.queue.is_closed() {
            debug!("No work left, closing queue");
            self.queue.close();
        }
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn seeds_total(&self) -> usize {
        self.seeds_total
    }
}

/// Reservation counter keeping confirmed communities at or under a cap.
///
/// A describe task reserves a slot before calling upstream and releases it
/// if it does not end up confirming a new community.
pub(crate) struct CommunityGate {
    cap: usize,
    reserved: AtomicUsize,
}

impl CommunityGate {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            cap,
            reserved: AtomicUsize::new(0),
        }
    }

    /// Accounts for communities confirmed before the run started.
    pub(crate) fn preload(&self, confirmed: usize) {
        self.reserved.store(confirmed, Ordering::SeqCst);
    }

    pub(crate) fn try_reserve(&self) -> bool {
        self.reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < self.cap).then_some(n + 1))
            .is_ok()
    }

    pub(crate) fn release(&self) {
        // Saturating: never underflow on a stray release.
        let _ = self
            .reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub(crate) fn is_full(&self) -> bool {
        self.reserved.load(Ordering::SeqCst) >= self.cap
    }

    pub(crate) fn cap(&self) -> usize {
        self.cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(seeds: &[&str]) -> (Arc<DiscoveryQueue>, WorkTracker) {
        let queue = Arc::new(DiscoveryQueue::new());
        let tracker = WorkTracker::new(queue.clone(), SearchTerms::from_terms(seeds.iter().copied()));
        (queue, tracker)
    }

    #[test]
    fn test_closes_when_seeds_and_work_are_done() {
        let (queue, tracker) = tracker(&["a"]);
        assert_eq!(tracker.seeds_total(), 1);

        let seed = tracker.claim_seed();
        assert_eq!(seed.as_deref(), Some("a"));
        assert!(tracker.enqueue("cats", DiscoveryContext::SearchTerm("a".into())));
        assert_eq!(tracker.in_flight(), 2);

        // Feed runs dry while work is outstanding.
        assert!(tracker.claim_seed().is_none());
        assert!(!queue.is_closed());

        tracker.finish();
        assert!(!queue.is_closed());
        let task = queue.try_dequeue().unwrap();
        assert_eq!(task.name, "cats");
        tracker.finish();
        assert!(queue.is_closed());
    }

    #[test]
    fn test_rejected_enqueue_is_not_counted() {
        let (_queue, tracker) = tracker(&["a"]);
        tracker.claim_seed();
        assert!(tracker.enqueue("cats", DiscoveryContext::Restored));
        assert!(!tracker.enqueue("cats", DiscoveryContext::Restored));
        assert!(!tracker.enqueue("bad name", DiscoveryContext::Restored));
        assert_eq!(tracker.in_flight(), 2);
    }

    #[test]
    fn test_no_seeds_and_no_work_closes_immediately() {
        let (queue, tracker) = tracker(&[]);
        assert!(tracker.claim_seed().is_none());
        assert!(queue.is_closed());
    }

    #[test]
    fn test_gate_reserves_up_to_cap() {
        let gate = CommunityGate::new(2);
        assert!(gate.try_reserve());
        assert!(gate.try_reserve());
        assert!(!gate.try_reserve());
        assert!(gate.is_full());

        gate.release();
        assert!(!gate.is_full());
        assert!(gate.try_reserve());

        gate.preload(0);
        gate.release();
        assert!(!gate.is_full());
        assert_eq!(gate.cap(), 2);
    }
}
