use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// A single piece of pending work: `(priority, rand, key)`.
///
/// Ordering is `(priority, rand, key)` ascending — lower priority, then
/// lower `rand`, then lexicographically smaller key, is dequeued first.
/// `rand` starts uniform in `[0, 1)` and is nudged up by 0.5 on every
/// requeue-after-failure, so that repeatedly failing items drift toward
/// the tail of their priority band instead of being retried immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub priority: u32,
    pub rand: f64,
    pub key: String,
}

impl WorkItem {
    pub fn new(priority: u32, rand: f64, key: impl Into<String>) -> Self {
        Self {
            priority,
            rand,
            key: key.into(),
        }
    }

    /// Builds a fresh item for a never-before-seen key, sampling `rand`
    /// uniformly from `[0, 1)` as §3 specifies for a newly seeded item
    /// (as opposed to [`update_priority`]'s post-failure drift).
    pub fn seed(priority: u32, key: impl Into<String>, rng: &mut impl rand::Rng) -> Self {
        Self::new(priority, rng.random_range(0.0..1.0), key)
    }
}

impl Eq for WorkItem {}

impl PartialOrd for WorkItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// `rand` is documented to live in `[0, ∞)`, so `total_cmp` (rather than
// `partial_cmp`, which would choke on NaN) gives us a real total order.
impl Ord for WorkItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.rand.total_cmp(&other.rand))
            .then_with(|| self.key.cmp(&other.key))
    }
}

/// A min-heap of [`WorkItem`]s ordered by `(priority, rand, key)`.
///
/// `BinaryHeap` is a max-heap, so items are stored wrapped in
/// `std::cmp::Reverse` to turn "smallest tuple first" into "largest
/// `Reverse` first".
#[derive(Debug, Default)]
pub struct WorkQueue {
    heap: BinaryHeap<std::cmp::Reverse<WorkItem>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    pub fn push(&mut self, item: WorkItem) {
        self.heap.push(std::cmp::Reverse(item));
    }

    pub fn pop(&mut self) -> Option<WorkItem> {
        self.heap.pop().map(|std::cmp::Reverse(item)| item)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// While `rand` exceeds 1.2, shift the item into a later priority band.
///
/// Chronically failing items otherwise pile up near the tail of their
/// current priority band forever; kicking the priority forward spreads
/// them out across the whole crawl instead.
pub fn update_priority(mut priority: u32, mut rand: f64) -> (u32, f64) {
    while rand > 1.2 {
        priority += 1;
        rand -= 1.0;
    }
    (priority, rand)
}
