//! Lock-free ordered work queue shared by shard workers

use std::sync::atomic::{AtomicUsize, Ordering};

/// Ordered queue handing out items to workers.
///
/// Workers call [`next()`](WorkQueue::next) to atomically claim the next item
/// together with its position in the original worklist. Items are claimed in
/// insertion order; completion order is up to the workers.
pub struct WorkQueue<S> {
    items: Vec<(usize, S)>,
    cursor: AtomicUsize,
}

impl<S> WorkQueue<S> {
    /// Create queue from all items (no filtering)
    pub fn new(items: Vec<S>) -> Self {
        Self::filtered(items, |_| true)
    }

    /// Create queue, keeping only items that pass the filter (resume support).
    ///
    /// Skipped items keep their slot number so labels stay stable across runs.
    pub fn filtered(items: Vec<S>, keep: impl Fn(&S) -> bool) -> Self {
        let before = items.len();
        let items: Vec<(usize, S)> = items
            .into_iter()
            .enumerate()
            .filter(|(_, s)| keep(s))
            .collect();
        if items.len() < before {
            log::info!(
                "{} of {before} items already done, {} queued",
                before - items.len(),
                items.len()
            );
        }
        Self {
            items,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Claim the next item (lock-free)
    pub fn next(&self) -> Option<(usize, &S)> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(i).map(|(slot, s)| (*slot, s))
    }

    /// Total items queued
    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// Items not yet claimed
    pub fn remaining(&self) -> usize {
        self.total()
            .saturating_sub(self.cursor.load(Ordering::Relaxed))
    }
}
