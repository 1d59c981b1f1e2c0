//! Priority queue for pending prefetch work.
//!
//! Higher priority pops first; within a priority, items pop in the order
//! they were pushed. A monotonically increasing sequence number breaks ties
//! in the heap so ordering is stable.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::{PrefetchPriority, PrefetchRequest};

/// One queued request.
#[derive(Debug, Clone)]
pub struct QueuedPrefetch {
    pub priority: PrefetchPriority,
    pub request: PrefetchRequest,
    sequence: u64,
}

impl PartialEq for QueuedPrefetch {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedPrefetch {}

impl PartialOrd for QueuedPrefetch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedPrefetch {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then the earlier sequence number
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Priority-then-FIFO queue.
#[derive(Debug, Default)]
pub struct PrefetchQueue {
    heap: BinaryHeap<QueuedPrefetch>,
    next_sequence: u64,
}

impl PrefetchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, priority: PrefetchPriority, request: PrefetchRequest) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(QueuedPrefetch {
            priority,
            request,
            sequence,
        });
    }

    pub fn pop(&mut self) -> Option<QueuedPrefetch> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remove every queued item, returning them in no particular order.
    pub fn drain(&mut self) -> Vec<QueuedPrefetch> {
        self.heap.drain().collect()
    }
}
