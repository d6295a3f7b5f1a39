//! Pending request queue ordered by priority, then submission order

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::request::Prioritized;

/// A request waiting for its lane.
///
/// Ordered so that the max-heap yields the lowest priority value first and,
/// among equal priorities, the lowest sequence number (oldest) first.
struct Waiting<R> {
    request: R,
    priority: u32,
    sequence: i64,
}

impl<R> PartialEq for Waiting<R> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl<R> Eq for Waiting<R> {}

impl<R> PartialOrd for Waiting<R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<R> Ord for Waiting<R> {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.priority.cmp(&self.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            other_ordering => other_ordering,
        }
    }
}

/// Queue of requests awaiting a free lane
pub struct RequestQueue<R> {
    heap: BinaryHeap<Waiting<R>>,
    next_sequence: i64,
    /// Counts down from -1 so requests put back go ahead of all others
    front_sequence: i64,
}

impl<R: Prioritized> RequestQueue<R> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence: 0,
            front_sequence: -1,
        }
    }

    pub fn push(&mut self, request: R) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.push_with_sequence(request, sequence);
    }

    fn push_with_sequence(&mut self, request: R, sequence: i64) {
        let priority = request.priority();
        self.heap.push(Waiting {
            request,
            priority,
            sequence,
        });
    }

    /// Most urgent request, oldest first among equals
    pub fn pop(&mut self) -> Option<R> {
        self.heap.pop().map(|w| w.request)
    }

    /// Put back a request that was popped but could not be dispatched.
    ///
    /// It keeps its place ahead of anything of the same priority.
    pub fn push_front(&mut self, request: R) {
        let sequence = self.front_sequence;
        self.front_sequence -= 1;
        self.push_with_sequence(request, sequence);
    }

    #[must_use]
    pub fn peek(&self) -> Option<&R> {
        self.heap.peek().map(|w| &w.request)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Apply `f` to every queued request, then restore heap order
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut R)) {
        let mut items = std::mem::take(&mut self.heap).into_vec();
        for item in &mut items {
            f(&mut item.request);
            item.priority = item.request.priority();
        }
        self.heap = BinaryHeap::from(items);
    }

    /// Remove and return every queued request, most urgent first
    pub fn drain(&mut self) -> Vec<R> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(request) = self.pop() {
            out.push(request);
        }
        out
    }
}

impl<R: Prioritized> Default for RequestQueue<R> {
    fn default() -> Self {
        Self::new()
    }
}
