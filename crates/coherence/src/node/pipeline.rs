//! Fixed-latency delay queue for lookup and hit latencies.

use std::collections::VecDeque;

/// Items become ready a fixed number of cycles after they are pushed.
///
/// Pushes happen with non-decreasing ready times, so the queue stays ordered
/// and popping from the front is enough.
#[derive(Debug)]
pub struct DelayQueue<T> {
    latency: u64,
    items: VecDeque<(u64, T)>,
}

impl<T> DelayQueue<T> {
    /// Creates a queue delaying every item by `latency` cycles.
    pub const fn new(latency: u64) -> Self {
        Self {
            latency,
            items: VecDeque::new(),
        }
    }

    /// Queues `item`, produced at cycle `now`.
    pub fn push(&mut self, now: u64, item: T) {
        self.items.push_back((now + self.latency, item));
    }

    /// Pops the oldest item if it is ready at `now`.
    pub fn pop_ready(&mut self, now: u64) -> Option<T> {
        let ready = self.items.front().is_some_and(|&(at, _)| at <= now);
        if ready {
            self.items.pop_front().map(|(_, item)| item)
        } else {
            None
        }
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
