//! Stall buffer: parked requests waiting for a resource or a line.
//!
//! Items are parked under exactly one reason and are handed back by `wake`
//! when a qualifying event happens. Each reason keys on a different event:
//!
//! | Reason            | Watches               | Woken by                       |
//! |-------------------|-----------------------|--------------------------------|
//! | `MshrStall`       | any MSHR slot         | `MshrReleased`                 |
//! | `PrevPendStall`   | own line              | `TransactionDone(line)`        |
//! | `LruBusyStall`    | victim (or pending) line | `TransactionDone` / `EvictionDone` |
//! | `TransStall`      | own line              | `EvictionDone(line)`           |
//!
//! Within one watched line, items come back in arrival order.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use serde::Serialize;

/// Why an item was parked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum StallReason {
    /// No free MSHR slot.
    MshrStall,
    /// Another transaction on the same line is in flight.
    PrevPendStall,
    /// The replacement victim is itself mid-transition.
    LruBusyStall,
    /// The line is being evicted.
    TransStall,
}

impl fmt::Display for StallReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MshrStall => "MSHR_STALL",
            Self::PrevPendStall => "PREV_PEND_STALL",
            Self::LruBusyStall => "LRU_BUSY_STALL",
            Self::TransStall => "TRANS_STALL",
        })
    }
}

/// Event that may release parked items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeEvent {
    /// An MSHR slot was freed.
    MshrReleased,
    /// The transaction on a line finished and its controller is stable.
    TransactionDone(u64),
    /// A replacement finished and the victim line is gone.
    EvictionDone(u64),
}

/// A parked item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StallEntry<T> {
    /// The blocked request or message.
    pub item: T,
    /// Line the item addresses.
    pub line: u64,
    /// Why it is parked.
    pub reason: StallReason,
    /// Line whose progress releases it (ignored for `MshrStall`).
    pub watch: u64,
    /// Cycle the item was parked.
    pub enqueued_at: u64,
}

/// Ordered collection of parked items.
#[derive(Debug)]
pub struct StallBuffer<T> {
    mshr_waiters: VecDeque<StallEntry<T>>,
    by_watch: BTreeMap<u64, VecDeque<StallEntry<T>>>,
    per_line: HashMap<u64, usize>,
    len: usize,
    max_depth: usize,
}

impl<T> Default for StallBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StallBuffer<T> {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self {
            mshr_waiters: VecDeque::new(),
            by_watch: BTreeMap::new(),
            per_line: HashMap::new(),
            len: 0,
            max_depth: 0,
        }
    }

    /// Parks `item`.
    ///
    /// # Arguments
    ///
    /// * `item` - Blocked request or message.
    /// * `line` - Line the item addresses.
    /// * `reason` - Stall reason.
    /// * `watch` - Line whose completion releases the item.
    /// * `now` - Current cycle.
    pub fn stall(&mut self, item: T, line: u64, reason: StallReason, watch: u64, now: u64) {
        let entry = StallEntry {
            item,
            line,
            reason,
            watch,
            enqueued_at: now,
        };
        match reason {
            StallReason::MshrStall => self.mshr_waiters.push_back(entry),
            _ => self.by_watch.entry(watch).or_default().push_back(entry),
        }
        *self.per_line.entry(line).or_insert(0) += 1;
        self.len += 1;
        self.max_depth = self.max_depth.max(self.len);
    }

    /// Whether any parked item addresses `line`.
    pub fn has_match(&self, line: u64) -> bool {
        self.per_line.contains_key(&line)
    }

    /// Removes and returns, in arrival order, every item `event` releases.
    pub fn wake(&mut self, event: WakeEvent) -> Vec<StallEntry<T>> {
        let woken: Vec<StallEntry<T>> = match event {
            WakeEvent::MshrReleased => self.mshr_waiters.drain(..).collect(),
            WakeEvent::TransactionDone(line) => self.take_watching(line, |r| {
                matches!(r, StallReason::PrevPendStall | StallReason::LruBusyStall)
            }),
            WakeEvent::EvictionDone(line) => self.take_watching(line, |r| {
                matches!(r, StallReason::TransStall | StallReason::LruBusyStall)
            }),
        };
        for entry in &woken {
            self.forget(entry.line);
        }
        self.len -= woken.len();
        woken
    }

    fn take_watching(
        &mut self,
        watch: u64,
        wakes: impl Fn(StallReason) -> bool,
    ) -> Vec<StallEntry<T>> {
        let Some(queue) = self.by_watch.remove(&watch) else {
            return Vec::new();
        };
        let (woken, kept): (VecDeque<_>, VecDeque<_>) =
            queue.into_iter().partition(|e| wakes(e.reason));
        if !kept.is_empty() {
            let _ = self.by_watch.insert(watch, kept);
        }
        woken.into()
    }

    fn forget(&mut self, line: u64) {
        if let Some(count) = self.per_line.get_mut(&line) {
            *count -= 1;
            if *count == 0 {
                let _ = self.per_line.remove(&line);
            }
        }
    }

    /// Number of parked items.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing is parked.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Largest number of items parked at once.
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Number of parked items with `reason`.
    pub fn count(&self, reason: StallReason) -> usize {
        self.iter().filter(|e| e.reason == reason).count()
    }

    /// Parked items; MSHR waiters first, then by watched line.
    pub fn iter(&self) -> impl Iterator<Item = &StallEntry<T>> + '_ {
        self.mshr_waiters
            .iter()
            .chain(self.by_watch.values().flat_map(VecDeque::iter))
    }
}
