//! Miss Status Holding Registers.
//!
//! The MSHR has the same slot shape as `CacheStorage` but is fully associative
//! and keyed by full line address. An entry's existence means a transaction on
//! that line is outstanding. Running out of entries is not an error: `reserve`
//! hands the entry back and the caller stalls the request.

use super::slots::SlotTable;
use super::LineHandle;

/// Fully associative table of outstanding transactions.
#[derive(Debug)]
pub struct Mshr<E> {
    table: SlotTable<E>,
}

impl<E> Mshr<E> {
    /// Creates an MSHR with `entries` slots.
    pub fn new(entries: usize) -> Self {
        Self {
            table: SlotTable::new(1, entries),
        }
    }

    /// Allocates an entry for `line`.
    ///
    /// # Returns
    ///
    /// The entry's handle, or `Err(entry)` when every slot is taken.
    pub fn reserve(&mut self, line: u64, entry: E) -> Result<LineHandle, E> {
        match self.table.free_slot(0) {
            Some(index) => self.table.insert(index, line, entry),
            None => Err(entry),
        }
    }

    /// Handle of the outstanding entry for `line`.
    pub fn get_entry(&self, line: u64) -> Option<LineHandle> {
        self.table.find_occupied(0, line)
    }

    /// Entry behind `h`.
    pub fn entry(&self, h: LineHandle) -> Option<&E> {
        self.table.get(h)
    }

    /// Mutable entry behind `h`.
    pub fn entry_mut(&mut self, h: LineHandle) -> Option<&mut E> {
        self.table.get_mut(h)
    }

    /// Line tracked by `h`.
    pub fn line_of(&self, h: LineHandle) -> Option<u64> {
        self.table.line_of(h)
    }

    /// Frees the slot behind `h`, returning its entry.
    pub fn release(&mut self, h: LineHandle) -> Option<E> {
        self.table.vacate(h)
    }

    /// Whether another `reserve` would fail.
    pub fn is_full(&self) -> bool {
        self.table.free_slot(0).is_none()
    }

    /// Number of outstanding entries.
    pub fn occupancy(&self) -> usize {
        self.table.occupied()
    }

    /// Configured number of entries.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Outstanding entries with their lines.
    pub fn iter(&self) -> impl Iterator<Item = (LineHandle, u64, &E)> + '_ {
        self.table.iter()
    }

    /// First entry matching `pred`.
    pub fn find(&self, mut pred: impl FnMut(&E) -> bool) -> Option<LineHandle> {
        self.table
            .iter()
            .find(|(_, _, entry)| pred(entry))
            .map(|(h, _, _)| h)
    }
}
