//! Line storage: the resident cache table and the MSHR.
//!
//! This module provides:
//! 1. **CacheStorage:** Set-associative table of resident lines with LRU victim selection.
//! 2. **Mshr:** Fully associative table of lines with a transaction outstanding.
//! 3. **Handles:** Generation-checked `LineHandle`s shared by both tables.
//!
//! Both tables own their entries outright. A line migrates between them by
//! moving the value, so it is never reachable from both at once.
//!
//! ```text
//!   set 0: [ way0 | way1 | way2 | way3 ]    Free | Reserved(line) | Occupied(line, LineEntry)
//!   set 1: [ way0 | way1 | way2 | way3 ]
//!   ...
//! ```

/// Miss status holding registers.
pub mod mshr;

/// Replacement policies.
pub mod policies;

/// Slot arena shared by both tables.
pub mod slots;

pub use mshr::Mshr;
pub use policies::{LruPolicy, ReplacementPolicy};
pub use slots::LineHandle;

use crate::common::{AddressLayout, ConfigError};
use crate::config::CacheGeometry;
use slots::{SlotTable, SlotView};

/// A resident line and its protocol controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineEntry<C> {
    /// Line data is present (not just a tag).
    pub have_data: bool,
    /// Line holds data newer than the next level.
    pub dirty: bool,
    /// Line is the victim of a replacement that has not finished.
    pub evicting: bool,
    /// Protocol controller for the line.
    pub controller: C,
}

impl<C> LineEntry<C> {
    /// A freshly filled, clean, non-evicting entry.
    pub const fn filled(controller: C) -> Self {
        Self {
            have_data: true,
            dirty: false,
            evicting: false,
            controller,
        }
    }
}

/// Result of asking for a slot to install a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockReservation {
    /// A free way was found and is now reserved for the line.
    Free(LineHandle),
    /// The set is full; this resident line is the LRU victim. Nothing changed.
    Victim(LineHandle),
    /// The set is full and its LRU way is itself reserved for a pending fill
    /// of `pending_line`.
    Busy {
        /// Line the LRU way is reserved for.
        pending_line: u64,
    },
}

/// Set-associative table of resident lines.
#[derive(Debug)]
pub struct CacheStorage<C> {
    layout: AddressLayout,
    table: SlotTable<LineEntry<C>>,
    policy: Box<dyn ReplacementPolicy>,
}

impl<C> CacheStorage<C> {
    /// Creates an empty LRU table.
    ///
    /// # Arguments
    ///
    /// * `geometry` - Size, line size and associativity.
    ///
    /// # Returns
    ///
    /// The table, or a `ConfigError` if the geometry is not realisable.
    pub fn new(geometry: &CacheGeometry) -> Result<Self, ConfigError> {
        geometry.validate()?;
        let sets = geometry.sets();
        Self::with_policy(
            geometry,
            Box::new(LruPolicy::new(sets, geometry.ways)),
        )
    }

    /// Creates an empty table with a caller-supplied replacement policy.
    pub fn with_policy(
        geometry: &CacheGeometry,
        policy: Box<dyn ReplacementPolicy>,
    ) -> Result<Self, ConfigError> {
        geometry.validate()?;
        let sets = geometry.sets();
        Ok(Self {
            layout: AddressLayout::new(geometry.line_bytes, sets)?,
            table: SlotTable::new(sets, geometry.ways),
            policy,
        })
    }

    /// Address layout of the table.
    pub const fn layout(&self) -> &AddressLayout {
        &self.layout
    }

    /// Line address of `addr`.
    pub const fn get_line_addr(&self, addr: u64) -> u64 {
        self.layout.line_addr(addr)
    }

    /// Tag mask of the table.
    pub const fn get_tag_mask(&self) -> u64 {
        self.layout.tag_mask()
    }

    /// Number of line-offset bits.
    pub const fn get_offset_bits(&self) -> u32 {
        self.layout.offset_bits()
    }

    /// Associativity.
    pub const fn ways(&self) -> usize {
        self.table.ways()
    }

    /// Total number of ways.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Resident entry holding `addr`'s line.
    pub fn lookup(&self, addr: u64) -> Option<LineHandle> {
        let line = self.layout.line_addr(addr);
        self.table.find_occupied(self.layout.set_index(line), line)
    }

    /// Way reserved for a pending fill of `addr`'s line.
    pub fn reservation_for(&self, addr: u64) -> Option<LineHandle> {
        let line = self.layout.line_addr(addr);
        self.table.find_reserved(self.layout.set_index(line), line)
    }

    /// Entry behind `h`, if the handle is still live and the slot is filled.
    pub fn entry(&self, h: LineHandle) -> Option<&LineEntry<C>> {
        self.table.get(h)
    }

    /// Mutable entry behind `h`.
    pub fn entry_mut(&mut self, h: LineHandle) -> Option<&mut LineEntry<C>> {
        self.table.get_mut(h)
    }

    /// Line address held or awaited by `h`.
    pub fn line_of(&self, h: LineHandle) -> Option<u64> {
        self.table.line_of(h)
    }

    /// Finds a way for `addr`'s line.
    ///
    /// A free way is reserved immediately and becomes MRU, so no later call
    /// can pick it. When the set is full the LRU way is reported as a victim
    /// (or as busy if it is itself awaiting a fill) and nothing is mutated:
    /// evicting the victim is the caller's job.
    pub fn reserve_block_for(&mut self, addr: u64) -> BlockReservation {
        let line = self.layout.line_addr(addr);
        let set = self.layout.set_index(line);
        if let Some(index) = self.table.free_slot(set) {
            if let Some(h) = self.table.reserve(index, line) {
                self.policy.update(set, self.table.way_of(index));
                return BlockReservation::Free(h);
            }
        }
        let index = self.table.set_range(set).start + self.policy.victim(set);
        match self.table.view(index) {
            SlotView::Reserved(pending_line) => BlockReservation::Busy { pending_line },
            SlotView::Occupied(_) | SlotView::Free => {
                BlockReservation::Victim(self.table.handle(index))
            }
        }
    }

    /// Fills the way reserved by `h` with `entry`; the line becomes MRU.
    ///
    /// # Returns
    ///
    /// The (unchanged) handle, or the entry back if `h` is not a live reservation.
    pub fn install(&mut self, h: LineHandle, entry: LineEntry<C>) -> Result<LineHandle, LineEntry<C>> {
        let h = self.table.fill(h, entry)?;
        self.touch(h);
        Ok(h)
    }

    /// Marks the line behind `h` most recently used.
    pub fn touch(&mut self, h: LineHandle) {
        let index = h.index();
        if self.table.line_of(h).is_some() {
            let set = index / self.table.ways();
            self.policy.update(set, self.table.way_of(index));
        }
    }

    /// Removes the victim behind `h` and reserves its way for `addr`'s line.
    ///
    /// # Returns
    ///
    /// The evicted entry and the handle of the new reservation.
    pub fn replace(&mut self, h: LineHandle, addr: u64) -> Option<(LineEntry<C>, LineHandle)> {
        let line = self.layout.line_addr(addr);
        let (old, fresh) = self.table.repurpose(h, line)?;
        self.touch(fresh);
        Some((old, fresh))
    }

    /// Frees the way behind `h`, returning its entry if it was filled.
    pub fn release(&mut self, h: LineHandle) -> Option<LineEntry<C>> {
        self.table.vacate(h)
    }

    /// Number of filled ways.
    pub fn occupancy(&self) -> usize {
        self.table.occupied()
    }

    /// Number of reserved or filled ways in `addr`'s set.
    pub fn set_occupancy(&self, addr: u64) -> usize {
        self.table.in_use(self.layout.set_index(addr))
    }

    /// Resident lines with their entries.
    pub fn iter(&self) -> impl Iterator<Item = (LineHandle, u64, &LineEntry<C>)> + '_ {
        self.table.iter()
    }
}
