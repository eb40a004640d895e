//! Generation-checked slot arena backing both CacheStorage and the MSHR.
//!
//! Slots are laid out set-major (`set * ways + way`). Every slot carries a
//! generation counter that is bumped whenever the slot stops holding the line
//! it held, so a stale `LineHandle` is detected instead of silently aliasing
//! the next occupant.

use std::ops::Range;

/// Stable reference to a slot, valid until the slot is vacated or repurposed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LineHandle {
    index: u32,
    generation: u32,
}

impl LineHandle {
    /// Slot index within its table.
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// Generation the handle was issued at.
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
enum SlotState<T> {
    Free,
    Reserved(u64),
    Occupied(u64, T),
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    state: SlotState<T>,
}

/// What a slot currently holds, without exposing its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SlotView {
    Free,
    Reserved(u64),
    Occupied(u64),
}

#[derive(Debug)]
pub(crate) struct SlotTable<T> {
    slots: Vec<Slot<T>>,
    ways: usize,
}

impl<T> SlotTable<T> {
    pub(crate) fn new(sets: usize, ways: usize) -> Self {
        let slots = (0..sets * ways)
            .map(|_| Slot {
                generation: 0,
                state: SlotState::Free,
            })
            .collect();
        Self { slots, ways }
    }

    pub(crate) const fn ways(&self) -> usize {
        self.ways
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) const fn set_range(&self, set: usize) -> Range<usize> {
        set * self.ways..(set + 1) * self.ways
    }

    pub(crate) const fn way_of(&self, index: usize) -> usize {
        index % self.ways
    }

    pub(crate) fn handle(&self, index: usize) -> LineHandle {
        LineHandle {
            index: index as u32,
            generation: self.slots[index].generation,
        }
    }

    fn live(&self, h: LineHandle) -> Option<&Slot<T>> {
        self.slots
            .get(h.index())
            .filter(|slot| slot.generation == h.generation)
    }

    fn live_mut(&mut self, h: LineHandle) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(h.index())
            .filter(|slot| slot.generation == h.generation)
    }

    pub(crate) fn view(&self, index: usize) -> SlotView {
        match &self.slots[index].state {
            SlotState::Free => SlotView::Free,
            SlotState::Reserved(line) => SlotView::Reserved(*line),
            SlotState::Occupied(line, _) => SlotView::Occupied(*line),
        }
    }

    /// Occupied slot holding `line` within `set`.
    pub(crate) fn find_occupied(&self, set: usize, line: u64) -> Option<LineHandle> {
        self.set_range(set)
            .find(|&i| matches!(self.view(i), SlotView::Occupied(l) if l == line))
            .map(|i| self.handle(i))
    }

    /// Reserved slot waiting for `line` within `set`.
    pub(crate) fn find_reserved(&self, set: usize, line: u64) -> Option<LineHandle> {
        self.set_range(set)
            .find(|&i| matches!(self.view(i), SlotView::Reserved(l) if l == line))
            .map(|i| self.handle(i))
    }

    pub(crate) fn free_slot(&self, set: usize) -> Option<usize> {
        self.set_range(set)
            .find(|&i| matches!(self.slots[i].state, SlotState::Free))
    }

    pub(crate) fn get(&self, h: LineHandle) -> Option<&T> {
        match &self.live(h)?.state {
            SlotState::Occupied(_, value) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, h: LineHandle) -> Option<&mut T> {
        match &mut self.live_mut(h)?.state {
            SlotState::Occupied(_, value) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn line_of(&self, h: LineHandle) -> Option<u64> {
        match &self.live(h)?.state {
            SlotState::Free => None,
            SlotState::Reserved(line) | SlotState::Occupied(line, _) => Some(*line),
        }
    }

    /// Marks a free slot as reserved for `line`.
    pub(crate) fn reserve(&mut self, index: usize, line: u64) -> Option<LineHandle> {
        let slot = self.slots.get_mut(index)?;
        if !matches!(slot.state, SlotState::Free) {
            return None;
        }
        slot.state = SlotState::Reserved(line);
        Some(self.handle(index))
    }

    /// Places `value` into a free slot.
    pub(crate) fn insert(&mut self, index: usize, line: u64, value: T) -> Result<LineHandle, T> {
        match self.slots.get_mut(index) {
            Some(slot) if matches!(slot.state, SlotState::Free) => {
                slot.state = SlotState::Occupied(line, value);
                Ok(self.handle(index))
            }
            _ => Err(value),
        }
    }

    /// Turns a reservation into an occupied slot; the handle stays valid.
    pub(crate) fn fill(&mut self, h: LineHandle, value: T) -> Result<LineHandle, T> {
        let Some(slot) = self.live_mut(h) else {
            return Err(value);
        };
        match slot.state {
            SlotState::Reserved(line) => {
                slot.state = SlotState::Occupied(line, value);
                Ok(h)
            }
            _ => Err(value),
        }
    }

    /// Takes the value out of an occupied slot and reserves the slot for `line`.
    pub(crate) fn repurpose(&mut self, h: LineHandle, line: u64) -> Option<(T, LineHandle)> {
        let slot = self.live_mut(h)?;
        if !matches!(slot.state, SlotState::Occupied(..)) {
            return None;
        }
        let old = std::mem::replace(&mut slot.state, SlotState::Reserved(line));
        slot.generation = slot.generation.wrapping_add(1);
        let fresh = self.handle(h.index());
        match old {
            SlotState::Occupied(_, value) => Some((value, fresh)),
            _ => None,
        }
    }

    /// Returns the slot to the free pool.
    pub(crate) fn vacate(&mut self, h: LineHandle) -> Option<T> {
        let slot = self.live_mut(h)?;
        slot.generation = slot.generation.wrapping_add(1);
        match std::mem::replace(&mut slot.state, SlotState::Free) {
            SlotState::Occupied(_, value) => Some(value),
            SlotState::Free | SlotState::Reserved(_) => None,
        }
    }

    pub(crate) fn occupied(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.state, SlotState::Occupied(..)))
            .count()
    }

    pub(crate) fn in_use(&self, set: usize) -> usize {
        self.set_range(set)
            .filter(|&i| !matches!(self.slots[i].state, SlotState::Free))
            .count()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (LineHandle, u64, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match &slot.state {
            SlotState::Occupied(line, value) => Some((
                LineHandle {
                    index: i as u32,
                    generation: slot.generation,
                },
                *line,
                value,
            )),
            _ => None,
        })
    }
}
