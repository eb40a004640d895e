//! Address decomposition for set-associative tables.
//!
//! A byte address splits into three fields:
//!
//! ```text
//!  63                      offset_bits + index_bits      offset_bits        0
//! +---------------------------+-----------------------------+-----------------+
//! |            tag            |          set index          |   line offset   |
//! +---------------------------+-----------------------------+-----------------+
//! ```
//!
//! The line address is the byte address with the offset cleared; every table in
//! the engine is keyed by line address.

use super::error::ConfigError;

/// Tag/index/offset layout of one table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressLayout {
    offset_bits: u32,
    index_bits: u32,
}

impl AddressLayout {
    /// Creates a layout for `sets` sets of `line_bytes`-byte lines.
    ///
    /// # Arguments
    ///
    /// * `line_bytes` - Block size in bytes; must be a power of two.
    /// * `sets` - Number of sets; must be a power of two.
    ///
    /// # Returns
    ///
    /// The layout, or `ConfigError::Geometry` when either value is zero or not a
    /// power of two.
    pub fn new(line_bytes: usize, sets: usize) -> Result<Self, ConfigError> {
        if line_bytes == 0 || !line_bytes.is_power_of_two() {
            return Err(ConfigError::Geometry(format!(
                "line size {line_bytes} is not a power of two"
            )));
        }
        if sets == 0 || !sets.is_power_of_two() {
            return Err(ConfigError::Geometry(format!(
                "set count {sets} is not a power of two"
            )));
        }
        Ok(Self {
            offset_bits: line_bytes.trailing_zeros(),
            index_bits: sets.trailing_zeros(),
        })
    }

    /// Number of low bits addressing a byte within a line.
    #[inline(always)]
    pub const fn offset_bits(&self) -> u32 {
        self.offset_bits
    }

    /// Number of bits selecting the set.
    #[inline(always)]
    pub const fn index_bits(&self) -> u32 {
        self.index_bits
    }

    /// Block size in bytes.
    pub const fn line_bytes(&self) -> u64 {
        1 << self.offset_bits
    }

    /// Number of sets.
    pub const fn sets(&self) -> usize {
        1 << self.index_bits
    }

    /// Clears the line offset of `addr`.
    #[inline(always)]
    pub const fn line_addr(&self, addr: u64) -> u64 {
        addr & !(self.line_bytes() - 1)
    }

    /// Mask selecting the tag bits of an address.
    pub const fn tag_mask(&self) -> u64 {
        let low = self.offset_bits + self.index_bits;
        if low >= 64 { 0 } else { !0u64 << low }
    }

    /// Set index of `addr`.
    #[inline(always)]
    pub const fn set_index(&self, addr: u64) -> usize {
        ((addr >> self.offset_bits) & (self.sets() as u64 - 1)) as usize
    }

    /// Tag of `addr`, shifted down to bit zero.
    pub const fn tag(&self, addr: u64) -> u64 {
        match (addr & self.tag_mask()).checked_shr(self.offset_bits + self.index_bits) {
            Some(tag) => tag,
            None => 0,
        }
    }
}
