//! Address Layout and Node Id Unit Tests.
//!
//! Verifies tag/index/offset decomposition for power-of-two geometries and the
//! rejection of geometries that cannot be decomposed.

use cohsim_core::common::{AddressLayout, ConfigError, NodeId};
use rstest::rstest;

// ══════════════════════════════════════════════════════════
// 1. Decomposition
// ══════════════════════════════════════════════════════════

/// 32-byte lines and 128 sets: 5 offset bits, 7 index bits.
#[test]
fn layout_bit_widths() {
    let layout = AddressLayout::new(32, 128).unwrap();
    assert_eq!(layout.offset_bits(), 5);
    assert_eq!(layout.index_bits(), 7);
    assert_eq!(layout.line_bytes(), 32);
    assert_eq!(layout.sets(), 128);
}

/// Line address clears exactly the offset bits.
#[rstest]
#[case(0x1000, 0x1000)]
#[case(0x101f, 0x1000)]
#[case(0x1020, 0x1020)]
#[case(u64::MAX, u64::MAX & !31)]
fn line_addr_clears_offset(#[case] addr: u64, #[case] line: u64) {
    let layout = AddressLayout::new(32, 128).unwrap();
    assert_eq!(layout.line_addr(addr), line, "line of {addr:#x}");
}

/// Set index and tag recombine into the line address.
#[test]
fn set_and_tag_recompose_line() {
    let layout = AddressLayout::new(32, 4).unwrap();
    let addr = 0xdead_beef;
    let rebuilt = (layout.tag(addr) << 7) | ((layout.set_index(addr) as u64) << 5);
    assert_eq!(rebuilt, layout.line_addr(addr));
}

/// The tag mask covers everything above offset and index.
#[test]
fn tag_mask_above_index() {
    let layout = AddressLayout::new(64, 16).unwrap();
    assert_eq!(layout.tag_mask(), !0u64 << 10);
}

/// A single-set table puts every address in set 0.
#[test]
fn single_set_layout() {
    let layout = AddressLayout::new(32, 1).unwrap();
    assert_eq!(layout.index_bits(), 0);
    assert_eq!(layout.set_index(0xffff_ffe0), 0);
}

// ══════════════════════════════════════════════════════════
// 2. Invalid Geometry
// ══════════════════════════════════════════════════════════

/// Zero or non-power-of-two sizes are rejected.
#[rstest]
#[case(0, 4)]
#[case(24, 4)]
#[case(32, 0)]
#[case(32, 3)]
fn rejects_non_power_of_two(#[case] line: usize, #[case] sets: usize) {
    assert!(matches!(
        AddressLayout::new(line, sets),
        Err(ConfigError::Geometry(_))
    ));
}

// ══════════════════════════════════════════════════════════
// 3. Node Ids
// ══════════════════════════════════════════════════════════

/// Node ids display with an `n` prefix and index by raw value.
#[test]
fn node_id_display_and_index() {
    assert_eq!(NodeId(7).to_string(), "n7");
    assert_eq!(NodeId(7).index(), 7);
}
