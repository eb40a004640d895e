//! LRU Replacement Policy Unit Tests.

use cohsim_core::storage::{LruPolicy, ReplacementPolicy};
use proptest::prelude::*;

/// A fresh set evicts its last way first.
#[test]
fn initial_victim_is_last_way() {
    let lru = LruPolicy::new(2, 4);
    assert_eq!(lru.victim(0), 3);
    assert_eq!(lru.order(1), &[0, 1, 2, 3]);
}

/// Updating moves a way to MRU; the victim is the least recently updated.
#[test]
fn update_moves_to_front() {
    let mut lru = LruPolicy::new(1, 4);
    for way in [3, 2, 1, 0, 3] {
        lru.update(0, way);
    }
    assert_eq!(lru.order(0), &[3, 0, 1, 2]);
    assert_eq!(lru.victim(0), 2);
}

/// Sets are independent.
#[test]
fn sets_are_independent() {
    let mut lru = LruPolicy::new(2, 2);
    lru.update(0, 1);
    assert_eq!(lru.victim(0), 0);
    assert_eq!(lru.victim(1), 1);
}

proptest! {
    /// The victim is always the way whose last update is oldest.
    #[test]
    fn victim_is_true_lru(touches in prop::collection::vec(0usize..4, 0..40)) {
        let mut lru = LruPolicy::new(1, 4);
        let mut last_use = [3usize, 2, 1, 0];
        for (t, &way) in touches.iter().enumerate() {
            lru.update(0, way);
            last_use[way] = t + 4;
        }
        let expected = (0..4).min_by_key(|&w| last_use[w]).unwrap();
        prop_assert_eq!(lru.victim(0), expected);
    }
}
