//! Least Recently Used (LRU) Replacement Policy.
//!
//! Keeps a usage stack per set. Touching a way moves it to the top (MRU); the
//! bottom of the stack is the victim.
//!
//! # Performance
//!
//! - `update()`: O(W) where W is the associativity
//! - `victim()`: O(1)
//! - Space: O(S × W) where S is the number of sets

use super::ReplacementPolicy;

/// LRU policy state.
#[derive(Clone, Debug)]
pub struct LruPolicy {
    /// One usage stack per set. Index 0 is MRU, last index is LRU.
    usage: Vec<Vec<usize>>,
}

impl LruPolicy {
    /// Creates a policy where, initially, way 0 is MRU and the last way is LRU.
    ///
    /// # Arguments
    ///
    /// * `sets` - Number of sets.
    /// * `ways` - Associativity.
    pub fn new(sets: usize, ways: usize) -> Self {
        Self {
            usage: (0..sets).map(|_| (0..ways).collect()).collect(),
        }
    }

    /// Recency order of `set`, most recent first.
    pub fn order(&self, set: usize) -> &[usize] {
        &self.usage[set]
    }
}

impl ReplacementPolicy for LruPolicy {
    fn update(&mut self, set: usize, way: usize) {
        let stack = &mut self.usage[set];
        if let Some(pos) = stack.iter().position(|&x| x == way) {
            let _ = stack.remove(pos);
        }
        stack.insert(0, way);
    }

    fn victim(&self, set: usize) -> usize {
        self.usage[set].last().copied().unwrap_or(0)
    }
}
