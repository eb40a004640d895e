//! Sharer set: a growable bitset of node ids.

use crate::common::NodeId;

/// Set of clients holding a line in a shared-capable state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SharerSet {
    words: Vec<u64>,
}

impl SharerSet {
    /// Creates an empty set.
    pub const fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Adds `id`; returns `true` if it was not already present.
    pub fn insert(&mut self, id: NodeId) -> bool {
        let (word, bit) = Self::locate(id);
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        let was_set = self.words[word] & bit != 0;
        self.words[word] |= bit;
        !was_set
    }

    /// Removes `id`; returns `true` if it was present.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let (word, bit) = Self::locate(id);
        match self.words.get_mut(word) {
            Some(w) if *w & bit != 0 => {
                *w &= !bit;
                // Trailing zero words would break derived equality.
                while self.words.last() == Some(&0) {
                    let _ = self.words.pop();
                }
                true
            }
            _ => false,
        }
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: NodeId) -> bool {
        let (word, bit) = Self::locate(id);
        self.words.get(word).is_some_and(|w| w & bit != 0)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Whether the set has no members.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Removes every member.
    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// Members in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..64u32)
                .filter(move |b| word & (1u64 << b) != 0)
                .map(move |b| NodeId(i as u32 * 64 + b))
        })
    }

    const fn locate(id: NodeId) -> (usize, u64) {
        (id.index() / 64, 1u64 << (id.0 % 64))
    }
}

impl FromIterator<NodeId> for SharerSet {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        let mut set = Self::new();
        for id in iter {
            let _ = set.insert(id);
        }
        set
    }
}
