//! Replacement policies for set-associative tables.
//!
//! The coherence engine needs true LRU: the victim must be the way touched
//! least recently, and it is chosen without disturbing the recency order so
//! that the orchestrator can decide whether the victim is usable first.

/// Least Recently Used replacement policy.
pub mod lru;

pub use lru::LruPolicy;

/// Trait for cache replacement policies.
///
/// Defines the interface for updating usage state and selecting victim lines.
pub trait ReplacementPolicy: Send + Sync + std::fmt::Debug {
    /// Updates the policy state when a way is reserved, filled or accessed.
    ///
    /// # Arguments
    ///
    /// * `set` - The set index.
    /// * `way` - The way index within the set that was accessed.
    fn update(&mut self, set: usize, way: usize);

    /// Selects the way to evict from `set` without changing any state.
    ///
    /// # Arguments
    ///
    /// * `set` - The set index.
    ///
    /// # Returns
    ///
    /// The index of the way to evict.
    fn victim(&self, set: usize) -> usize;
}
