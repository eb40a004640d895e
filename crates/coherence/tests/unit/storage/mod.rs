//! # Storage Tests
//!
//! Tests for the set-associative line table, the MSHR and replacement.


/// LRU ordering and victim choice.
pub mod lru;
