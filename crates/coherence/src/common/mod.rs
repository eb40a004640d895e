//! Common types shared by every part of the coherence engine.
//!
//! This module provides:
//! 1. **Node Identity:** The `NodeId` newtype used to address caches, memory
//!    controllers and processors on the interconnect.
//! 2. **Address Layout:** Tag/index/offset decomposition for a set-associative table.
//! 3. **Error Handling:** Protocol violations, dispatch errors and configuration errors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Address decomposition (line address, set index, tag).
pub mod addr;

/// Error types for the engine and its configuration.
pub mod error;

pub use addr::AddressLayout;
pub use error::{CoherenceError, ConfigError, TransitionError};

/// Identifier of a node attached to the interconnect.
///
/// Cache nodes, memory controllers and the reference processors all share one
/// id space; sharer sets index directly by the raw value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Returns the raw id as an index.
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Which half of a coherence transaction a line controller plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Requesting side, attached to the level that issues requests.
    Client,
    /// Serving side, attached to the level that tracks sharers and owner.
    Manager,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::Manager => f.write_str("manager"),
        }
    }
}
