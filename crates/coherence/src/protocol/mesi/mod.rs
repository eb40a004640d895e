//! MESI protocol variant.
//!
//! Reads are granted exclusive when no other client holds the line, so a
//! private read-then-write sequence needs a single manager round trip.

/// Client table.
pub mod client;

/// Manager table.
pub mod manager;

pub use client::{ClientState, MesiClient};
pub use manager::{ManagerState, MesiManager};
