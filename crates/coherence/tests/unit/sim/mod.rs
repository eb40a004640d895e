//! # Reference Kernel Tests

/// Memory controllers and the memory node.
pub mod memory;

/// Fixed-latency network.
pub mod network;
