//! Cache-coherence engine library.
//!
//! This crate implements the per-node coherence machinery of a two-level cache
//! hierarchy with the following:
//! 1. **Storage:** Set-associative line table with LRU replacement and a miss status holding register file.
//! 2. **Protocol:** Table-driven client and manager line controllers (MESI).
//! 3. **Nodes:** L1 (client) and L2 (manager) orchestrators with stall buffering and credit-based flow control.
//! 4. **Messages:** Coherence, memory and credit packets, and address-to-node destination maps.
//! 5. **Simulation:** A reference kernel (network, memory nodes, traces), configuration and statistics.

/// Common types (node ids, address layout, errors).
pub mod common;
/// Engine configuration (defaults, geometry, tags, topology).
pub mod config;
/// Address-to-node destination maps.
pub mod dest_map;
/// Coherence, memory and credit messages.
pub mod message;
/// Cache nodes (L1, L2, stall buffer, flow control).
pub mod node;
/// Line controllers and protocol tables.
pub mod protocol;
/// Reference simulation kernel.
pub mod sim;
/// Per-node statistics collection and reporting.
pub mod stats;
/// Line table and MSHR.
pub mod storage;

/// Root configuration type; use `Config::default()` or load from JSON.
pub use crate::config::Config;
/// Private client-side cache node.
pub use crate::node::L1Cache;
/// Shared manager-side cache node.
pub use crate::node::L2Cache;
/// Trace-driven hierarchy; construct with `System::new`.
pub use crate::sim::System;
