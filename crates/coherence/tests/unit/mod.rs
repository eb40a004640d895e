//! # Unit Components
//!
//! This module serves as the central hub for the unit tests of the coherence
//! engine. Each building block is exercised on its own: storage tables, protocol
//! tables, node machinery, configuration and the reference kernel.

/// Unit tests for address decomposition and node ids.
pub mod common;

/// Unit tests for configuration defaults, JSON loading and validation.
pub mod config;




/// Unit tests for the reference kernel pieces (traces, memory nodes, network).
pub mod sim;

/// Unit tests for statistics accounting.
pub mod stats;

/// Unit tests for the line table, MSHR and LRU policy.
pub mod storage;
