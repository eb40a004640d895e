//! Reference simulation kernel.
//!
//! The cache nodes only need an outbound `Network` and a `ProcessorPort`. This
//! module supplies a minimal world to run them in:
//! 1. **Network:** Fixed-latency delivery, FIFO per link.
//! 2. **Memory:** Memory controller endpoints with simple or DRAM timing.
//! 3. **Traces:** Parsing of per-core access traces.
//! 4. **System:** Builds a hierarchy from `Config` and runs a trace to completion.

/// Memory controller endpoint and latency models.
pub mod memory;

/// Fixed-latency interconnect.
pub mod network;

/// Trace-driven hierarchy.
pub mod system;

/// Trace format.
pub mod trace;

pub use memory::{
    DramController, DramTiming, LineTiming, MemoryController, MemoryNode, MemoryStats,
    SimpleController,
};
pub use network::DelayNetwork;
pub use system::{CoreReport, System, SystemReport};
pub use trace::{Access, CoreRequest, Trace, TraceEntry};

use thiserror::Error;

use crate::common::{CoherenceError, ConfigError, NodeId};

/// Errors that end a reference run.
#[derive(Debug, Error)]
pub enum SimError {
    /// The system could not be built.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A node hit a fatal coherence error.
    #[error(transparent)]
    Coherence(#[from] CoherenceError),

    /// A packet was addressed to a node id outside the topology.
    #[error("packet addressed to unknown node {0}")]
    UnknownNode(NodeId),

    /// A trace names a core the topology does not have.
    #[error("trace names core {core} but the system has {cores} cores")]
    UnknownCore {
        /// Core named by the trace.
        core: usize,
        /// Cores in the system.
        cores: usize,
    },
}
