//! Error definitions for the coherence engine.
//!
//! This module defines the failure surface of the engine. It provides:
//! 1. **Transition Errors:** A protocol table has no entry for a (state, event) pair.
//! 2. **Engine Errors:** Protocol violations with node/line context, malformed
//!    packets and credit accounting faults. All of them indicate a modeling bug
//!    and end the run.
//! 3. **Configuration Errors:** Invalid geometry or topology, unreadable files and
//!    malformed traces.
//!
//! Backpressure (MSHR full, busy victim, line mid-transaction, no credit) is not
//! represented here; it is handled by stalling and link buffering.

use std::io;

use thiserror::Error;

use super::{NodeId, Role};
use crate::message::CohOp;

/// A protocol table has no transition for the given state and event.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("state {state} cannot accept {event}")]
pub struct TransitionError {
    /// Debug rendering of the controller state.
    pub state: String,
    /// Debug rendering of the rejected event.
    pub event: String,
}

impl TransitionError {
    /// Builds an error from any debuggable state and event.
    pub fn new(state: impl std::fmt::Debug, event: impl std::fmt::Debug) -> Self {
        Self {
            state: format!("{state:?}"),
            event: format!("{event:?}"),
        }
    }
}

/// Fatal engine errors raised while a node processes an event.
#[derive(Debug, Error)]
pub enum CoherenceError {
    /// An incoming event is not valid for the line's current protocol state.
    #[error("{role} protocol violation on {node} for line {line:#x}: {source}")]
    ProtocolViolation {
        /// Node that owns the line controller.
        node: NodeId,
        /// Role of the controller.
        role: Role,
        /// Line address.
        line: u64,
        /// The rejected transition.
        #[source]
        source: TransitionError,
    },

    /// A reply arrived for a line with no entry in storage or the MSHR.
    #[error("{node} received {op} for line {line:#x} with no transaction outstanding")]
    UnexpectedReply {
        /// Receiving node.
        node: NodeId,
        /// Opcode of the reply.
        op: CohOp,
        /// Line address.
        line: u64,
    },

    /// A memory reply arrived for a line that has no fetch outstanding.
    #[error("{node} received a memory reply for line {line:#x} with no fetch outstanding")]
    UnexpectedMemoryReply {
        /// Receiving node.
        node: NodeId,
        /// Line address.
        line: u64,
    },

    /// The way reserved for a pending fill was lost before the fill completed.
    #[error("{node} lost the way reserved for line {line:#x}")]
    LostReservation {
        /// Node owning the table.
        node: NodeId,
        /// Line address.
        line: u64,
    },

    /// A packet carried a tag that is not part of this run's tag set.
    #[error("{node} received a packet with unknown message tag {tag}")]
    UnknownTag {
        /// Receiving node.
        node: NodeId,
        /// The unrecognised tag.
        tag: u32,
    },

    /// A packet's payload does not match its tag, or the node cannot consume it.
    #[error("{node} cannot consume a {payload} payload tagged {tag}")]
    MismatchedPayload {
        /// Receiving node.
        node: NodeId,
        /// Tag on the packet.
        tag: u32,
        /// Payload kind that was found.
        payload: &'static str,
    },

    /// A credit arrived while the link already held its configured maximum.
    #[error("{node} received a credit beyond its maximum of {max}")]
    CreditOverflow {
        /// Node owning the link.
        node: NodeId,
        /// Configured maximum credit count.
        max: u32,
    },
}

/// Errors raised while loading or validating configuration and traces.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Cache or MSHR geometry cannot be realised.
    #[error("invalid cache geometry: {0}")]
    Geometry(String),

    /// Topology, credit or tag settings are inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A configuration or trace file could not be read.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// A configuration file is not valid JSON for the expected schema.
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// A trace line could not be parsed.
    #[error("trace line {line}: {reason}")]
    Trace {
        /// One-based line number.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },
}
