//! Messages exchanged between cache nodes, memory controllers and processors.
//!
//! This module provides:
//! 1. **Coherence Opcodes:** The MESI-family vocabulary shared by client and
//!    manager controllers (`CohOp`).
//! 2. **Payloads:** Coherence messages, memory messages and credits.
//! 3. **Packets:** The tagged envelope handed to the outbound primitive.
//! 4. **Processor Requests:** The capability trait a caller's request type implements.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::NodeId;

/// Coherence opcodes.
///
/// Client-to-manager requests, manager-to-client requests, grants, peer data
/// transfers and unblock-class acknowledgements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CohOp {
    /// Client asks for a readable copy.
    IToS,
    /// Client asks for an exclusive copy.
    IToE,
    /// Owner evicts a clean exclusive line.
    EToI,
    /// Owner evicts a dirty line.
    MToI,
    /// Manager asks the owner to forward a shared copy to another client.
    FwdS,
    /// Manager asks the owner to forward exclusive ownership to another client.
    FwdE,
    /// Manager invalidates a holder.
    DemandI,
    /// Manager grants a shared copy with data.
    GrantS,
    /// Manager grants an exclusive copy with data.
    GrantE,
    /// Manager acknowledges a client eviction.
    GrantI,
    /// Peer transfers a shared copy.
    DataS,
    /// Peer transfers a clean exclusive copy.
    DataE,
    /// Peer transfers a dirty copy.
    DataM,
    /// Client now holds the line shared.
    UnblockS,
    /// Client now holds the line exclusive.
    UnblockE,
    /// Client no longer holds the line.
    UnblockI,
    /// Client no longer holds the line and returned dirty data.
    UnblockIDirty,
    /// Former owner kept a clean shared copy.
    Clean,
    /// Former owner kept a shared copy and returned dirty data.
    Writeback,
}

impl CohOp {
    /// Whether the opcode opens a transaction (as opposed to answering one).
    pub const fn kind(self) -> MessageKind {
        match self {
            Self::IToS
            | Self::IToE
            | Self::EToI
            | Self::MToI
            | Self::FwdS
            | Self::FwdE
            | Self::DemandI => MessageKind::Request,
            _ => MessageKind::Reply,
        }
    }

    /// Client eviction notices.
    pub const fn is_eviction(self) -> bool {
        matches!(self, Self::EToI | Self::MToI)
    }

    /// Whether the opcode asks for or carries write permission.
    pub const fn is_write(self) -> bool {
        matches!(
            self,
            Self::IToE | Self::MToI | Self::FwdE | Self::DataM | Self::UnblockIDirty | Self::Writeback
        )
    }

    /// Protocol-table spelling of the opcode.
    pub const fn name(self) -> &'static str {
        match self {
            Self::IToS => "I_to_S",
            Self::IToE => "I_to_E",
            Self::EToI => "E_to_I",
            Self::MToI => "M_to_I",
            Self::FwdS => "FWD_S",
            Self::FwdE => "FWD_E",
            Self::DemandI => "DEMAND_I",
            Self::GrantS => "GRANT_S_DATA",
            Self::GrantE => "GRANT_E_DATA",
            Self::GrantI => "GRANT_I",
            Self::DataS => "CC_S_DATA",
            Self::DataE => "CC_E_DATA",
            Self::DataM => "CC_M_DATA",
            Self::UnblockS => "UNBLOCK_S",
            Self::UnblockE => "UNBLOCK_E",
            Self::UnblockI => "UNBLOCK_I",
            Self::UnblockIDirty => "UNBLOCK_I_DIRTY",
            Self::Clean => "CLEAN",
            Self::Writeback => "WRITEBACK",
        }
    }
}

impl fmt::Display for CohOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Request/reply classification of a coherence message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Opens a transaction.
    Request,
    /// Answers a transaction.
    Reply,
}

/// A coherence request or reply for one line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoherenceMessage {
    /// Request or reply.
    pub kind: MessageKind,
    /// Protocol opcode.
    pub op: CohOp,
    /// Line address.
    pub addr: u64,
    /// Sender.
    pub src: NodeId,
    /// Client that a forward request must send its data to.
    pub forward_to: Option<NodeId>,
    /// Read/write flag.
    pub write: bool,
}

impl CoherenceMessage {
    /// Builds a message, deriving kind and read/write flag from the opcode.
    pub const fn new(op: CohOp, addr: u64, src: NodeId) -> Self {
        Self {
            kind: op.kind(),
            op,
            addr,
            src,
            forward_to: None,
            write: op.is_write(),
        }
    }

    /// Sets the forward target.
    pub const fn forwarding_to(mut self, target: NodeId) -> Self {
        self.forward_to = Some(target);
        self
    }
}

/// Memory operations between the last cache level and a memory controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemOp {
    /// Line fetch; answered by `Reply`.
    Read,
    /// Dirty line writeback; not answered.
    Write,
    /// Data returned for a `Read`.
    Reply,
}

/// A memory request or reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMessage {
    /// Operation.
    pub op: MemOp,
    /// Line address.
    pub addr: u64,
    /// Sender.
    pub src: NodeId,
}

/// Contents of a network packet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Coherence request or reply.
    Coherence(CoherenceMessage),
    /// Memory request or reply.
    Memory(MemoryMessage),
    /// One credit returned to the receiver's outbound link.
    Credit,
}

impl Payload {
    /// Short payload name for diagnostics.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Coherence(_) => "coherence",
            Self::Memory(_) => "memory",
            Self::Credit => "credit",
        }
    }
}

/// A tagged packet on the interconnect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPacket {
    /// Message-type tag from the run's `MessageTags`.
    pub tag: u32,
    /// Sender.
    pub src: NodeId,
    /// Destination.
    pub dst: NodeId,
    /// Contents.
    pub payload: Payload,
}

impl NetworkPacket {
    /// The coherence message, if this is a coherence packet.
    pub const fn coherence(&self) -> Option<&CoherenceMessage> {
        match &self.payload {
            Payload::Coherence(msg) => Some(msg),
            _ => None,
        }
    }

    /// The memory message, if this is a memory packet.
    pub const fn memory(&self) -> Option<&MemoryMessage> {
        match &self.payload {
            Payload::Memory(msg) => Some(msg),
            _ => None,
        }
    }

    /// Whether this is a credit packet.
    pub const fn is_credit(&self) -> bool {
        matches!(self.payload, Payload::Credit)
    }
}

/// Capability a processor-side request type must provide to enter an L1.
///
/// The request value itself is opaque to the cache; it is handed back
/// unchanged through the response callback.
pub trait ProcessorRequest {
    /// Byte address accessed.
    fn address(&self) -> u64;

    /// `true` for loads, `false` for stores.
    fn is_read(&self) -> bool;
}
