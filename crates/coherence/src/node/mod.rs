//! Cache nodes and the machinery they are built from.
//!
//! This module provides:
//! 1. **Stall Buffer:** Parking and wakeup of blocked requests.
//! 2. **Flow Control:** Credit-counted outbound link with FIFO buffering.
//! 3. **Pipelines:** Lookup and hit latency delay queues.
//! 4. **Orchestrators:** `L1Cache` (client role) and `L2Cache` (manager role).
//!
//! Nodes are tick-driven actors. Inbound events are queued by the `handle_*`
//! methods and processed, in arrival order, by the next `tick()`. Everything a
//! single event causes (transitions, wakeups, retries) finishes before the
//! next event is looked at.

/// Private, client-side cache.
pub mod l1;

/// Shared, manager-side cache.
pub mod l2;

/// Credit-counted outbound link.
pub mod link;

/// Latency delay queue.
pub mod pipeline;

/// Stall buffer.
pub mod stall;

pub use l1::L1Cache;
pub use l2::L2Cache;
pub use link::{FlowControlLink, SendOutcome};
pub use pipeline::DelayQueue;
pub use stall::{StallBuffer, StallEntry, StallReason, WakeEvent};

use crate::common::NodeId;
use crate::message::NetworkPacket;

/// Outbound "send to destination id" primitive supplied by the kernel.
pub trait Network {
    /// Hands `packet` to the interconnect; delivery is the kernel's concern.
    fn send(&mut self, packet: NetworkPacket);
}

impl Network for Vec<NetworkPacket> {
    fn send(&mut self, packet: NetworkPacket) {
        self.push(packet);
    }
}

/// Response callback towards the processor side of an L1.
pub trait ProcessorPort<R> {
    /// Returns a completed request to its issuer.
    fn respond(&mut self, node: NodeId, request: R);
}

impl<R> ProcessorPort<R> for Vec<R> {
    fn respond(&mut self, _node: NodeId, request: R) {
        self.push(request);
    }
}
