//! Credit-counted outbound link.
//!
//! A node may put a packet on the interconnect only while it holds a credit.
//! Packets that find no credit (or find older packets already waiting) are
//! buffered and leave in FIFO order as credits come back. Credit packets
//! themselves are never metered.

use std::collections::VecDeque;

use tracing::trace;

use super::Network;
use crate::common::{CoherenceError, NodeId};
use crate::message::{NetworkPacket, Payload};

/// Outcome of `FlowControlLink::try_send`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The packet left on this call.
    Sent,
    /// The packet is waiting for credit.
    Buffered,
}

/// Credit-counted outbound channel of one node.
#[derive(Debug)]
pub struct FlowControlLink {
    owner: NodeId,
    credits: u32,
    max_credits: u32,
    buffer: VecDeque<NetworkPacket>,
    packets_sent: u64,
    credits_received: u64,
    credits_returned: u64,
    max_buffered: usize,
}

impl FlowControlLink {
    /// Creates a link holding its full `max_credits`.
    pub const fn new(owner: NodeId, max_credits: u32) -> Self {
        Self {
            owner,
            credits: max_credits,
            max_credits,
            buffer: VecDeque::new(),
            packets_sent: 0,
            credits_received: 0,
            credits_returned: 0,
            max_buffered: 0,
        }
    }

    /// Sends `packet` if a credit is available and nothing is queued ahead of it.
    pub fn try_send(&mut self, packet: NetworkPacket, net: &mut dyn Network) -> SendOutcome {
        if self.buffer.is_empty() && self.credits > 0 {
            self.transmit(packet, net);
            SendOutcome::Sent
        } else {
            trace!(node = %self.owner, credits = self.credits, dst = %packet.dst, "link buffered");
            self.buffer.push_back(packet);
            self.max_buffered = self.max_buffered.max(self.buffer.len());
            SendOutcome::Buffered
        }
    }

    /// Accepts one returned credit and drains buffered packets.
    ///
    /// # Returns
    ///
    /// Number of buffered packets sent, or `CreditOverflow` if the credit
    /// would exceed the configured maximum.
    pub fn credit_arrived(&mut self, net: &mut dyn Network) -> Result<usize, CoherenceError> {
        if self.credits >= self.max_credits {
            return Err(CoherenceError::CreditOverflow {
                node: self.owner,
                max: self.max_credits,
            });
        }
        self.credits += 1;
        self.credits_received += 1;
        Ok(self.pump(net))
    }

    /// Returns one credit to `peer` for a packet this node consumed.
    pub fn send_credit_to_peer(&mut self, peer: NodeId, tag: u32, net: &mut dyn Network) {
        self.credits_returned += 1;
        trace!(node = %self.owner, %peer, "credit returned");
        net.send(NetworkPacket {
            tag,
            src: self.owner,
            dst: peer,
            payload: Payload::Credit,
        });
    }

    /// Sends buffered packets while credits last.
    pub fn pump(&mut self, net: &mut dyn Network) -> usize {
        let mut sent = 0;
        while self.credits > 0 {
            let Some(packet) = self.buffer.pop_front() else {
                break;
            };
            self.transmit(packet, net);
            sent += 1;
        }
        sent
    }

    fn transmit(&mut self, packet: NetworkPacket, net: &mut dyn Network) {
        self.credits -= 1;
        self.packets_sent += 1;
        trace!(node = %self.owner, dst = %packet.dst, tag = packet.tag, credits = self.credits, "link send");
        net.send(packet);
    }

    /// Credits currently held.
    pub const fn credits(&self) -> u32 {
        self.credits
    }

    /// Configured maximum.
    pub const fn max_credits(&self) -> u32 {
        self.max_credits
    }

    /// Packets waiting for credit.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Packets sent so far (each consumed one credit).
    pub const fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    /// Credits received back so far.
    pub const fn credits_received(&self) -> u64 {
        self.credits_received
    }

    /// Credits this node has returned to its peers.
    pub const fn credits_returned(&self) -> u64 {
        self.credits_returned
    }

    /// Largest number of packets buffered at once.
    pub const fn max_buffered(&self) -> usize {
        self.max_buffered
    }
}
