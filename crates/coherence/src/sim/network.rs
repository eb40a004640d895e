//! Fixed-latency interconnect.

use crate::message::NetworkPacket;
use crate::node::{DelayQueue, Network};

/// Delivers every packet a fixed number of cycles after it is sent.
///
/// One latency for every link keeps delivery in send order, so per-link FIFO
/// order holds trivially.
#[derive(Debug)]
pub struct DelayNetwork {
    now: u64,
    in_flight: DelayQueue<NetworkPacket>,
    sent: u64,
}

impl DelayNetwork {
    /// Creates a network with the given link latency (at least one cycle).
    pub fn new(latency: u64) -> Self {
        Self {
            now: 0,
            in_flight: DelayQueue::new(latency.max(1)),
            sent: 0,
        }
    }

    /// Sets the cycle that subsequent sends are stamped with.
    pub const fn set_now(&mut self, now: u64) {
        self.now = now;
    }

    /// Pops the oldest packet that has arrived by `now`.
    pub fn deliver(&mut self, now: u64) -> Option<NetworkPacket> {
        self.in_flight.pop_ready(now)
    }

    /// Packets still travelling.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Packets sent so far.
    pub const fn sent(&self) -> u64 {
        self.sent
    }
}

impl Network for DelayNetwork {
    fn send(&mut self, packet: NetworkPacket) {
        self.sent += 1;
        self.in_flight.push(self.now, packet);
    }
}
