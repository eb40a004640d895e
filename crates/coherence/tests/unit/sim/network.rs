//! Delay Network Unit Tests.

use cohsim_core::message::CohOp;
use cohsim_core::node::Network;
use cohsim_core::sim::DelayNetwork;

use crate::common::harness::{coh, CORE0, L2};

/// Packets arrive after the link latency, in send order.
#[test]
fn delivers_after_latency() {
    let mut net = DelayNetwork::new(2);
    net.set_now(5);
    net.send(coh(CORE0, L2, CohOp::IToS, 0x00));
    net.send(coh(CORE0, L2, CohOp::IToS, 0x20));
    assert_eq!(net.in_flight(), 2);

    assert!(net.deliver(6).is_none());
    let first = net.deliver(7).and_then(|p| p.coherence().map(|m| m.addr));
    let second = net.deliver(7).and_then(|p| p.coherence().map(|m| m.addr));
    assert_eq!((first, second), (Some(0x00), Some(0x20)));
    assert_eq!(net.sent(), 2);
    assert_eq!(net.in_flight(), 0);
}

/// A zero latency is raised to one cycle.
#[test]
fn minimum_latency() {
    let mut net = DelayNetwork::new(0);
    net.set_now(1);
    net.send(coh(CORE0, L2, CohOp::IToS, 0));
    assert!(net.deliver(1).is_none());
    assert!(net.deliver(2).is_some());
}
