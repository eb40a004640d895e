//! Memory Node Unit Tests.
//!
//! Verifies the latency models and the endpoint: reads are answered after
//! their latency in request order, writes are absorbed, and every consumed
//! packet returns a credit.

use cohsim_core::common::CoherenceError;
use cohsim_core::config::{MemoryConfig, MemoryControllerKind};
use cohsim_core::message::{MemOp, MemoryMessage, NetworkPacket, Payload};
use cohsim_core::sim::memory::build_controller;
use cohsim_core::sim::{
    DramController, DramTiming, LineTiming, MemoryController, MemoryNode, SimpleController,
};

use crate::common::harness::{coh, credit, credits_to, memory_sent, tags, L2, MEM};
use cohsim_core::message::CohOp;

fn request(op: MemOp, addr: u64) -> NetworkPacket {
    NetworkPacket {
        tag: tags().memory,
        src: L2,
        dst: MEM,
        payload: Payload::Memory(MemoryMessage { op, addr, src: L2 }),
    }
}

fn node(controller: Box<dyn MemoryController>) -> MemoryNode {
    MemoryNode::new(MEM, controller, tags(), 8)
}

// ══════════════════════════════════════════════════════════
// 1. Latency Models
// ══════════════════════════════════════════════════════════

/// The simple controller has one latency for every line and no row buffer.
#[test]
fn simple_latency() {
    let mut c = SimpleController::new(7);
    assert_eq!(c.access(0), LineTiming { latency: 7, row_hit: false });
    assert_eq!(c.access(0), LineTiming { latency: 7, row_hit: false });
    assert_eq!(c.access(0xffe0).latency, 7);
}

const TIMING: DramTiming = DramTiming { cas: 10, ras: 20, pre: 30 };

/// Lines of one page share a row; a line of another page precharges it.
#[test]
fn dram_rows_follow_pages() {
    let mut c = DramController::new(TIMING, 12);
    assert_eq!(c.access(0x0000), LineTiming { latency: 30, row_hit: false }, "Closed row: RAS + CAS");
    assert_eq!(c.access(0x0fe0), LineTiming { latency: 10, row_hit: true }, "Same page: CAS");
    assert_eq!(c.access(0x1000).latency, 60, "Next page: PRE + RAS + CAS");
    assert_eq!(c.open_row(), Some(1));
}

/// Narrower pages make narrower rows.
#[test]
fn dram_row_width_from_page_bits() {
    let mut c = DramController::new(TIMING, 6);
    let _ = c.access(0x00);
    assert!(c.access(0x20).row_hit, "Two 32-byte lines per 64-byte row");
    assert!(!c.access(0x40).row_hit);
}

/// The configured kind selects the model; DRAM rows take the page width.
#[test]
fn build_from_config() {
    let mut simple = build_controller(
        &MemoryConfig {
            controller: MemoryControllerKind::Simple,
            latency: 5,
            ..MemoryConfig::default()
        },
        12,
    );
    assert_eq!(simple.access(0).latency, 5);

    let mut dram = build_controller(
        &MemoryConfig {
            controller: MemoryControllerKind::Dram,
            t_cas: 1,
            t_ras: 2,
            t_pre: 3,
            ..MemoryConfig::default()
        },
        8,
    );
    assert_eq!(dram.access(0x000).latency, 3);
    assert_eq!(dram.access(0x0e0).latency, 1);
    assert_eq!(dram.access(0x100).latency, 6);
}

// ══════════════════════════════════════════════════════════
// 2. Endpoint
// ══════════════════════════════════════════════════════════

/// A read is answered after its latency, and the request's credit is returned at once.
#[test]
fn read_reply_after_latency() {
    let mut mem = node(Box::new(SimpleController::new(3)));
    let mut net = Vec::new();
    mem.handle_message(request(MemOp::Read, 0x40));
    mem.tick(&mut net).unwrap();
    assert_eq!(credits_to(&net, L2), 1);
    assert!(memory_sent(&net).is_empty());

    mem.tick(&mut net).unwrap();
    mem.tick(&mut net).unwrap();
    assert!(memory_sent(&net).is_empty());
    mem.tick(&mut net).unwrap();
    assert_eq!(memory_sent(&net), vec![(L2, MemOp::Reply, 0x40)]);
    assert_eq!(mem.stats().reads, 1);
    assert_eq!(mem.stats().read_latency, 3);
    assert!(mem.is_idle());
}

/// A fast read never overtakes a slow one issued before it.
#[test]
fn replies_in_order() {
    let mut mem = node(Box::new(DramController::new(DramTiming { cas: 1, ras: 10, pre: 10 }, 12)));
    let mut net = Vec::new();
    mem.handle_message(request(MemOp::Read, 0x0000));
    mem.handle_message(request(MemOp::Read, 0x0020));
    for _ in 0..20 {
        mem.tick(&mut net).unwrap();
    }
    let addrs: Vec<u64> = memory_sent(&net).iter().map(|&(_, _, a)| a).collect();
    assert_eq!(addrs, vec![0x0000, 0x0020]);
}

/// A writeback opens its row, so a read of the same page that follows hits it.
#[test]
fn writeback_opens_row() {
    let mut mem = node(Box::new(DramController::new(DramTiming { cas: 2, ras: 5, pre: 5 }, 12)));
    let mut net = Vec::new();
    mem.handle_message(request(MemOp::Write, 0x2000));
    mem.handle_message(request(MemOp::Read, 0x2040));
    for _ in 0..4 {
        mem.tick(&mut net).unwrap();
    }
    assert_eq!(memory_sent(&net), vec![(L2, MemOp::Reply, 0x2040)]);
    assert_eq!(mem.stats().row_hits, 1);
    assert_eq!(mem.stats().read_latency, 2);
}

/// Writes are absorbed without a reply.
#[test]
fn writes_absorbed() {
    let mut mem = node(Box::new(SimpleController::new(1)));
    let mut net = Vec::new();
    mem.handle_message(request(MemOp::Write, 0x80));
    mem.tick(&mut net).unwrap();
    mem.tick(&mut net).unwrap();
    assert!(memory_sent(&net).is_empty());
    assert_eq!(mem.stats().writes, 1);
    assert_eq!(credits_to(&net, L2), 1);
}

/// Replies wait for credit like any other packet.
#[test]
fn replies_need_credit() {
    let mut mem = MemoryNode::new(MEM, Box::new(SimpleController::new(1)), tags(), 1);
    let mut net = Vec::new();
    mem.handle_message(request(MemOp::Read, 0x00));
    mem.handle_message(request(MemOp::Read, 0x20));
    mem.tick(&mut net).unwrap();
    mem.tick(&mut net).unwrap();
    assert_eq!(memory_sent(&net).len(), 1);
    assert!(!mem.is_idle());

    mem.handle_message(credit(L2, MEM));
    mem.tick(&mut net).unwrap();
    assert_eq!(memory_sent(&net).len(), 2);
}

/// Coherence traffic and stray replies are rejected.
#[test]
fn rejects_foreign_payloads() {
    let mut mem = node(Box::new(SimpleController::new(1)));
    let mut net = Vec::new();
    mem.handle_message(coh(L2, MEM, CohOp::IToS, 0));
    assert!(matches!(
        mem.tick(&mut net),
        Err(CoherenceError::MismatchedPayload { payload: "coherence", .. })
    ));

    let mut mem = node(Box::new(SimpleController::new(1)));
    mem.handle_message(request(MemOp::Reply, 0));
    assert!(matches!(
        mem.tick(&mut net),
        Err(CoherenceError::MismatchedPayload { .. })
    ));
}
