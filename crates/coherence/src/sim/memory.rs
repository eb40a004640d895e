//! Memory controller endpoint and its line timing models.
//!
//! A model prices one line access. `SimpleController` charges every line the
//! same; `DramController` keeps one open row per controller, where a row is
//! the page the address map interleaves on, so consecutive lines of a page hit
//! the row buffer. `MemoryNode` answers L2 reads, absorbs writebacks and
//! returns credits.

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;
use tracing::trace;

use crate::common::{CoherenceError, NodeId};
use crate::config::{MemoryConfig, MemoryControllerKind, MessageTags};
use crate::message::{MemOp, MemoryMessage, NetworkPacket, Payload};
use crate::node::{FlowControlLink, Network};

/// Cost of one line access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineTiming {
    /// Cycles until the line is available.
    pub latency: u64,
    /// Whether the line's row was already open.
    pub row_hit: bool,
}

/// Timing model of a memory controller.
pub trait MemoryController: Send + Sync {
    /// Prices an access to `line`. Reads and writebacks both go through here,
    /// so a writeback leaves its row open for later reads.
    fn access(&mut self, line: u64) -> LineTiming;
}

/// Same latency for every line.
#[derive(Clone, Copy, Debug)]
pub struct SimpleController {
    latency: u64,
}

impl SimpleController {
    pub const fn new(latency: u64) -> Self {
        Self { latency }
    }
}

impl MemoryController for SimpleController {
    fn access(&mut self, _line: u64) -> LineTiming {
        LineTiming {
            latency: self.latency,
            row_hit: false,
        }
    }
}

/// DRAM command latencies in cycles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DramTiming {
    /// Column access.
    pub cas: u64,
    /// Row activation.
    pub ras: u64,
    /// Precharge of the open row.
    pub pre: u64,
}

impl From<&MemoryConfig> for DramTiming {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            cas: config.t_cas,
            ras: config.t_ras,
            pre: config.t_pre,
        }
    }
}

/// One bank with a single open row; a row spans one interleaving page.
#[derive(Clone, Copy, Debug)]
pub struct DramController {
    timing: DramTiming,
    page_offset_bits: u32,
    open_row: Option<u64>,
}

impl DramController {
    /// Creates a controller whose rows are `1 << page_offset_bits` bytes.
    pub const fn new(timing: DramTiming, page_offset_bits: u32) -> Self {
        Self {
            timing,
            page_offset_bits,
            open_row: None,
        }
    }

    /// Row currently held in the row buffer.
    pub const fn open_row(&self) -> Option<u64> {
        self.open_row
    }
}

impl MemoryController for DramController {
    fn access(&mut self, line: u64) -> LineTiming {
        let row = line.checked_shr(self.page_offset_bits).unwrap_or(0);
        let DramTiming { cas, ras, pre } = self.timing;
        let (latency, row_hit) = match self.open_row.replace(row) {
            Some(open) if open == row => (cas, true),
            Some(_) => (pre + ras + cas, false),
            None => (ras + cas, false),
        };
        LineTiming { latency, row_hit }
    }
}

/// Builds the controller selected by `config`, with DRAM rows as wide as the
/// pages lines are interleaved on.
pub fn build_controller(config: &MemoryConfig, page_offset_bits: u32) -> Box<dyn MemoryController> {
    match config.controller {
        MemoryControllerKind::Simple => Box::new(SimpleController::new(config.latency)),
        MemoryControllerKind::Dram => {
            Box::new(DramController::new(DramTiming::from(config), page_offset_bits))
        }
    }
}

/// Counters of one memory node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    /// Line reads served.
    pub reads: u64,
    /// Dirty lines written back.
    pub writes: u64,
    /// Sum of access latencies of reads.
    pub read_latency: u64,
    /// Accesses, reads or writes, that found their row open.
    pub row_hits: u64,
}

/// Memory controller attached to the interconnect.
///
/// Replies leave in request order: a fast access never overtakes a slower one
/// issued before it.
pub struct MemoryNode {
    id: NodeId,
    tags: MessageTags,
    controller: Box<dyn MemoryController>,
    link: FlowControlLink,
    inbound: VecDeque<NetworkPacket>,
    pending: VecDeque<(u64, NetworkPacket)>,
    cycle: u64,
    stats: MemoryStats,
}

impl fmt::Debug for MemoryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryNode")
            .field("id", &self.id)
            .field("cycle", &self.cycle)
            .field("pending", &self.pending.len())
            .field("credits", &self.link.credits())
            .finish_non_exhaustive()
    }
}

impl MemoryNode {
    /// Creates a memory node.
    ///
    /// # Arguments
    ///
    /// * `id` - Node id.
    /// * `controller` - Latency model.
    /// * `tags` - Message-type tags of the run.
    /// * `credits` - Credits on the reply link.
    pub fn new(
        id: NodeId,
        controller: Box<dyn MemoryController>,
        tags: MessageTags,
        credits: u32,
    ) -> Self {
        Self {
            id,
            tags,
            controller,
            link: FlowControlLink::new(id, credits),
            inbound: VecDeque::new(),
            pending: VecDeque::new(),
            cycle: 0,
            stats: MemoryStats::default(),
        }
    }

    /// Queues a packet for the next tick.
    pub fn handle_message(&mut self, packet: NetworkPacket) {
        self.inbound.push_back(packet);
    }

    /// Advances one cycle.
    pub fn tick(&mut self, net: &mut dyn Network) -> Result<(), CoherenceError> {
        self.cycle += 1;
        while let Some(packet) = self.inbound.pop_front() {
            let tag = packet.tag;
            match packet.payload {
                Payload::Credit if tag == self.tags.credit => {
                    let _ = self.link.credit_arrived(net)?;
                }
                Payload::Memory(msg) if tag == self.tags.memory => {
                    self.link.send_credit_to_peer(packet.src, self.tags.credit, net);
                    self.access(msg)?;
                }
                payload if tag == self.tags.credit
                    || tag == self.tags.coherence
                    || tag == self.tags.memory =>
                {
                    return Err(CoherenceError::MismatchedPayload {
                        node: self.id,
                        tag,
                        payload: payload.label(),
                    });
                }
                _ => return Err(CoherenceError::UnknownTag { node: self.id, tag }),
            }
        }

        while let Some(&(ready, _)) = self.pending.front() {
            if ready > self.cycle {
                break;
            }
            if let Some((_, reply)) = self.pending.pop_front() {
                let _ = self.link.try_send(reply, net);
            }
        }
        Ok(())
    }

    fn access(&mut self, msg: MemoryMessage) -> Result<(), CoherenceError> {
        match msg.op {
            MemOp::Read => {
                let LineTiming { latency, row_hit } = self.controller.access(msg.addr);
                self.stats.row_hits += u64::from(row_hit);
                let last = self.pending.back().map_or(0, |&(ready, _)| ready);
                let ready = (self.cycle + latency).max(last);
                self.stats.reads += 1;
                self.stats.read_latency += latency;
                trace!(node = %self.id, addr = format_args!("{:#x}", msg.addr), ready, "memory read");
                let reply = NetworkPacket {
                    tag: self.tags.memory,
                    src: self.id,
                    dst: msg.src,
                    payload: Payload::Memory(MemoryMessage {
                        op: MemOp::Reply,
                        addr: msg.addr,
                        src: self.id,
                    }),
                };
                self.pending.push_back((ready, reply));
                Ok(())
            }
            MemOp::Write => {
                let timing = self.controller.access(msg.addr);
                self.stats.row_hits += u64::from(timing.row_hit);
                self.stats.writes += 1;
                trace!(node = %self.id, addr = format_args!("{:#x}", msg.addr), "memory write");
                Ok(())
            }
            MemOp::Reply => Err(CoherenceError::MismatchedPayload {
                node: self.id,
                tag: self.tags.memory,
                payload: "memory reply",
            }),
        }
    }

    /// Node id.
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Counters.
    pub const fn stats(&self) -> &MemoryStats {
        &self.stats
    }

    /// Outbound link.
    pub const fn link(&self) -> &FlowControlLink {
        &self.link
    }

    /// Whether nothing is queued, pending or waiting for credit.
    pub fn is_idle(&self) -> bool {
        self.inbound.is_empty() && self.pending.is_empty() && self.link.buffered() == 0
    }
}
