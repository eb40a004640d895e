//! Trace-driven reference system.
//!
//! Builds one L1 per core, the L2 banks and the memory nodes from a `Config`,
//! wires them through a `DelayNetwork` and drives a `Trace` through them.
//!
//! Node ids are dense: L1s first (`0..cores`), then L2 banks, then memory
//! controllers. Lines are interleaved over L2 banks and memory controllers
//! by page.
//!
//! Each cycle proceeds in a fixed order:
//! 1. **Deliver:** Packets that have arrived are queued at their destination.
//! 2. **Issue:** Every idle core hands its next trace access to its L1.
//! 3. **Tick:** L1s, then L2s, then memory nodes.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{info, warn};

use super::memory::{build_controller, MemoryNode, MemoryStats};
use super::network::DelayNetwork;
use super::trace::{CoreRequest, Trace};
use super::SimError;
use crate::common::NodeId;
use crate::config::Config;
use crate::dest_map::PageBasedMap;
use crate::message::{NetworkPacket, Payload};
use crate::node::{L1Cache, L2Cache, ProcessorPort};
use crate::stats::NodeStats;

/// Per-core progress through its trace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CoreReport {
    /// Accesses completed.
    pub completed: u64,
    /// Sum of issue-to-response latencies.
    pub total_latency: u64,
}

impl CoreReport {
    /// Mean access latency, or zero if nothing completed.
    pub fn avg_latency(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.total_latency as f64 / self.completed as f64
        }
    }
}

/// Outcome of a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SystemReport {
    /// Cycles simulated.
    pub cycles: u64,
    /// Whether every access completed and the system went quiet.
    pub drained: bool,
    /// Per-core progress.
    pub cores: Vec<CoreReport>,
    /// Per-L1 counters.
    pub l1: Vec<NodeStats>,
    /// Per-L2 counters.
    pub l2: Vec<NodeStats>,
    /// Per-memory-node counters.
    pub memory: Vec<MemoryStats>,
    /// Packets put on the interconnect (credits included).
    pub packets: u64,
}

impl SystemReport {
    /// Prints every node's counters.
    pub fn print(&self) {
        println!("==========================================================");
        println!("SYSTEM");
        println!("----------------------------------------------------------");
        println!("  cycles                 {}", self.cycles);
        println!("  drained                {}", self.drained);
        println!("  packets                {}", self.packets);
        for (i, core) in self.cores.iter().enumerate() {
            println!(
                "  core{i:<3} completed       {}  avg.latency {:.2}",
                core.completed,
                core.avg_latency()
            );
        }
        for (i, stats) in self.l1.iter().enumerate() {
            stats.print(&format!("L1[{i}]"));
        }
        for (i, stats) in self.l2.iter().enumerate() {
            stats.print(&format!("L2[{i}]"));
        }
        for (i, mem) in self.memory.iter().enumerate() {
            println!("==========================================================");
            println!("MEM[{i}]");
            println!("----------------------------------------------------------");
            println!("  reads                  {}", mem.reads);
            println!("  writes                 {}", mem.writes);
            println!("  row.hits               {}", mem.row_hits);
        }
    }
}

#[derive(Debug, Default)]
struct Core {
    pending: VecDeque<CoreRequest>,
    outstanding: bool,
    report: CoreReport,
}

/// Collects L1 responses for the cycle being ticked.
#[derive(Debug, Default)]
struct Responses {
    cycle: u64,
    done: Vec<CoreRequest>,
}

impl ProcessorPort<CoreRequest> for Responses {
    fn respond(&mut self, _node: NodeId, request: CoreRequest) {
        self.done.push(request);
    }
}

/// A complete cache hierarchy driven by a trace.
#[derive(Debug)]
pub struct System {
    l1s: Vec<L1Cache<CoreRequest>>,
    l2s: Vec<L2Cache>,
    memories: Vec<MemoryNode>,
    net: DelayNetwork,
    cores: Vec<Core>,
    l2_base: usize,
    mem_base: usize,
    cycle: u64,
    max_cycles: u64,
}

impl System {
    /// Builds the hierarchy described by `config`.
    pub fn new(config: &Config) -> Result<Self, SimError> {
        config.validate()?;
        let topo = &config.topology;
        let l2_base = topo.cores;
        let mem_base = l2_base + topo.l2_nodes;
        let node = |i: usize| NodeId(i as u32);

        let l2_ids: Vec<NodeId> = (l2_base..mem_base).map(node).collect();
        let mem_ids: Vec<NodeId> = (mem_base..mem_base + topo.memory_controllers)
            .map(node)
            .collect();
        let l2_map = PageBasedMap::new(l2_ids.clone(), topo.page_offset_bits)?;
        let mc_map = PageBasedMap::new(mem_ids.clone(), topo.page_offset_bits)?;

        let l1s = (0..topo.cores)
            .map(|i| L1Cache::new(node(i), &config.l1, config.tags, Box::new(l2_map.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        let l2s = l2_ids
            .iter()
            .map(|&id| L2Cache::new(id, &config.l2, config.tags, Box::new(mc_map.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        let memories = mem_ids
            .iter()
            .map(|&id| {
                MemoryNode::new(
                    id,
                    build_controller(&config.memory, topo.page_offset_bits),
                    config.tags,
                    config.l2.downstream_credits,
                )
            })
            .collect();

        info!(
            cores = topo.cores,
            l2 = topo.l2_nodes,
            memory = topo.memory_controllers,
            "system built"
        );
        Ok(Self {
            l1s,
            l2s,
            memories,
            net: DelayNetwork::new(topo.link_latency),
            cores: (0..topo.cores).map(|_| Core::default()).collect(),
            l2_base,
            mem_base,
            cycle: 0,
            max_cycles: config.max_cycles,
        })
    }

    /// Queues every access of `trace` on its core.
    ///
    /// # Returns
    ///
    /// `SimError::UnknownCore` if the trace names a core the system lacks.
    pub fn load(&mut self, trace: &Trace) -> Result<(), SimError> {
        for entry in trace.entries() {
            let cores = self.cores.len();
            let Some(core) = self.cores.get_mut(entry.core) else {
                return Err(SimError::UnknownCore {
                    core: entry.core,
                    cores,
                });
            };
            core.pending.push_back(CoreRequest {
                core: entry.core,
                access: entry.access,
                addr: entry.addr,
                issued_at: 0,
            });
        }
        Ok(())
    }

    /// Runs until every queued access completes and the system is quiet, or
    /// until the cycle limit.
    pub fn run(&mut self) -> Result<SystemReport, SimError> {
        while !self.is_drained() {
            if self.cycle >= self.max_cycles {
                warn!(cycle = self.cycle, "cycle limit reached before the system drained");
                return Ok(self.report());
            }
            self.step()?;
        }
        info!(cycles = self.cycle, "system drained");
        Ok(self.report())
    }

    /// Simulates one cycle.
    pub fn step(&mut self) -> Result<(), SimError> {
        self.cycle += 1;
        self.net.set_now(self.cycle);

        while let Some(packet) = self.net.deliver(self.cycle) {
            self.route(packet)?;
        }

        for (i, core) in self.cores.iter_mut().enumerate() {
            if core.outstanding {
                continue;
            }
            if let Some(mut request) = core.pending.pop_front() {
                request.issued_at = self.cycle;
                core.outstanding = true;
                if let Some(l1) = self.l1s.get_mut(i) {
                    l1.handle_processor_request(request);
                }
            }
        }

        let mut responses = Responses {
            cycle: self.cycle,
            done: Vec::new(),
        };
        for l1 in &mut self.l1s {
            l1.tick(&mut self.net, &mut responses)?;
        }
        for done in responses.done {
            if let Some(core) = self.cores.get_mut(done.core) {
                core.outstanding = false;
                core.report.completed += 1;
                core.report.total_latency += responses.cycle - done.issued_at;
            }
        }

        for l2 in &mut self.l2s {
            l2.tick(&mut self.net)?;
        }
        for memory in &mut self.memories {
            memory.tick(&mut self.net)?;
        }
        Ok(())
    }

    fn route(&mut self, packet: NetworkPacket) -> Result<(), SimError> {
        let dst = packet.dst.index();
        if dst < self.l2_base {
            if let Some(l1) = self.l1s.get_mut(dst) {
                l1.handle_peer_or_manager_message(packet);
                return Ok(());
            }
        } else if dst < self.mem_base {
            if let Some(l2) = self.l2s.get_mut(dst - self.l2_base) {
                match packet.payload {
                    Payload::Memory(_) => l2.handle_memory_reply(packet),
                    _ => l2.handle_peer_or_manager_message(packet),
                }
                return Ok(());
            }
        } else if let Some(memory) = self.memories.get_mut(dst - self.mem_base) {
            memory.handle_message(packet);
            return Ok(());
        }
        Err(SimError::UnknownNode(packet.dst))
    }

    /// Whether every trace is consumed and no node or link holds work.
    pub fn is_drained(&self) -> bool {
        self.cores
            .iter()
            .all(|c| !c.outstanding && c.pending.is_empty())
            && self.net.in_flight() == 0
            && self.l1s.iter().all(L1Cache::is_idle)
            && self.l2s.iter().all(L2Cache::is_idle)
            && self.memories.iter().all(MemoryNode::is_idle)
    }

    /// Snapshot of every counter.
    pub fn report(&self) -> SystemReport {
        SystemReport {
            cycles: self.cycle,
            drained: self.is_drained(),
            cores: self.cores.iter().map(|c| c.report.clone()).collect(),
            l1: self.l1s.iter().map(|l1| l1.stats().clone()).collect(),
            l2: self.l2s.iter().map(|l2| l2.stats().clone()).collect(),
            memory: self.memories.iter().map(|m| m.stats().clone()).collect(),
            packets: self.net.sent(),
        }
    }

    /// Current cycle.
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }

    /// The L1 of each core.
    pub fn l1s(&self) -> &[L1Cache<CoreRequest>] {
        &self.l1s
    }

    /// The L2 banks.
    pub fn l2s(&self) -> &[L2Cache] {
        &self.l2s
    }

    /// The memory nodes.
    pub fn memories(&self) -> &[MemoryNode] {
        &self.memories
    }
}
