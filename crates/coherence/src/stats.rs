//! Per-node statistics collection and reporting.
//!
//! This module tracks counters for one cache node. It provides:
//! 1. **Requests:** Processor reads and writes, hits and misses.
//! 2. **Stalls:** One counter per stall reason and the stall buffer high-water mark.
//! 3. **Occupancy:** Per-cycle samples of table and MSHR occupancy.
//! 4. **Traffic:** Messages sent, credits exchanged, evictions, writebacks and
//!    stale messages dropped or ignored.
//!
//! Counters are updated by the node as a side effect of processing and never
//! influence protocol decisions.

use serde::Serialize;

use crate::node::StallReason;

/// Counters for one cache node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    /// Cycles ticked.
    pub cycles: u64,
    /// Processor loads received (L1 only).
    pub processor_reads: u64,
    /// Processor stores received (L1 only).
    pub processor_writes: u64,
    /// L1: accesses completed from a line already in a sufficient state.
    /// L2: read or ownership requests for a resident line, whether answered
    /// at once or through a forward or invalidation; eviction notices are
    /// not counted.
    pub hits: u64,
    /// L1: accesses that started a coherence transaction.
    /// L2: requests that had to fetch the line from memory.
    pub misses: u64,

    /// `MSHR_STALL` occurrences.
    pub mshr_stalls: u64,
    /// `PREV_PEND_STALL` occurrences.
    pub prev_pend_stalls: u64,
    /// `LRU_BUSY_STALL` occurrences.
    pub lru_busy_stalls: u64,
    /// `TRANS_STALL` occurrences.
    pub trans_stalls: u64,
    /// Largest stall buffer depth observed.
    pub stall_buffer_max: u64,

    /// Sum over cycles of resident lines.
    pub table_occupancy: u64,
    /// Cycles with no resident line.
    pub table_empty_cycles: u64,
    /// Sum over cycles of outstanding MSHR entries.
    pub mshr_occupancy: u64,
    /// Cycles with no outstanding MSHR entry.
    pub mshr_empty_cycles: u64,

    /// Replacements started.
    pub evictions: u64,
    /// Dirty lines written to the next level.
    pub writebacks: u64,
    /// Stale messages explicitly ignored by the protocol.
    pub stale_ignored: u64,
    /// Eviction notices for lines no longer present, dropped.
    pub dropped_invalidations: u64,
    /// Coherence and memory messages produced.
    pub messages_sent: u64,
    /// Credits returned to peers.
    pub credits_sent: u64,
    /// Credits received from peers.
    pub credits_received: u64,
}

impl NodeStats {
    /// Counts one stall with `reason`.
    pub const fn record_stall(&mut self, reason: StallReason) {
        match reason {
            StallReason::MshrStall => self.mshr_stalls += 1,
            StallReason::PrevPendStall => self.prev_pend_stalls += 1,
            StallReason::LruBusyStall => self.lru_busy_stalls += 1,
            StallReason::TransStall => self.trans_stalls += 1,
        }
    }

    /// Records one cycle of occupancy.
    pub const fn sample(&mut self, table_lines: usize, mshr_entries: usize) {
        self.cycles += 1;
        self.table_occupancy += table_lines as u64;
        self.mshr_occupancy += mshr_entries as u64;
        if table_lines == 0 {
            self.table_empty_cycles += 1;
        }
        if mshr_entries == 0 {
            self.mshr_empty_cycles += 1;
        }
    }

    /// Total stalls of every reason.
    pub const fn total_stalls(&self) -> u64 {
        self.mshr_stalls + self.prev_pend_stalls + self.lru_busy_stalls + self.trans_stalls
    }

    /// Hits over hits plus misses, or zero before any request.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Average resident lines per cycle.
    pub fn avg_table_occupancy(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.table_occupancy as f64 / self.cycles as f64
        }
    }

    /// Average outstanding MSHR entries per cycle.
    pub fn avg_mshr_occupancy(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.mshr_occupancy as f64 / self.cycles as f64
        }
    }

    /// Prints the counters under a `name` banner.
    pub fn print(&self, name: &str) {
        println!("==========================================================");
        println!("{name}");
        println!("----------------------------------------------------------");
        println!("  cycles                 {}", self.cycles);
        println!("  proc.reads             {}", self.processor_reads);
        println!("  proc.writes            {}", self.processor_writes);
        println!("  hits                   {}", self.hits);
        println!("  misses                 {}", self.misses);
        println!("  hit_rate               {:.4}", self.hit_rate());
        println!("STALLS");
        println!("  mshr                   {}", self.mshr_stalls);
        println!("  prev_pend              {}", self.prev_pend_stalls);
        println!("  lru_busy               {}", self.lru_busy_stalls);
        println!("  trans                  {}", self.trans_stalls);
        println!("  buffer.max             {}", self.stall_buffer_max);
        println!("OCCUPANCY");
        println!("  table.avg              {:.2}", self.avg_table_occupancy());
        println!("  table.empty_cycles     {}", self.table_empty_cycles);
        println!("  mshr.avg               {:.2}", self.avg_mshr_occupancy());
        println!("  mshr.empty_cycles      {}", self.mshr_empty_cycles);
        println!("TRAFFIC");
        println!("  messages               {}", self.messages_sent);
        println!("  credits.sent           {}", self.credits_sent);
        println!("  credits.received       {}", self.credits_received);
        println!("  evictions              {}", self.evictions);
        println!("  writebacks             {}", self.writebacks);
        println!("  stale.ignored          {}", self.stale_ignored);
        println!("  stale.dropped          {}", self.dropped_invalidations);
    }
}
