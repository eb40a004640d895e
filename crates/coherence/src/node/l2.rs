//! L2 cache node: the manager side of coherence.
//!
//! The L2 tracks, per line, which clients hold it and arbitrates their
//! requests. It also fetches lines from memory and writes dirty lines back.
//!
//! A request for a line whose manager controller is mid-transaction waits as
//! `PREV_PEND_STALL` until the line settles. Replies are never stalled; they
//! are what moves a transaction forward.
//!
//! A miss goes through up to three stages before it is installed:
//!
//! ```text
//!   AwaitingVictim ──eviction done──► AwaitingMemory ──mem reply──► AwaitingClients ──stable──► installed
//! ```

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, trace};

use super::{DelayQueue, FlowControlLink, Network, StallBuffer, StallEntry, StallReason, WakeEvent};
use crate::common::{CoherenceError, ConfigError, NodeId, Role};
use crate::config::{MessageTags, NodeConfig};
use crate::dest_map::DestMap;
use crate::message::{
    CoherenceMessage, MemOp, MemoryMessage, MessageKind, NetworkPacket, Payload,
};
use crate::protocol::{
    ManagerAction, ManagerController, ManagerEvent, ManagerProtocol, ManagerTransition,
    MesiManager,
};
use crate::stats::NodeStats;
use crate::storage::{BlockReservation, CacheStorage, LineEntry, LineHandle, Mshr};

/// Progress of an L2 miss.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillStage {
    /// The victim in the target way is still being evicted.
    AwaitingVictim,
    /// The memory read is outstanding.
    AwaitingMemory,
    /// Data arrived; the manager waits for the requester's acknowledgement.
    AwaitingClients,
}

/// Outstanding transaction of an L2 line.
#[derive(Debug)]
pub enum L2Transaction<S> {
    /// The line is not resident. Its entry lives here until the fill completes.
    Miss {
        /// Entry being filled.
        entry: LineEntry<ManagerController<S>>,
        /// Reserved way, or the victim whose way will be reused.
        slot: LineHandle,
        /// Client request that caused the miss.
        request: CoherenceMessage,
        /// Fill progress.
        stage: FillStage,
    },
    /// The line is resident and its controller is transient.
    Resident {
        /// Resident way.
        slot: LineHandle,
    },
}

/// Shared cache that manages coherence for the lines mapped to it.
pub struct L2Cache<P: ManagerProtocol = MesiManager> {
    id: NodeId,
    protocol: P,
    tags: MessageTags,
    storage: CacheStorage<ManagerController<P::State>>,
    mshr: Mshr<L2Transaction<P::State>>,
    stalls: StallBuffer<CoherenceMessage>,
    retries: VecDeque<StallEntry<CoherenceMessage>>,
    link: FlowControlLink,
    mc_map: Box<dyn DestMap>,
    outbound: DelayQueue<NetworkPacket>,
    inbound: VecDeque<NetworkPacket>,
    cycle: u64,
    stats: NodeStats,
}

impl<P: ManagerProtocol> fmt::Debug for L2Cache<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("L2Cache")
            .field("id", &self.id)
            .field("protocol", &self.protocol.name())
            .field("cycle", &self.cycle)
            .field("resident", &self.storage.occupancy())
            .field("mshr", &self.mshr.occupancy())
            .field("stalled", &self.stalls.len())
            .field("credits", &self.link.credits())
            .finish_non_exhaustive()
    }
}

impl L2Cache<MesiManager> {
    /// Creates a MESI L2.
    ///
    /// # Arguments
    ///
    /// * `id` - Node id of this cache.
    /// * `config` - Geometry, MSHR size and credits.
    /// * `tags` - Message-type tags of the run.
    /// * `mc_map` - Maps a line to its memory controller.
    pub fn new(
        id: NodeId,
        config: &NodeConfig,
        tags: MessageTags,
        mc_map: Box<dyn DestMap>,
    ) -> Result<Self, ConfigError> {
        Self::with_protocol(id, config, tags, mc_map, MesiManager)
    }
}

impl<P: ManagerProtocol> L2Cache<P> {
    /// Creates an L2 running the manager half of `protocol`.
    pub fn with_protocol(
        id: NodeId,
        config: &NodeConfig,
        tags: MessageTags,
        mc_map: Box<dyn DestMap>,
        protocol: P,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        tags.validate()?;
        Ok(Self {
            id,
            protocol,
            tags,
            storage: CacheStorage::new(&config.cache)?,
            mshr: Mshr::new(config.mshr_entries),
            stalls: StallBuffer::new(),
            retries: VecDeque::new(),
            link: FlowControlLink::new(id, config.downstream_credits),
            mc_map,
            outbound: DelayQueue::new(config.cache.lookup_time),
            inbound: VecDeque::new(),
            cycle: 0,
            stats: NodeStats::default(),
        })
    }

    /// Queues a packet from a client (coherence or credit) for the next tick.
    pub fn handle_peer_or_manager_message(&mut self, packet: NetworkPacket) {
        self.inbound.push_back(packet);
    }

    /// Queues a packet from a memory controller for the next tick.
    ///
    /// Memory and client packets share one arrival-ordered queue.
    pub fn handle_memory_reply(&mut self, packet: NetworkPacket) {
        self.inbound.push_back(packet);
    }

    /// Advances one cycle.
    pub fn tick(&mut self, net: &mut dyn Network) -> Result<(), CoherenceError> {
        self.cycle += 1;
        self.stats
            .sample(self.storage.occupancy(), self.mshr.occupancy());

        while let Some(packet) = self.inbound.pop_front() {
            self.dispatch(packet, net)?;
            self.drain_retries()?;
        }

        while let Some(packet) = self.outbound.pop_ready(self.cycle) {
            let _ = self.link.try_send(packet, net);
        }
        Ok(())
    }

    fn dispatch(&mut self, packet: NetworkPacket, net: &mut dyn Network) -> Result<(), CoherenceError> {
        let tag = packet.tag;
        let src = packet.src;
        match packet.payload {
            Payload::Credit if tag == self.tags.credit => {
                self.stats.credits_received += 1;
                let _ = self.link.credit_arrived(net)?;
                Ok(())
            }
            Payload::Coherence(msg) if tag == self.tags.coherence => {
                self.return_credit(src, net);
                match msg.kind {
                    MessageKind::Request => self.process_client_request(msg, true),
                    MessageKind::Reply => self.process_client_reply(&msg),
                }
            }
            Payload::Memory(mem) if tag == self.tags.memory && mem.op == MemOp::Reply => {
                self.return_credit(src, net);
                self.process_mem_reply(&mem)
            }
            payload if tag == self.tags.credit || tag == self.tags.coherence || tag == self.tags.memory => {
                Err(CoherenceError::MismatchedPayload {
                    node: self.id,
                    tag,
                    payload: payload.label(),
                })
            }
            _ => Err(CoherenceError::UnknownTag { node: self.id, tag }),
        }
    }

    fn return_credit(&mut self, peer: NodeId, net: &mut dyn Network) {
        self.stats.credits_sent += 1;
        self.link.send_credit_to_peer(peer, self.tags.credit, net);
    }

    fn drain_retries(&mut self) -> Result<(), CoherenceError> {
        while let Some(parked) = self.retries.pop_front() {
            trace!(node = %self.id, line = format_args!("{:#x}", parked.line), reason = %parked.reason,
                waited = self.cycle - parked.enqueued_at, "retrying");
            self.process_client_request(parked.item, false)?;
        }
        Ok(())
    }

    fn wake(&mut self, event: WakeEvent) {
        let woken = self.stalls.wake(event);
        if !woken.is_empty() {
            debug!(node = %self.id, ?event, count = woken.len(), "woke stalled requests");
            self.retries.extend(woken);
        }
    }

    fn stall(&mut self, msg: CoherenceMessage, line: u64, reason: StallReason, watch: u64) {
        debug!(node = %self.id, line = format_args!("{line:#x}"), op = %msg.op, src = %msg.src, %reason, "stall");
        self.stats.record_stall(reason);
        self.stalls.stall(msg, line, reason, watch, self.cycle);
        self.stats.stall_buffer_max = self.stalls.max_depth() as u64;
    }

    fn step(
        &self,
        line: u64,
        controller: &ManagerController<P::State>,
        event: ManagerEvent,
    ) -> Result<ManagerTransition<P::State>, CoherenceError> {
        let t = self
            .protocol
            .transition(controller, event)
            .map_err(|source| CoherenceError::ProtocolViolation {
                node: self.id,
                role: Role::Manager,
                line,
                source,
            })?;
        debug!(node = %self.id, line = format_args!("{line:#x}"), from = ?controller.state,
            to = ?t.next.state, ?event, "manager transition");
        Ok(t)
    }

    /// Sends the transition's messages.
    ///
    /// # Returns
    ///
    /// Whether a client handed back dirty data.
    fn perform(&mut self, line: u64, actions: &[ManagerAction]) -> bool {
        let mut dirty = false;
        for action in actions {
            match *action {
                ManagerAction::Send { op, dest, forward_to } => {
                    let mut msg = CoherenceMessage::new(op, line, self.id);
                    msg.forward_to = forward_to;
                    self.emit(dest, self.tags.coherence, Payload::Coherence(msg));
                }
                ManagerAction::Writeback => dirty = true,
                ManagerAction::Ignore => {
                    self.stats.stale_ignored += 1;
                    debug!(node = %self.id, line = format_args!("{line:#x}"), "stale message ignored");
                }
            }
        }
        dirty
    }

    fn emit(&mut self, dst: NodeId, tag: u32, payload: Payload) {
        self.stats.messages_sent += 1;
        let packet = NetworkPacket {
            tag,
            src: self.id,
            dst,
            payload,
        };
        self.outbound.push(self.cycle, packet);
    }

    fn memory(&mut self, op: MemOp, line: u64) {
        let dst = self.mc_map.lookup(line);
        let msg = MemoryMessage {
            op,
            addr: line,
            src: self.id,
        };
        self.emit(dst, self.tags.memory, Payload::Memory(msg));
    }

    fn process_client_request(&mut self, msg: CoherenceMessage, first: bool) -> Result<(), CoherenceError> {
        let line = self.storage.get_line_addr(msg.addr);
        if self.mshr.get_entry(line).is_some() || (first && self.stalls.has_match(line)) {
            self.stall(msg, line, StallReason::PrevPendStall, line);
            return Ok(());
        }
        match self.storage.lookup(line) {
            Some(h) => self.request_resident(msg, line, h),
            None => self.start_miss(msg, line),
        }
    }

    fn request_resident(&mut self, msg: CoherenceMessage, line: u64, h: LineHandle) -> Result<(), CoherenceError> {
        let Some(entry) = self.storage.entry(h) else {
            return Err(CoherenceError::LostReservation { node: self.id, line });
        };
        if entry.evicting {
            self.stall(msg, line, StallReason::TransStall, line);
            return Ok(());
        }
        let t = self.step(line, &entry.controller, ManagerEvent::Request { op: msg.op, src: msg.src })?;

        if !self.protocol.is_stable(t.next.state)
            && self.mshr.reserve(line, L2Transaction::Resident { slot: h }).is_err()
        {
            self.stall(msg, line, StallReason::MshrStall, line);
            return Ok(());
        }
        if !msg.op.is_eviction() {
            self.stats.hits += 1;
        }
        self.commit(h, &t);
        self.storage.touch(h);
        if self.protocol.is_stable(t.next.state) {
            self.wake(WakeEvent::TransactionDone(line));
        }
        Ok(())
    }

    /// Applies a transition to a resident line and performs its actions.
    fn commit(&mut self, h: LineHandle, t: &ManagerTransition<P::State>) {
        let Some(line) = self.storage.line_of(h) else {
            return;
        };
        let dirty = self.perform(line, &t.actions);
        if let Some(entry) = self.storage.entry_mut(h) {
            entry.controller = t.next.clone();
            entry.dirty |= dirty;
        }
    }

    fn start_miss(&mut self, msg: CoherenceMessage, line: u64) -> Result<(), CoherenceError> {
        if msg.op.is_eviction() {
            self.stats.dropped_invalidations += 1;
            debug!(node = %self.id, line = format_args!("{line:#x}"), op = %msg.op, src = %msg.src,
                "eviction notice for absent line dropped");
            self.wake(WakeEvent::TransactionDone(line));
            return Ok(());
        }
        if self.mshr.is_full() {
            self.stall(msg, line, StallReason::MshrStall, line);
            return Ok(());
        }
        let fresh = LineEntry {
            have_data: false,
            dirty: false,
            evicting: false,
            controller: self.protocol.initial(),
        };
        match self.storage.reserve_block_for(line) {
            BlockReservation::Free(slot) => {
                let txn = L2Transaction::Miss {
                    entry: fresh,
                    slot,
                    request: msg,
                    stage: FillStage::AwaitingMemory,
                };
                match self.mshr.reserve(line, txn) {
                    Ok(_) => {
                        self.stats.misses += 1;
                        self.memory(MemOp::Read, line);
                    }
                    Err(txn) => {
                        let _ = self.storage.release(slot);
                        if let L2Transaction::Miss { request, .. } = txn {
                            self.stall(request, line, StallReason::MshrStall, line);
                        }
                    }
                }
                Ok(())
            }
            BlockReservation::Victim(victim) => {
                let victim_line = self.storage.line_of(victim).unwrap_or(line);
                let busy = self
                    .storage
                    .entry(victim)
                    .is_none_or(|e| e.evicting || !self.protocol.is_stable(e.controller.state));
                if busy {
                    self.stall(msg, line, StallReason::LruBusyStall, victim_line);
                    return Ok(());
                }
                let txn = L2Transaction::Miss {
                    entry: fresh,
                    slot: victim,
                    request: msg,
                    stage: FillStage::AwaitingVictim,
                };
                match self.mshr.reserve(line, txn) {
                    Ok(_) => {
                        self.stats.misses += 1;
                        self.start_eviction(victim, victim_line)
                    }
                    Err(txn) => {
                        if let L2Transaction::Miss { request, .. } = txn {
                            self.stall(request, line, StallReason::MshrStall, line);
                        }
                        Ok(())
                    }
                }
            }
            BlockReservation::Busy { pending_line } => {
                self.stall(msg, line, StallReason::LruBusyStall, pending_line);
                Ok(())
            }
        }
    }

    fn start_eviction(&mut self, victim: LineHandle, victim_line: u64) -> Result<(), CoherenceError> {
        let Some(entry) = self.storage.entry_mut(victim) else {
            return Err(CoherenceError::LostReservation {
                node: self.id,
                line: victim_line,
            });
        };
        entry.evicting = true;
        let controller = entry.controller.clone();
        let t = self.step(victim_line, &controller, ManagerEvent::Evict)?;
        self.stats.evictions += 1;
        self.commit(victim, &t);
        if self.protocol.is_stable(t.next.state) {
            self.finish_eviction(victim, victim_line)?;
        }
        Ok(())
    }

    /// Writes back the victim if dirty, then hands its way to the waiting miss.
    fn finish_eviction(&mut self, victim: LineHandle, victim_line: u64) -> Result<(), CoherenceError> {
        debug!(node = %self.id, line = format_args!("{victim_line:#x}"), "eviction complete");
        let waiting = self.mshr.find(|txn| {
            matches!(txn, L2Transaction::Miss { slot, stage: FillStage::AwaitingVictim, .. } if *slot == victim)
        });
        let new_line = waiting.and_then(|mh| self.mshr.line_of(mh));

        let old = match new_line {
            Some(new_line) => {
                let Some((old, reserved)) = self.storage.replace(victim, new_line) else {
                    return Err(CoherenceError::LostReservation {
                        node: self.id,
                        line: new_line,
                    });
                };
                if let Some(L2Transaction::Miss { slot, stage, .. }) =
                    waiting.and_then(|mh| self.mshr.entry_mut(mh))
                {
                    *slot = reserved;
                    *stage = FillStage::AwaitingMemory;
                }
                Some(old)
            }
            None => self.storage.release(victim),
        };

        if old.is_some_and(|e| e.dirty) {
            self.stats.writebacks += 1;
            self.memory(MemOp::Write, victim_line);
        }
        if let Some(new_line) = new_line {
            self.memory(MemOp::Read, new_line);
        }
        self.wake(WakeEvent::EvictionDone(victim_line));
        Ok(())
    }

    fn process_mem_reply(&mut self, mem: &MemoryMessage) -> Result<(), CoherenceError> {
        let line = self.storage.get_line_addr(mem.addr);
        let unexpected = CoherenceError::UnexpectedMemoryReply { node: self.id, line };
        let Some(mh) = self.mshr.get_entry(line) else {
            return Err(unexpected);
        };
        let Some(L2Transaction::Miss {
            entry,
            request,
            stage: FillStage::AwaitingMemory,
            ..
        }) = self.mshr.entry(mh)
        else {
            return Err(unexpected);
        };
        let event = ManagerEvent::Request {
            op: request.op,
            src: request.src,
        };
        let t = self.step(line, &entry.controller, event)?;
        let dirty = self.perform(line, &t.actions);
        if let Some(L2Transaction::Miss { entry, stage, .. }) = self.mshr.entry_mut(mh) {
            entry.controller = t.next.clone();
            entry.have_data = true;
            entry.dirty |= dirty;
            *stage = FillStage::AwaitingClients;
        }
        if self.protocol.is_stable(t.next.state) {
            self.complete_fill(mh, line)?;
        }
        Ok(())
    }

    fn process_client_reply(&mut self, msg: &CoherenceMessage) -> Result<(), CoherenceError> {
        let line = self.storage.get_line_addr(msg.addr);
        let event = ManagerEvent::Reply {
            op: msg.op,
            src: msg.src,
        };
        let unexpected = CoherenceError::UnexpectedReply {
            node: self.id,
            op: msg.op,
            line,
        };

        if let Some(mh) = self.mshr.get_entry(line) {
            match self.mshr.entry(mh) {
                Some(L2Transaction::Miss {
                    entry,
                    stage: FillStage::AwaitingClients,
                    ..
                }) => {
                    let t = self.step(line, &entry.controller, event)?;
                    let dirty = self.perform(line, &t.actions);
                    if let Some(L2Transaction::Miss { entry, .. }) = self.mshr.entry_mut(mh) {
                        entry.controller = t.next.clone();
                        entry.dirty |= dirty;
                    }
                    if self.protocol.is_stable(t.next.state) {
                        self.complete_fill(mh, line)?;
                    }
                    return Ok(());
                }
                Some(&L2Transaction::Resident { slot }) => {
                    let Some(entry) = self.storage.entry(slot) else {
                        return Err(CoherenceError::LostReservation { node: self.id, line });
                    };
                    let t = self.step(line, &entry.controller, event)?;
                    self.commit(slot, &t);
                    if self.protocol.is_stable(t.next.state) {
                        let _ = self.mshr.release(mh);
                        debug!(node = %self.id, line = format_args!("{line:#x}"), "transaction complete");
                        self.wake(WakeEvent::MshrReleased);
                        self.wake(WakeEvent::TransactionDone(line));
                    }
                    return Ok(());
                }
                _ => return Err(unexpected),
            }
        }

        let Some(h) = self.storage.lookup(line) else {
            return Err(unexpected);
        };
        let Some(entry) = self.storage.entry(h) else {
            return Err(unexpected);
        };
        let evicting = entry.evicting;
        let t = self.step(line, &entry.controller, event)?;
        self.commit(h, &t);
        if evicting && self.protocol.is_stable(t.next.state) {
            self.finish_eviction(h, line)?;
        }
        Ok(())
    }

    fn complete_fill(&mut self, mh: LineHandle, line: u64) -> Result<(), CoherenceError> {
        let Some(L2Transaction::Miss { mut entry, slot, .. }) = self.mshr.release(mh) else {
            return Ok(());
        };
        entry.have_data = true;
        if self.storage.install(slot, entry).is_err() {
            return Err(CoherenceError::LostReservation { node: self.id, line });
        }
        debug!(node = %self.id, line = format_args!("{line:#x}"), "fill complete");
        self.wake(WakeEvent::MshrReleased);
        self.wake(WakeEvent::TransactionDone(line));
        Ok(())
    }

    /// Node id.
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Current cycle.
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Counters.
    pub const fn stats(&self) -> &NodeStats {
        &self.stats
    }

    /// Resident table.
    pub const fn storage(&self) -> &CacheStorage<ManagerController<P::State>> {
        &self.storage
    }

    /// Outstanding transactions.
    pub const fn mshr(&self) -> &Mshr<L2Transaction<P::State>> {
        &self.mshr
    }

    /// Parked requests.
    pub const fn stall_buffer(&self) -> &StallBuffer<CoherenceMessage> {
        &self.stalls
    }

    /// Outbound link.
    pub const fn link(&self) -> &FlowControlLink {
        &self.link
    }

    /// Manager controller of `addr`'s line, whether resident or in the MSHR.
    pub fn line(&self, addr: u64) -> Option<&ManagerController<P::State>> {
        let line = self.storage.get_line_addr(addr);
        if let Some(L2Transaction::Miss { entry, .. }) =
            self.mshr.get_entry(line).and_then(|mh| self.mshr.entry(mh))
        {
            return Some(&entry.controller);
        }
        self.storage
            .lookup(line)
            .and_then(|h| self.storage.entry(h))
            .map(|e| &e.controller)
    }

    /// Resident entry of `addr`'s line.
    pub fn entry(&self, addr: u64) -> Option<&LineEntry<ManagerController<P::State>>> {
        self.storage
            .lookup(addr)
            .and_then(|h| self.storage.entry(h))
    }

    /// Whether nothing is queued, parked, outstanding or waiting for credit.
    pub fn is_idle(&self) -> bool {
        self.inbound.is_empty()
            && self.retries.is_empty()
            && self.stalls.is_empty()
            && self.mshr.occupancy() == 0
            && self.outbound.is_empty()
            && self.link.buffered() == 0
    }
}
