//! L1 cache node: the client side of coherence.
//!
//! The L1 receives processor requests and manager/peer coherence messages. It
//! performs the following:
//! 1. **Admission:** A request whose line already has a transaction (or older
//!    parked requests) waits as `PREV_PEND_STALL`; a hit on a line being
//!    replaced waits as `TRANS_STALL`.
//! 2. **Hits:** Served locally when the client table needs no message.
//! 3. **Misses:** An MSHR entry and a way are reserved. If the set is full the
//!    LRU line is evicted first (`LRU_BUSY_STALL` if it is mid-transition) and
//!    the request to the manager is only sent once the eviction completes.
//! 4. **Completion:** When the client controller reaches a stable state the
//!    entry moves from the MSHR into its reserved way, the processor gets its
//!    response and parked requests are woken.

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, trace};

use super::{
    DelayQueue, FlowControlLink, Network, ProcessorPort, StallBuffer, StallEntry, StallReason,
    WakeEvent,
};
use crate::common::{CoherenceError, ConfigError, NodeId, Role};
use crate::config::{MessageTags, NodeConfig};
use crate::dest_map::DestMap;
use crate::message::{CohOp, CoherenceMessage, NetworkPacket, Payload, ProcessorRequest};
use crate::protocol::{
    ClientAction, ClientEvent, ClientProtocol, ClientTransition, MesiClient, ProcessorOp,
};
use crate::stats::NodeStats;
use crate::storage::{BlockReservation, CacheStorage, LineEntry, LineHandle, Mshr};

/// Outstanding transaction of an L1 line.
#[derive(Debug)]
pub enum L1Transaction<R, S> {
    /// The line is not resident. Its entry lives here until the fill completes.
    Miss {
        /// Entry being filled.
        entry: LineEntry<S>,
        /// Reserved way, or the victim whose way will be reused.
        slot: LineHandle,
        /// Request that caused the miss.
        request: R,
        /// The victim in `slot` is still being evicted.
        awaiting_victim: bool,
    },
    /// The line is resident and waits for more permission.
    Upgrade {
        /// Resident way.
        slot: LineHandle,
        /// Request that caused the upgrade.
        request: R,
    },
}

impl<R, S> L1Transaction<R, S> {
    fn into_request(self) -> R {
        match self {
            Self::Miss { request, .. } | Self::Upgrade { request, .. } => request,
        }
    }
}

#[derive(Debug)]
enum Inbound<R> {
    Processor(R),
    Packet(NetworkPacket),
}

/// Private cache attached to one processor.
pub struct L1Cache<R, P: ClientProtocol = MesiClient> {
    id: NodeId,
    protocol: P,
    tags: MessageTags,
    storage: CacheStorage<P::State>,
    mshr: Mshr<L1Transaction<R, P::State>>,
    stalls: StallBuffer<R>,
    retries: VecDeque<StallEntry<R>>,
    link: FlowControlLink,
    l2_map: Box<dyn DestMap>,
    outbound: DelayQueue<NetworkPacket>,
    responses: DelayQueue<R>,
    inbound: VecDeque<Inbound<R>>,
    cycle: u64,
    stats: NodeStats,
}

impl<R, P: ClientProtocol> fmt::Debug for L1Cache<R, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("L1Cache")
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

impl<R: ProcessorRequest> L1Cache<R, MesiClient> {
    /// Creates a MESI L1.
    ///
    /// # Arguments
    ///
    /// * `id` - Node id of this cache.
    /// * `config` - Geometry, MSHR size and credits.
    /// * `tags` - Message-type tags of the run.
    /// * `l2_map` - Maps a line to its manager.
    pub fn new(
        id: NodeId,
        config: &NodeConfig,
        tags: MessageTags,
        l2_map: Box<dyn DestMap>,
    ) -> Result<Self, ConfigError> {
        Self::with_protocol(id, config, tags, l2_map, MesiClient)
    }
}

impl<R: ProcessorRequest, P: ClientProtocol> L1Cache<R, P> {
    /// Creates an L1 running the client half of `protocol`.
    pub fn with_protocol(
        id: NodeId,
        config: &NodeConfig,
        tags: MessageTags,
        l2_map: Box<dyn DestMap>,
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
            l2_map,
            outbound: DelayQueue::new(config.cache.lookup_time),
            responses: DelayQueue::new(config.cache.hit_time),
            inbound: VecDeque::new(),
            cycle: 0,
            stats: NodeStats::default(),
        })
    }

    /// Queues a processor request for the next tick.
    pub fn handle_processor_request(&mut self, request: R) {
        self.inbound.push_back(Inbound::Processor(request));
    }

    /// Queues a packet from the interconnect (coherence or credit) for the next tick.
    pub fn handle_peer_or_manager_message(&mut self, packet: NetworkPacket) {
        self.inbound.push_back(Inbound::Packet(packet));
    }

    /// Advances one cycle.
    ///
    /// Processes every queued event in arrival order, then moves packets whose
    /// lookup latency has elapsed onto the link and delivers ready responses.
    pub fn tick(
        &mut self,
        net: &mut dyn Network,
        cpu: &mut dyn ProcessorPort<R>,
    ) -> Result<(), CoherenceError> {
        self.cycle += 1;
        self.stats
            .sample(self.storage.occupancy(), self.mshr.occupancy());

        while let Some(event) = self.inbound.pop_front() {
            match event {
                Inbound::Processor(request) => self.process_processor_request(request, true)?,
                Inbound::Packet(packet) => self.dispatch(packet, net)?,
            }
            self.drain_retries()?;
        }

        while let Some(packet) = self.outbound.pop_ready(self.cycle) {
            let _ = self.link.try_send(packet, net);
        }
        while let Some(request) = self.responses.pop_ready(self.cycle) {
            cpu.respond(self.id, request);
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
                self.stats.credits_sent += 1;
                self.link.send_credit_to_peer(src, self.tags.credit, net);
                self.process_coherence(&msg)
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

    fn drain_retries(&mut self) -> Result<(), CoherenceError> {
        while let Some(parked) = self.retries.pop_front() {
            trace!(node = %self.id, line = format_args!("{:#x}", parked.line), reason = %parked.reason,
                waited = self.cycle - parked.enqueued_at, "retrying");
            self.process_processor_request(parked.item, false)?;
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

    fn stall(&mut self, request: R, line: u64, reason: StallReason, watch: u64) {
        debug!(node = %self.id, line = format_args!("{line:#x}"), %reason, "stall");
        self.stats.record_stall(reason);
        self.stalls.stall(request, line, reason, watch, self.cycle);
        self.stats.stall_buffer_max = self.stalls.max_depth() as u64;
    }

    fn step(
        &self,
        line: u64,
        state: P::State,
        event: ClientEvent,
    ) -> Result<ClientTransition<P::State>, CoherenceError> {
        let t = self
            .protocol
            .transition(state, event)
            .map_err(|source| CoherenceError::ProtocolViolation {
                node: self.id,
                role: Role::Client,
                line,
                source,
            })?;
        debug!(node = %self.id, line = format_args!("{line:#x}"), from = ?state, to = ?t.next, ?event, "client transition");
        Ok(t)
    }

    fn perform(&mut self, line: u64, actions: &[ClientAction]) {
        for action in actions {
            let (op, dst) = match *action {
                ClientAction::ToManager(op) => (op, self.l2_map.lookup(line)),
                ClientAction::ToPeer { op, dest } => (op, dest),
            };
            self.send(op, line, dst);
        }
    }

    fn send(&mut self, op: CohOp, line: u64, dst: NodeId) {
        self.stats.messages_sent += 1;
        let packet = NetworkPacket {
            tag: self.tags.coherence,
            src: self.id,
            dst,
            payload: Payload::Coherence(CoherenceMessage::new(op, line, self.id)),
        };
        self.outbound.push(self.cycle, packet);
    }

    fn respond(&mut self, request: R) {
        self.responses.push(self.cycle, request);
    }

    fn process_processor_request(&mut self, request: R, first: bool) -> Result<(), CoherenceError> {
        let line = self.storage.get_line_addr(request.address());
        let op = if request.is_read() {
            ProcessorOp::Load
        } else {
            ProcessorOp::Store
        };
        if first {
            match op {
                ProcessorOp::Load => self.stats.processor_reads += 1,
                _ => self.stats.processor_writes += 1,
            }
        }

        if self.mshr.get_entry(line).is_some() || (first && self.stalls.has_match(line)) {
            self.stall(request, line, StallReason::PrevPendStall, line);
            return Ok(());
        }
        match self.storage.lookup(line) {
            Some(h) => self.access_resident(request, line, h, op),
            None => self.start_miss(request, line),
        }
    }

    fn access_resident(
        &mut self,
        request: R,
        line: u64,
        h: LineHandle,
        op: ProcessorOp,
    ) -> Result<(), CoherenceError> {
        let Some(entry) = self.storage.entry(h) else {
            return Err(CoherenceError::LostReservation { node: self.id, line });
        };
        if entry.evicting {
            self.stall(request, line, StallReason::TransStall, line);
            return Ok(());
        }
        let t = self.step(line, entry.controller, ClientEvent::Processor(op))?;

        if self.protocol.is_stable(t.next) {
            self.stats.hits += 1;
            self.commit_resident(h, t.next);
            self.storage.touch(h);
            self.respond(request);
            self.wake(WakeEvent::TransactionDone(line));
            return Ok(());
        }

        match self.mshr.reserve(line, L1Transaction::Upgrade { slot: h, request }) {
            Ok(_) => {
                self.stats.misses += 1;
                self.commit_resident(h, t.next);
                self.storage.touch(h);
                self.perform(line, &t.actions);
            }
            Err(txn) => self.stall(txn.into_request(), line, StallReason::MshrStall, line),
        }
        Ok(())
    }

    fn commit_resident(&mut self, h: LineHandle, next: P::State) {
        let dirty = self.protocol.is_dirty(next);
        let invalid = self.protocol.is_invalid(next);
        if let Some(entry) = self.storage.entry_mut(h) {
            entry.controller = next;
            entry.dirty = dirty;
            if invalid {
                entry.have_data = false;
            }
        }
    }

    fn start_miss(&mut self, request: R, line: u64) -> Result<(), CoherenceError> {
        if self.mshr.is_full() {
            self.stall(request, line, StallReason::MshrStall, line);
            return Ok(());
        }
        let fresh = LineEntry {
            have_data: false,
            dirty: false,
            evicting: false,
            controller: self.protocol.initial_state(),
        };
        match self.storage.reserve_block_for(line) {
            BlockReservation::Free(slot) => {
                let txn = L1Transaction::Miss {
                    entry: fresh,
                    slot,
                    request,
                    awaiting_victim: false,
                };
                match self.mshr.reserve(line, txn) {
                    Ok(mh) => {
                        self.stats.misses += 1;
                        self.issue_fill(mh, line)
                    }
                    Err(txn) => {
                        let _ = self.storage.release(slot);
                        self.stall(txn.into_request(), line, StallReason::MshrStall, line);
                        Ok(())
                    }
                }
            }
            BlockReservation::Victim(victim) => {
                let victim_line = self.storage.line_of(victim).unwrap_or(line);
                let busy = self
                    .storage
                    .entry(victim)
                    .is_none_or(|e| e.evicting || !self.protocol.is_stable(e.controller));
                if busy {
                    self.stall(request, line, StallReason::LruBusyStall, victim_line);
                    return Ok(());
                }
                let txn = L1Transaction::Miss {
                    entry: fresh,
                    slot: victim,
                    request,
                    awaiting_victim: true,
                };
                match self.mshr.reserve(line, txn) {
                    Ok(_) => {
                        self.stats.misses += 1;
                        self.start_eviction(victim, victim_line)
                    }
                    Err(txn) => {
                        self.stall(txn.into_request(), line, StallReason::MshrStall, line);
                        Ok(())
                    }
                }
            }
            BlockReservation::Busy { pending_line } => {
                self.stall(request, line, StallReason::LruBusyStall, pending_line);
                Ok(())
            }
        }
    }

    /// Sends the request for a missing line once its way is available.
    fn issue_fill(&mut self, mh: LineHandle, line: u64) -> Result<(), CoherenceError> {
        let Some(L1Transaction::Miss { entry, request, .. }) = self.mshr.entry(mh) else {
            return Ok(());
        };
        let op = if request.is_read() {
            ProcessorOp::Load
        } else {
            ProcessorOp::Store
        };
        let t = self.step(line, entry.controller, ClientEvent::Processor(op))?;
        if let Some(L1Transaction::Miss { entry, .. }) = self.mshr.entry_mut(mh) {
            entry.controller = t.next;
        }
        self.perform(line, &t.actions);
        Ok(())
    }

    fn start_eviction(&mut self, victim: LineHandle, victim_line: u64) -> Result<(), CoherenceError> {
        let Some(entry) = self.storage.entry_mut(victim) else {
            return Err(CoherenceError::LostReservation {
                node: self.id,
                line: victim_line,
            });
        };
        entry.evicting = true;
        let state = entry.controller;
        let dirty = entry.dirty;
        let t = self.step(victim_line, state, ClientEvent::Processor(ProcessorOp::Evict))?;
        self.stats.evictions += 1;
        if dirty {
            self.stats.writebacks += 1;
        }
        self.commit_resident(victim, t.next);
        self.perform(victim_line, &t.actions);
        if self.protocol.is_invalid(t.next) {
            self.finish_eviction(victim, victim_line)?;
        }
        Ok(())
    }

    /// Hands the victim's way to the miss waiting for it and sends that miss's request.
    fn finish_eviction(&mut self, victim: LineHandle, victim_line: u64) -> Result<(), CoherenceError> {
        debug!(node = %self.id, line = format_args!("{victim_line:#x}"), "eviction complete");
        let waiting = self.mshr.find(|txn| {
            matches!(txn, L1Transaction::Miss { slot, awaiting_victim: true, .. } if *slot == victim)
        });
        let Some(mh) = waiting else {
            let _ = self.storage.release(victim);
            self.wake(WakeEvent::EvictionDone(victim_line));
            return Ok(());
        };
        let new_line = self.mshr.line_of(mh).unwrap_or(victim_line);
        let Some((_, reserved)) = self.storage.replace(victim, new_line) else {
            return Err(CoherenceError::LostReservation {
                node: self.id,
                line: new_line,
            });
        };
        if let Some(L1Transaction::Miss { slot, awaiting_victim, .. }) = self.mshr.entry_mut(mh) {
            *slot = reserved;
            *awaiting_victim = false;
        }
        self.issue_fill(mh, new_line)?;
        self.wake(WakeEvent::EvictionDone(victim_line));
        Ok(())
    }

    fn process_coherence(&mut self, msg: &CoherenceMessage) -> Result<(), CoherenceError> {
        let line = self.storage.get_line_addr(msg.addr);
        let event = ClientEvent::Message {
            op: msg.op,
            src: msg.src,
            forward_to: msg.forward_to,
        };

        if let Some(mh) = self.mshr.get_entry(line) {
            if let Some(L1Transaction::Miss { entry, .. }) = self.mshr.entry(mh) {
                let t = self.step(line, entry.controller, event)?;
                if let Some(L1Transaction::Miss { entry, .. }) = self.mshr.entry_mut(mh) {
                    entry.controller = t.next;
                }
                self.perform(line, &t.actions);
                if self.protocol.is_stable(t.next) && !self.protocol.is_invalid(t.next) {
                    self.complete_fill(mh, line)?;
                }
                return Ok(());
            }
        }

        if let Some(h) = self.storage.lookup(line) {
            let Some(entry) = self.storage.entry(h) else {
                return Err(CoherenceError::LostReservation { node: self.id, line });
            };
            let evicting = entry.evicting;
            let t = self.step(line, entry.controller, event)?;
            self.commit_resident(h, t.next);
            self.perform(line, &t.actions);

            if evicting {
                if self.protocol.is_invalid(t.next) {
                    self.finish_eviction(h, line)?;
                }
            } else if let Some(mh) = self.mshr.get_entry(line) {
                if self.protocol.is_stable(t.next) {
                    self.complete_upgrade(mh, h, line)?;
                }
            } else if self.protocol.is_invalid(t.next) {
                let _ = self.storage.release(h);
                self.wake(WakeEvent::TransactionDone(line));
            }
            return Ok(());
        }

        if msg.op == CohOp::DemandI {
            debug!(node = %self.id, line = format_args!("{line:#x}"), "demand for absent line, acknowledging");
            self.send(CohOp::UnblockI, line, msg.src);
            return Ok(());
        }
        Err(CoherenceError::UnexpectedReply {
            node: self.id,
            op: msg.op,
            line,
        })
    }

    /// A completed store leaves the line dirty.
    fn settle_store(&self, line: u64, state: P::State, request: &R) -> P::State {
        if request.is_read() {
            return state;
        }
        match self.protocol.transition(state, ClientEvent::Processor(ProcessorOp::Store)) {
            Ok(t) if t.actions.is_empty() && self.protocol.is_stable(t.next) => {
                trace!(node = %self.id, line = format_args!("{line:#x}"), to = ?t.next, "store retired");
                t.next
            }
            _ => state,
        }
    }

    fn complete_fill(&mut self, mh: LineHandle, line: u64) -> Result<(), CoherenceError> {
        let Some(L1Transaction::Miss { mut entry, slot, request, .. }) = self.mshr.release(mh) else {
            return Ok(());
        };
        entry.controller = self.settle_store(line, entry.controller, &request);
        entry.have_data = true;
        entry.dirty = self.protocol.is_dirty(entry.controller);
        if self.storage.install(slot, entry).is_err() {
            return Err(CoherenceError::LostReservation { node: self.id, line });
        }
        debug!(node = %self.id, line = format_args!("{line:#x}"), "fill complete");
        self.respond(request);
        self.wake(WakeEvent::MshrReleased);
        self.wake(WakeEvent::TransactionDone(line));
        Ok(())
    }

    fn complete_upgrade(&mut self, mh: LineHandle, h: LineHandle, line: u64) -> Result<(), CoherenceError> {
        let Some(txn) = self.mshr.release(mh) else {
            return Ok(());
        };
        let request = txn.into_request();
        if let Some(state) = self.storage.entry(h).map(|e| e.controller) {
            let settled = self.settle_store(line, state, &request);
            self.commit_resident(h, settled);
            if let Some(entry) = self.storage.entry_mut(h) {
                entry.have_data = true;
            }
        }
        debug!(node = %self.id, line = format_args!("{line:#x}"), "upgrade complete");
        self.respond(request);
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
    pub const fn storage(&self) -> &CacheStorage<P::State> {
        &self.storage
    }

    /// Outstanding transactions.
    pub const fn mshr(&self) -> &Mshr<L1Transaction<R, P::State>> {
        &self.mshr
    }

    /// Parked requests.
    pub const fn stall_buffer(&self) -> &StallBuffer<R> {
        &self.stalls
    }

    /// Outbound link.
    pub const fn link(&self) -> &FlowControlLink {
        &self.link
    }

    /// Client state of `addr`'s line, whether resident or in the MSHR.
    pub fn line_state(&self, addr: u64) -> Option<P::State> {
        let line = self.storage.get_line_addr(addr);
        if let Some(L1Transaction::Miss { entry, .. }) =
            self.mshr.get_entry(line).and_then(|mh| self.mshr.entry(mh))
        {
            return Some(entry.controller);
        }
        self.storage
            .lookup(line)
            .and_then(|h| self.storage.entry(h))
            .map(|e| e.controller)
    }

    /// Whether nothing is queued, parked, outstanding or waiting for credit.
    pub fn is_idle(&self) -> bool {
        self.inbound.is_empty()
            && self.retries.is_empty()
            && self.stalls.is_empty()
            && self.mshr.occupancy() == 0
            && self.outbound.is_empty()
            && self.responses.is_empty()
            && self.link.buffered() == 0
    }
}
