//! Per-line coherence protocol state machines.
//!
//! A protocol variant supplies two table-driven roles:
//! 1. **Client:** Attached at the requesting level; reacts to processor
//!    operations and to manager/peer messages.
//! 2. **Manager:** Attached at the serving level; tracks owner and sharers and
//!    arbitrates client requests.
//!
//! Transitions are pure: they take the current controller by reference and
//! return the next controller plus the actions to perform. The orchestrator
//! decides whether to commit them, which lets it check resource availability
//! (a free MSHR slot) before any state changes.
//!
//! The opcode vocabulary (`CohOp`) is shared by the MESI family; variants
//! are selected at node construction through the type parameter.

/// MESI client and manager tables.
pub mod mesi;

/// Sharer bitset.
pub mod sharers;

pub use mesi::{MesiClient, MesiManager};
pub use sharers::SharerSet;

use std::fmt::Debug;

use crate::common::{NodeId, TransitionError};
use crate::message::CohOp;

/// Processor-side operations seen by a client controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessorOp {
    /// Read access (GET_S).
    Load,
    /// Write access (GET_E).
    Store,
    /// Replacement of the line by its own cache (GET_EVICT).
    Evict,
}

/// Input to a client transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// Operation from the processor side or the local replacement logic.
    Processor(ProcessorOp),
    /// Message from the manager or a peer client.
    Message {
        /// Opcode.
        op: CohOp,
        /// Sender.
        src: NodeId,
        /// Target of a forward request.
        forward_to: Option<NodeId>,
    },
}

/// Output of a client transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientAction {
    /// Send `op` to the line's manager.
    ToManager(CohOp),
    /// Send `op` to another client.
    ToPeer {
        /// Opcode.
        op: CohOp,
        /// Receiving client.
        dest: NodeId,
    },
}

/// Next state and actions of a client transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientTransition<S> {
    /// State after the event.
    pub next: S,
    /// Messages to send, in order.
    pub actions: Vec<ClientAction>,
}

/// Client half of a protocol variant.
pub trait ClientProtocol: Debug {
    /// Stable and transient states.
    type State: Copy + Eq + Debug;

    /// Short variant name for diagnostics.
    fn name(&self) -> &'static str;

    /// State of a line that has never been filled.
    fn initial_state(&self) -> Self::State;

    /// Looks up the transition for `event` in `state`.
    fn transition(
        &self,
        state: Self::State,
        event: ClientEvent,
    ) -> Result<ClientTransition<Self::State>, TransitionError>;

    /// Whether no reply is awaited in `state`.
    fn is_stable(&self, state: Self::State) -> bool;

    /// Whether `state` is the invalid terminal state.
    fn is_invalid(&self, state: Self::State) -> bool;

    /// Whether `state` holds data newer than the manager's copy.
    fn is_dirty(&self, state: Self::State) -> bool;
}

/// Input to a manager transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerEvent {
    /// Client request (I_to_S, I_to_E, E_to_I, M_to_I).
    Request {
        /// Opcode.
        op: CohOp,
        /// Requesting client.
        src: NodeId,
    },
    /// Client acknowledgement (UNBLOCK-class, CLEAN, WRITEBACK).
    Reply {
        /// Opcode.
        op: CohOp,
        /// Replying client.
        src: NodeId,
    },
    /// Replacement of the line by the manager's own cache.
    Evict,
}

/// Output of a manager transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerAction {
    /// Send `op` to `dest`, optionally naming a forward target.
    Send {
        /// Opcode.
        op: CohOp,
        /// Receiving client.
        dest: NodeId,
        /// Client a forward request must send data to.
        forward_to: Option<NodeId>,
    },
    /// A client returned dirty data; the line is now dirty at this level.
    Writeback,
    /// The event refers to a race that has already resolved; nothing to do.
    Ignore,
}

/// Manager-side line controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerController<S> {
    /// Protocol state.
    pub state: S,
    /// Exclusive holder, set only in E-derived states.
    pub owner: Option<NodeId>,
    /// Clients holding a shared copy.
    pub sharers: SharerSet,
    /// Acknowledgements still expected before the next stable state.
    pub pending_acks: u32,
}

impl<S> ManagerController<S> {
    /// Controller with no holders.
    pub const fn new(state: S) -> Self {
        Self {
            state,
            owner: None,
            sharers: SharerSet::new(),
            pending_acks: 0,
        }
    }
}

/// Next controller and actions of a manager transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerTransition<S> {
    /// Controller after the event.
    pub next: ManagerController<S>,
    /// Actions to perform, in order.
    pub actions: Vec<ManagerAction>,
}

impl<S> ManagerTransition<S> {
    /// Whether the event was an explicitly ignored stale message.
    pub fn is_ignored(&self) -> bool {
        self.actions.contains(&ManagerAction::Ignore)
    }
}

/// Manager half of a protocol variant.
pub trait ManagerProtocol: Debug {
    /// Stable and transient states.
    type State: Copy + Eq + Debug;

    /// Short variant name for diagnostics.
    fn name(&self) -> &'static str;

    /// Controller of a line that has just been fetched.
    fn initial(&self) -> ManagerController<Self::State>;

    /// Looks up the transition for `event` on `line`.
    fn transition(
        &self,
        line: &ManagerController<Self::State>,
        event: ManagerEvent,
    ) -> Result<ManagerTransition<Self::State>, TransitionError>;

    /// Whether no acknowledgement is awaited in `state`.
    fn is_stable(&self, state: Self::State) -> bool;

    /// Whether no client holds the line in `state`.
    fn is_invalid(&self, state: Self::State) -> bool;
}
