//! MESI client controller.
//!
//! | State | Meaning                                              |
//! |-------|------------------------------------------------------|
//! | I     | No copy                                              |
//! | S     | Clean shared copy                                    |
//! | E     | Clean exclusive copy                                 |
//! | M     | Dirty exclusive copy                                 |
//! | IE    | Requested a copy (I_to_S or I_to_E), awaiting data   |
//! | SE    | Shared copy, requested exclusive, awaiting grant     |
//! | EI    | Evicting a clean exclusive copy, awaiting GRANT_I    |
//! | MI    | Evicting a dirty copy, awaiting GRANT_I              |
//!
//! A forward or demand that reaches a line in EI/MI means the manager
//! processed some other request before the eviction notice; the client answers
//! it as if it still held the line and the eviction is complete.

use crate::common::{NodeId, TransitionError};
use crate::message::CohOp;
use crate::protocol::{ClientAction, ClientEvent, ClientProtocol, ClientTransition, ProcessorOp};

/// MESI client states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// Invalid.
    I,
    /// Shared.
    S,
    /// Exclusive.
    E,
    /// Modified.
    M,
    /// Invalid, awaiting data.
    IE,
    /// Shared, awaiting exclusive grant.
    SE,
    /// Exclusive, awaiting eviction grant.
    EI,
    /// Modified, awaiting eviction grant.
    MI,
}

/// MESI client table.
#[derive(Clone, Copy, Debug, Default)]
pub struct MesiClient;

impl MesiClient {
    fn go(next: ClientState, actions: Vec<ClientAction>) -> ClientTransition<ClientState> {
        ClientTransition { next, actions }
    }

    fn stay(next: ClientState) -> ClientTransition<ClientState> {
        Self::go(next, Vec::new())
    }

    fn processor(
        state: ClientState,
        op: ProcessorOp,
    ) -> Option<ClientTransition<ClientState>> {
        use ClientState::{E, EI, I, IE, M, MI, S, SE};
        use ProcessorOp::{Evict, Load, Store};

        let t = match (state, op) {
            (I, Load) => Self::go(IE, vec![ClientAction::ToManager(CohOp::IToS)]),
            (I, Store) => Self::go(IE, vec![ClientAction::ToManager(CohOp::IToE)]),
            (I, Evict) => Self::stay(I),

            (S, Load) => Self::stay(S),
            (S, Store) => Self::go(SE, vec![ClientAction::ToManager(CohOp::IToE)]),
            (S, Evict) => Self::stay(I),

            (E, Load) => Self::stay(E),
            (E, Store) => Self::stay(M),
            (E, Evict) => Self::go(EI, vec![ClientAction::ToManager(CohOp::EToI)]),

            (M, Load | Store) => Self::stay(M),
            (M, Evict) => Self::go(MI, vec![ClientAction::ToManager(CohOp::MToI)]),

            (IE | SE | EI | MI, _) => return None,
        };
        Some(t)
    }

    fn message(
        state: ClientState,
        op: CohOp,
        forward_to: Option<NodeId>,
    ) -> Option<ClientTransition<ClientState>> {
        use ClientState::{E, EI, I, IE, M, MI, S, SE};

        let to_mgr = ClientAction::ToManager;
        let to_peer = |op| forward_to.map(|dest| ClientAction::ToPeer { op, dest });

        let t = match (state, op) {
            // Stale sharer: the line was dropped silently, acknowledge anyway.
            (I | S | E, CohOp::DemandI) => Self::go(I, vec![to_mgr(CohOp::UnblockI)]),
            (M, CohOp::DemandI) => Self::go(I, vec![to_mgr(CohOp::UnblockIDirty)]),

            (E, CohOp::FwdE) => Self::go(I, vec![to_peer(CohOp::DataE)?]),
            (E, CohOp::FwdS) => Self::go(S, vec![to_peer(CohOp::DataS)?, to_mgr(CohOp::Clean)]),
            (M, CohOp::FwdE) => Self::go(I, vec![to_peer(CohOp::DataM)?]),
            (M, CohOp::FwdS) => {
                Self::go(S, vec![to_peer(CohOp::DataS)?, to_mgr(CohOp::Writeback)])
            }

            (IE | SE, CohOp::GrantE | CohOp::DataE) => Self::go(E, vec![to_mgr(CohOp::UnblockE)]),
            (IE | SE, CohOp::DataM) => Self::go(M, vec![to_mgr(CohOp::UnblockE)]),
            (IE, CohOp::GrantS | CohOp::DataS) => Self::go(S, vec![to_mgr(CohOp::UnblockS)]),
            (IE | SE, CohOp::DemandI) => Self::go(IE, vec![to_mgr(CohOp::UnblockI)]),

            (EI | MI, CohOp::GrantI) => Self::go(I, vec![to_mgr(CohOp::UnblockI)]),
            (EI, CohOp::FwdE | CohOp::FwdS) => Self::go(I, vec![to_peer(CohOp::DataE)?]),
            (MI, CohOp::FwdE | CohOp::FwdS) => Self::go(I, vec![to_peer(CohOp::DataM)?]),
            (EI, CohOp::DemandI) => Self::go(I, vec![to_mgr(CohOp::UnblockI)]),
            (MI, CohOp::DemandI) => Self::go(I, vec![to_mgr(CohOp::UnblockIDirty)]),

            _ => return None,
        };
        Some(t)
    }
}

impl ClientProtocol for MesiClient {
    type State = ClientState;

    fn name(&self) -> &'static str {
        "MESI"
    }

    fn initial_state(&self) -> ClientState {
        ClientState::I
    }

    fn transition(
        &self,
        state: ClientState,
        event: ClientEvent,
    ) -> Result<ClientTransition<ClientState>, TransitionError> {
        let t = match event {
            ClientEvent::Processor(op) => Self::processor(state, op),
            ClientEvent::Message { op, forward_to, .. } => Self::message(state, op, forward_to),
        };
        t.ok_or_else(|| TransitionError::new(state, event))
    }

    fn is_stable(&self, state: ClientState) -> bool {
        matches!(
            state,
            ClientState::I | ClientState::S | ClientState::E | ClientState::M
        )
    }

    fn is_invalid(&self, state: ClientState) -> bool {
        state == ClientState::I
    }

    fn is_dirty(&self, state: ClientState) -> bool {
        matches!(state, ClientState::M | ClientState::MI)
    }
}
