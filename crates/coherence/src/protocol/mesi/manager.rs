//! MESI manager (directory) controller.
//!
//! Transient states name the stable state the line left and what it waits for:
//!
//! | State    | Waiting for                                                   |
//! |----------|---------------------------------------------------------------|
//! | IE       | UNBLOCK_E from the new owner after GRANT_E_DATA               |
//! | EE       | UNBLOCK_E from the requester after FWD_E to the old owner     |
//! | ES       | UNBLOCK_S from the requester and CLEAN/WRITEBACK from the old owner |
//! | SS       | UNBLOCK_S after GRANT_S_DATA                                  |
//! | SIE      | UNBLOCK_I from every other sharer, then GRANT_E_DATA          |
//! | EI_PUT   | UNBLOCK_I after granting a client eviction                    |
//! | EI_EVICT | UNBLOCK_I[_DIRTY] from the owner, own replacement             |
//! | SI_EVICT | UNBLOCK_I from every sharer, own replacement                  |
//!
//! An eviction notice from a client that is no longer the owner (the manager
//! already forwarded the line elsewhere, possibly more than once, so the line
//! may have settled in E or in S) is ignored.

use crate::common::{NodeId, TransitionError};
use crate::message::CohOp;
use crate::protocol::{
    ManagerAction, ManagerController, ManagerEvent, ManagerProtocol, ManagerTransition,
};

/// MESI manager states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ManagerState {
    /// No client holds the line.
    I,
    /// One or more clients hold it shared.
    S,
    /// One client holds it exclusive (possibly dirty).
    E,
    /// Granted exclusive, awaiting UNBLOCK_E.
    IE,
    /// Forwarded exclusive, awaiting UNBLOCK_E.
    EE,
    /// Forwarded shared, awaiting UNBLOCK_S and CLEAN/WRITEBACK.
    ES,
    /// Granted shared, awaiting UNBLOCK_S.
    SS,
    /// Invalidating sharers for an exclusive request.
    SIE,
    /// Granted a client eviction, awaiting UNBLOCK_I.
    EIPut,
    /// Invalidating the owner for a replacement.
    EIEvict,
    /// Invalidating sharers for a replacement.
    SIEvict,
}

/// MESI manager table.
#[derive(Clone, Copy, Debug, Default)]
pub struct MesiManager;

fn send(op: CohOp, dest: NodeId) -> ManagerAction {
    ManagerAction::Send {
        op,
        dest,
        forward_to: None,
    }
}

fn forward(op: CohOp, dest: NodeId, to: NodeId) -> ManagerAction {
    ManagerAction::Send {
        op,
        dest,
        forward_to: Some(to),
    }
}

impl MesiManager {
    fn request(
        line: &ManagerController<ManagerState>,
        op: CohOp,
        src: NodeId,
    ) -> Option<ManagerTransition<ManagerState>> {
        use ManagerState::{E, EE, EIPut, ES, I, IE, S, SIE, SS};

        let mut next = line.clone();
        let mut actions = Vec::new();
        match (line.state, op) {
            (I, CohOp::IToS | CohOp::IToE) => {
                next.state = IE;
                next.owner = Some(src);
                actions.push(send(CohOp::GrantE, src));
            }
            (I, CohOp::EToI | CohOp::MToI) => actions.push(ManagerAction::Ignore),

            (E, CohOp::IToE) => {
                let owner = line.owner.filter(|&o| o != src)?;
                next.state = EE;
                actions.push(forward(CohOp::FwdE, owner, src));
            }
            (E, CohOp::IToS) => {
                let owner = line.owner.filter(|&o| o != src)?;
                next.state = ES;
                next.owner = None;
                next.sharers = [owner, src].into_iter().collect();
                next.pending_acks = 2;
                actions.push(forward(CohOp::FwdS, owner, src));
            }
            (E, CohOp::EToI | CohOp::MToI) if line.owner == Some(src) => {
                next.state = EIPut;
                next.owner = None;
                if op == CohOp::MToI {
                    actions.push(ManagerAction::Writeback);
                }
                actions.push(send(CohOp::GrantI, src));
            }
            // The notice was overtaken by a forward; the line has moved on.
            (E | S, CohOp::EToI | CohOp::MToI) => actions.push(ManagerAction::Ignore),

            (S, CohOp::IToS) => {
                next.state = SS;
                let _ = next.sharers.insert(src);
                actions.push(send(CohOp::GrantS, src));
            }
            (S, CohOp::IToE) => {
                let others: Vec<NodeId> = line.sharers.iter().filter(|&n| n != src).collect();
                next.sharers.clear();
                next.owner = Some(src);
                if others.is_empty() {
                    next.state = IE;
                    actions.push(send(CohOp::GrantE, src));
                } else {
                    next.state = SIE;
                    next.pending_acks = others.len() as u32;
                    actions.extend(others.into_iter().map(|n| send(CohOp::DemandI, n)));
                }
            }

            _ => return None,
        }
        Some(ManagerTransition { next, actions })
    }

    fn reply(
        line: &ManagerController<ManagerState>,
        op: CohOp,
        src: NodeId,
    ) -> Option<ManagerTransition<ManagerState>> {
        use ManagerState::{E, EE, EIEvict, EIPut, ES, I, IE, S, SIE, SIEvict, SS};

        let mut next = line.clone();
        let mut actions = Vec::new();
        match (line.state, op) {
            (IE, CohOp::UnblockE) => next.state = E,
            (EE, CohOp::UnblockE) => {
                next.state = E;
                next.owner = Some(src);
            }

            (ES, CohOp::UnblockS) => {
                next.pending_acks = line.pending_acks.checked_sub(1)?;
            }
            (ES, CohOp::Clean | CohOp::Writeback) => {
                next.pending_acks = line.pending_acks.checked_sub(1)?;
                if op == CohOp::Writeback {
                    actions.push(ManagerAction::Writeback);
                }
            }
            // The old owner was evicting and passed exclusive data instead.
            (ES, CohOp::UnblockE) => {
                next.state = E;
                next.owner = Some(src);
                next.sharers.clear();
                next.pending_acks = 0;
            }

            (SS, CohOp::UnblockS) => next.state = S,

            (SIE, CohOp::UnblockI) => {
                next.pending_acks = line.pending_acks.checked_sub(1)?;
                if next.pending_acks == 0 {
                    next.state = IE;
                    actions.push(send(CohOp::GrantE, line.owner?));
                }
            }

            (EIPut | EIEvict, CohOp::UnblockI) => next.state = I,
            (EIEvict, CohOp::UnblockIDirty) => {
                next.state = I;
                actions.push(ManagerAction::Writeback);
            }

            (SIEvict, CohOp::UnblockI) => {
                next.pending_acks = line.pending_acks.checked_sub(1)?;
                if next.pending_acks == 0 {
                    next.state = I;
                }
            }

            _ => return None,
        }
        if next.state == ES && next.pending_acks == 0 {
            next.state = S;
        }
        Some(ManagerTransition { next, actions })
    }

    fn evict(line: &ManagerController<ManagerState>) -> Option<ManagerTransition<ManagerState>> {
        let mut next = line.clone();
        let mut actions = Vec::new();
        match line.state {
            ManagerState::I => {}
            ManagerState::E => {
                let owner = line.owner?;
                next.state = ManagerState::EIEvict;
                next.owner = None;
                actions.push(send(CohOp::DemandI, owner));
            }
            ManagerState::S => {
                next.state = ManagerState::SIEvict;
                next.pending_acks = line.sharers.len() as u32;
                next.sharers.clear();
                actions.extend(line.sharers.iter().map(|n| send(CohOp::DemandI, n)));
                if next.pending_acks == 0 {
                    next.state = ManagerState::I;
                }
            }
            _ => return None,
        }
        Some(ManagerTransition { next, actions })
    }
}

impl ManagerProtocol for MesiManager {
    type State = ManagerState;

    fn name(&self) -> &'static str {
        "MESI"
    }

    fn initial(&self) -> ManagerController<ManagerState> {
        ManagerController::new(ManagerState::I)
    }

    fn transition(
        &self,
        line: &ManagerController<ManagerState>,
        event: ManagerEvent,
    ) -> Result<ManagerTransition<ManagerState>, TransitionError> {
        let t = match event {
            ManagerEvent::Request { op, src } => Self::request(line, op, src),
            ManagerEvent::Reply { op, src } => Self::reply(line, op, src),
            ManagerEvent::Evict => Self::evict(line),
        };
        t.ok_or_else(|| TransitionError::new(line.state, event))
    }

    fn is_stable(&self, state: ManagerState) -> bool {
        matches!(state, ManagerState::I | ManagerState::S | ManagerState::E)
    }

    fn is_invalid(&self, state: ManagerState) -> bool {
        state == ManagerState::I
    }
}
