//! MESI Client Table Unit Tests.
//!
//! Verifies every defined client transition and that undefined pairs are
//! reported as errors rather than silently absorbed.

use cohsim_core::common::NodeId;
use cohsim_core::message::CohOp;
use cohsim_core::protocol::mesi::{ClientState, MesiClient};
use cohsim_core::protocol::{ClientAction, ClientEvent, ClientProtocol, ProcessorOp};
use pretty_assertions::assert_eq;
use rstest::rstest;

use ClientState::{E, EI, I, IE, M, MI, S, SE};

const MGR: NodeId = NodeId(8);
const PEER: NodeId = NodeId(2);

fn cpu(state: ClientState, op: ProcessorOp) -> (ClientState, Vec<ClientAction>) {
    let t = MesiClient.transition(state, ClientEvent::Processor(op)).unwrap();
    (t.next, t.actions)
}

fn msg(state: ClientState, op: CohOp, forward_to: Option<NodeId>) -> (ClientState, Vec<ClientAction>) {
    let t = MesiClient
        .transition(
            state,
            ClientEvent::Message {
                op,
                src: MGR,
                forward_to,
            },
        )
        .unwrap();
    (t.next, t.actions)
}

fn mgr(op: CohOp) -> ClientAction {
    ClientAction::ToManager(op)
}

fn peer(op: CohOp) -> ClientAction {
    ClientAction::ToPeer { op, dest: PEER }
}

// ══════════════════════════════════════════════════════════
// 1. Processor Operations
// ══════════════════════════════════════════════════════════

/// Processor operations in stable states.
#[rstest]
#[case(I, ProcessorOp::Load, IE, vec![mgr(CohOp::IToS)])]
#[case(I, ProcessorOp::Store, IE, vec![mgr(CohOp::IToE)])]
#[case(I, ProcessorOp::Evict, I, vec![])]
#[case(S, ProcessorOp::Load, S, vec![])]
#[case(S, ProcessorOp::Store, SE, vec![mgr(CohOp::IToE)])]
#[case(S, ProcessorOp::Evict, I, vec![])]
#[case(E, ProcessorOp::Load, E, vec![])]
#[case(E, ProcessorOp::Store, M, vec![])]
#[case(E, ProcessorOp::Evict, EI, vec![mgr(CohOp::EToI)])]
#[case(M, ProcessorOp::Load, M, vec![])]
#[case(M, ProcessorOp::Store, M, vec![])]
#[case(M, ProcessorOp::Evict, MI, vec![mgr(CohOp::MToI)])]
fn processor_ops(
    #[case] from: ClientState,
    #[case] op: ProcessorOp,
    #[case] to: ClientState,
    #[case] actions: Vec<ClientAction>,
) {
    assert_eq!(cpu(from, op), (to, actions));
}

/// A transient line accepts no processor operation.
#[rstest]
fn transient_rejects_processor(
    #[values(IE, SE, EI, MI)] state: ClientState,
    #[values(ProcessorOp::Load, ProcessorOp::Store, ProcessorOp::Evict)] op: ProcessorOp,
) {
    let err = MesiClient
        .transition(state, ClientEvent::Processor(op))
        .unwrap_err();
    assert_eq!(err.state, format!("{state:?}"));
}

// ══════════════════════════════════════════════════════════
// 2. Manager and Peer Messages
// ══════════════════════════════════════════════════════════

/// Fills and upgrades complete with the matching unblock.
#[rstest]
#[case(IE, CohOp::GrantE, E, CohOp::UnblockE)]
#[case(IE, CohOp::DataE, E, CohOp::UnblockE)]
#[case(IE, CohOp::DataM, M, CohOp::UnblockE)]
#[case(IE, CohOp::GrantS, S, CohOp::UnblockS)]
#[case(IE, CohOp::DataS, S, CohOp::UnblockS)]
#[case(SE, CohOp::GrantE, E, CohOp::UnblockE)]
#[case(SE, CohOp::DataM, M, CohOp::UnblockE)]
#[case(EI, CohOp::GrantI, I, CohOp::UnblockI)]
#[case(MI, CohOp::GrantI, I, CohOp::UnblockI)]
fn grants(
    #[case] from: ClientState,
    #[case] op: CohOp,
    #[case] to: ClientState,
    #[case] reply: CohOp,
) {
    assert_eq!(msg(from, op, None), (to, vec![mgr(reply)]));
}

/// Invalidation demands, including lines the client already dropped.
#[rstest]
#[case(I, I, CohOp::UnblockI)]
#[case(S, I, CohOp::UnblockI)]
#[case(E, I, CohOp::UnblockI)]
#[case(M, I, CohOp::UnblockIDirty)]
#[case(IE, IE, CohOp::UnblockI)]
#[case(SE, IE, CohOp::UnblockI)]
#[case(EI, I, CohOp::UnblockI)]
#[case(MI, I, CohOp::UnblockIDirty)]
fn demand_invalidate(#[case] from: ClientState, #[case] to: ClientState, #[case] reply: CohOp) {
    assert_eq!(msg(from, CohOp::DemandI, None), (to, vec![mgr(reply)]));
}

/// Forwards send data to the requester and, for shared forwards, notify the manager.
#[rstest]
#[case(E, CohOp::FwdE, I, vec![peer(CohOp::DataE)])]
#[case(E, CohOp::FwdS, S, vec![peer(CohOp::DataS), mgr(CohOp::Clean)])]
#[case(M, CohOp::FwdE, I, vec![peer(CohOp::DataM)])]
#[case(M, CohOp::FwdS, S, vec![peer(CohOp::DataS), mgr(CohOp::Writeback)])]
#[case(EI, CohOp::FwdE, I, vec![peer(CohOp::DataE)])]
#[case(EI, CohOp::FwdS, I, vec![peer(CohOp::DataE)])]
#[case(MI, CohOp::FwdE, I, vec![peer(CohOp::DataM)])]
#[case(MI, CohOp::FwdS, I, vec![peer(CohOp::DataM)])]
fn forwards(
    #[case] from: ClientState,
    #[case] op: CohOp,
    #[case] to: ClientState,
    #[case] actions: Vec<ClientAction>,
) {
    assert_eq!(msg(from, op, Some(PEER)), (to, actions));
}

/// A forward without a target cannot be answered.
#[test]
fn forward_without_target_rejected() {
    let event = ClientEvent::Message {
        op: CohOp::FwdE,
        src: MGR,
        forward_to: None,
    };
    assert!(MesiClient.transition(E, event).is_err());
}

/// Messages that make no sense in a state are errors.
#[rstest]
#[case(I, CohOp::GrantE)]
#[case(S, CohOp::GrantI)]
#[case(E, CohOp::DataS)]
#[case(SE, CohOp::GrantS)]
#[case(IE, CohOp::FwdE)]
#[case(M, CohOp::IToS)]
fn undefined_messages(#[case] state: ClientState, #[case] op: CohOp) {
    let event = ClientEvent::Message {
        op,
        src: MGR,
        forward_to: Some(PEER),
    };
    assert!(MesiClient.transition(state, event).is_err(), "{state:?} + {op:?} must be rejected");
}

// ══════════════════════════════════════════════════════════
// 3. State Classification
// ══════════════════════════════════════════════════════════

/// Stable, invalid and dirty classification.
#[rstest]
#[case(I, true, true, false)]
#[case(S, true, false, false)]
#[case(E, true, false, false)]
#[case(M, true, false, true)]
#[case(IE, false, false, false)]
#[case(SE, false, false, false)]
#[case(EI, false, false, false)]
#[case(MI, false, false, true)]
fn classification(
    #[case] state: ClientState,
    #[case] stable: bool,
    #[case] invalid: bool,
    #[case] dirty: bool,
) {
    assert_eq!(MesiClient.is_stable(state), stable);
    assert_eq!(MesiClient.is_invalid(state), invalid);
    assert_eq!(MesiClient.is_dirty(state), dirty);
}

/// Fresh lines start invalid.
#[test]
fn initial_state() {
    assert_eq!(MesiClient.initial_state(), I);
    assert_eq!(MesiClient.name(), "MESI");
}
