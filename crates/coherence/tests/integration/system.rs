//! System Property Tests.
//!
//! Runs whole hierarchies and checks properties that must hold for any trace:
//! the system drains, every credit comes home, and after draining at most one
//! client holds a line writable, matching the manager's record.

use cohsim_core::common::NodeId;
use cohsim_core::config::Config;
use cohsim_core::protocol::mesi::{ClientState, ManagerState};
use cohsim_core::sim::{SimError, System, Trace, TraceEntry};
use proptest::prelude::*;

use super::support::{read, roomy_config, run, small_config, stress_config, system, write};

const X: u64 = 0x1000;

/// Every link holds its full credit count again.
fn assert_credits_home(sys: &System) {
    for l1 in sys.l1s() {
        assert_eq!(l1.link().credits(), l1.link().max_credits(), "L1 {} credits", l1.id());
    }
    for l2 in sys.l2s() {
        assert_eq!(l2.link().credits(), l2.link().max_credits(), "L2 {} credits", l2.id());
    }
    for mem in sys.memories() {
        assert_eq!(mem.link().credits(), mem.link().max_credits(), "memory {} credits", mem.id());
    }
}

/// Single writer or multiple readers for `line`, and the manager agrees.
fn check_line(sys: &System, line: u64) -> Result<(), String> {
    let states: Vec<(usize, ClientState)> = sys
        .l1s()
        .iter()
        .enumerate()
        .filter_map(|(i, l1)| l1.line_state(line).map(|s| (i, s)))
        .collect();
    let writers: Vec<usize> = states
        .iter()
        .filter(|(_, s)| matches!(s, ClientState::E | ClientState::M))
        .map(|&(i, _)| i)
        .collect();
    let readers: Vec<usize> = states
        .iter()
        .filter(|(_, s)| *s == ClientState::S)
        .map(|&(i, _)| i)
        .collect();
    if states.iter().any(|(_, s)| !matches!(s, ClientState::S | ClientState::E | ClientState::M | ClientState::I)) {
        return Err(format!("transient client state after drain: {states:?}"));
    }
    if writers.len() > 1 || (!writers.is_empty() && !readers.is_empty()) {
        return Err(format!("line {line:#x}: writers {writers:?} readers {readers:?}"));
    }

    let manager = sys.l2s().iter().find_map(|l2| l2.line(line));
    if let Some(&w) = writers.first() {
        let Some(m) = manager else {
            return Err(format!("line {line:#x} held by core {w} but unknown to the L2"));
        };
        if m.state != ManagerState::E || m.owner != Some(NodeId(w as u32)) {
            return Err(format!("line {line:#x} held by core {w}, manager has {m:?}"));
        }
    }
    for &r in &readers {
        let Some(m) = manager else {
            return Err(format!("line {line:#x} shared by core {r} but unknown to the L2"));
        };
        if m.state != ManagerState::S || !m.sharers.contains(NodeId(r as u32)) {
            return Err(format!("line {line:#x} shared by core {r}, manager has {m:?}"));
        }
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════
// 1. Drain and Credits
// ══════════════════════════════════════════════════════════

/// Credits spent during a run all come back.
#[test]
fn credits_return_after_drain() {
    let mut sys = system(&small_config(2));
    let _ = run(
        &mut sys,
        vec![write(0, X), read(1, X), write(1, X + 0x80), read(0, X + 0x100)],
    );
    assert_credits_home(&sys);
}

/// Racing writers to one line leave exactly one owner.
#[test]
fn racing_writers() {
    let mut sys = system(&roomy_config(3));
    let _ = run(&mut sys, vec![write(0, X), write(1, X), write(2, X)]);

    let owners: Vec<usize> = (0..3)
        .filter(|&i| sys.l1s()[i].line_state(X) == Some(ClientState::M))
        .collect();
    assert_eq!(owners.len(), 1, "exactly one modified copy");
    assert_eq!(check_line(&sys, X), Ok(()));
    assert_credits_home(&sys);
}

/// Ping-pong writes between two cores finish and stay coherent.
#[test]
fn ping_pong() {
    let mut sys = system(&roomy_config(2));
    let entries: Vec<TraceEntry> = (0..20).map(|i| write(i % 2, X)).collect();
    let report = run(&mut sys, entries);

    assert_eq!(report.cores[0].completed + report.cores[1].completed, 20);
    assert_eq!(check_line(&sys, X), Ok(()));
    assert_eq!(report.memory[0].reads, 1);
}

/// Lines interleave over several L2 banks and memory controllers by page.
#[test]
fn multiple_banks() {
    let mut config = roomy_config(2);
    config.topology.l2_nodes = 2;
    config.topology.memory_controllers = 2;
    let mut sys = system(&config);
    let report = run(&mut sys, vec![read(0, 0x0000), read(1, 0x1000), write(0, 0x2000)]);

    assert!(sys.l2s()[0].line(0x0000).is_some());
    assert!(sys.l2s()[1].line(0x1000).is_some());
    assert!(sys.l2s()[0].line(0x2000).is_some());
    assert_eq!(report.memory[0].reads, 2);
    assert_eq!(report.memory[1].reads, 1);
    assert_credits_home(&sys);
}

// ══════════════════════════════════════════════════════════
// 2. Reporting and Errors
// ══════════════════════════════════════════════════════════

/// Latencies reflect the memory round trip on a miss and the hit time on a hit.
#[test]
fn latency_report() {
    let mut sys = system(&roomy_config(1));
    let report = run(&mut sys, vec![read(0, X), read(0, X)]);
    let core = &report.cores[0];
    assert_eq!(core.completed, 2);
    assert!(core.avg_latency() > 1.0);
    assert!(core.total_latency > 10, "the miss waited for memory");
}

/// The report serializes for the CLI's JSON output.
#[test]
fn report_serializes() {
    let mut sys = system(&roomy_config(1));
    let report = run(&mut sys, vec![read(0, X)]);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["drained"], true);
    assert_eq!(json["l1"][0]["misses"], 1);
}

/// A trace naming a missing core is rejected.
#[test]
fn unknown_core() {
    let mut sys = system(&roomy_config(1));
    let err = sys.load(&Trace::from_entries(vec![read(3, X)])).unwrap_err();
    assert!(matches!(err, SimError::UnknownCore { core: 3, cores: 1 }));
}

/// Hitting the cycle limit returns a report marked as not drained.
#[test]
fn cycle_limit() {
    let mut config = roomy_config(1);
    config.max_cycles = 5;
    let mut sys = system(&config);
    sys.load(&Trace::from_entries(vec![read(0, X)])).unwrap();
    let report = sys.run().unwrap();
    assert!(!report.drained);
    assert_eq!(report.cycles, 5);
}

/// A system can be built from a configuration file.
#[test]
fn from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("system.json");
    std::fs::write(&path, serde_json::to_string(&roomy_config(2)).unwrap()).unwrap();

    let config = Config::from_file(&path).unwrap();
    let mut sys = system(&config);
    let _ = run(&mut sys, vec![read(1, X)]);
    assert_eq!(sys.l1s()[1].line_state(X), Some(ClientState::E));
}

// ══════════════════════════════════════════════════════════
// 3. Random Traffic
// ══════════════════════════════════════════════════════════

const LINES: [u64; 6] = [0x000, 0x020, 0x080, 0x100, 0x180, 0x1a0];

/// Lines crowding two of the stress geometry's L1 sets.
const CROWDED: [u64; 8] = [0x000, 0x020, 0x080, 0x0a0, 0x100, 0x180, 0x1a0, 0x200];

fn entry(cores: usize, lines: &'static [u64]) -> impl Strategy<Value = TraceEntry> {
    (0..cores, any::<bool>(), 0..lines.len()).prop_map(move |(core, is_write, i)| {
        if is_write {
            write(core, lines[i])
        } else {
            read(core, lines[i])
        }
    })
}

/// Runs `entries` on `config` and checks the drained system.
fn check_traffic(config: &Config, lines: &[u64], entries: Vec<TraceEntry>) -> Result<(), TestCaseError> {
    let mut sys = System::new(config).unwrap();
    let total = entries.len() as u64;
    sys.load(&Trace::from_entries(entries)).unwrap();
    let report = sys.run().unwrap();

    prop_assert!(report.drained);
    prop_assert_eq!(report.cores.iter().map(|c| c.completed).sum::<u64>(), total);
    for &line in lines {
        prop_assert_eq!(check_line(&sys, line), Ok(()));
    }
    for l1 in sys.l1s() {
        prop_assert_eq!(l1.link().credits(), l1.link().max_credits());
    }
    for l2 in sys.l2s() {
        prop_assert_eq!(l2.link().credits(), l2.link().max_credits());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Any mix of accesses drains, returns every credit and leaves the lines coherent.
    #[test]
    fn random_traffic_stays_coherent(entries in prop::collection::vec(entry(3, &LINES), 1..60)) {
        check_traffic(&small_config(3), &LINES, entries)?;
    }

    /// Direct-mapped L1s, a two-entry L2 MSHR, scarce credits and slow links
    /// keep evictions racing forwards on every line.
    #[test]
    fn contended_traffic_stays_coherent(entries in prop::collection::vec(entry(5, &CROWDED), 1..120)) {
        check_traffic(&stress_config(5), &CROWDED, entries)?;
    }
}
