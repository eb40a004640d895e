//! Node Statistics Unit Tests.

use cohsim_core::node::StallReason;
use cohsim_core::stats::NodeStats;
use rstest::rstest;

/// Each stall reason lands in its own counter.
#[rstest]
#[case(StallReason::MshrStall, 1, 0, 0, 0)]
#[case(StallReason::PrevPendStall, 0, 1, 0, 0)]
#[case(StallReason::LruBusyStall, 0, 0, 1, 0)]
#[case(StallReason::TransStall, 0, 0, 0, 1)]
fn stall_counters(
    #[case] reason: StallReason,
    #[case] mshr: u64,
    #[case] prev: u64,
    #[case] lru: u64,
    #[case] trans: u64,
) {
    let mut stats = NodeStats::default();
    stats.record_stall(reason);
    assert_eq!(
        (stats.mshr_stalls, stats.prev_pend_stalls, stats.lru_busy_stalls, stats.trans_stalls),
        (mshr, prev, lru, trans)
    );
    assert_eq!(stats.total_stalls(), 1);
}

/// Occupancy samples accumulate and count empty cycles.
#[test]
fn occupancy_sampling() {
    let mut stats = NodeStats::default();
    stats.sample(0, 0);
    stats.sample(4, 1);
    stats.sample(2, 0);

    assert_eq!(stats.cycles, 3);
    assert_eq!(stats.table_empty_cycles, 1);
    assert_eq!(stats.mshr_empty_cycles, 2);
    assert!((stats.avg_table_occupancy() - 2.0).abs() < f64::EPSILON);
    assert!((stats.avg_mshr_occupancy() - 1.0 / 3.0).abs() < 1e-9);
}

/// Ratios are zero before anything happens.
#[test]
fn empty_ratios() {
    let stats = NodeStats::default();
    assert!(stats.hit_rate().abs() < f64::EPSILON);
    assert!(stats.avg_table_occupancy().abs() < f64::EPSILON);
    assert!(stats.avg_mshr_occupancy().abs() < f64::EPSILON);
}

/// Hit rate is hits over all classified requests.
#[test]
fn hit_rate() {
    let stats = NodeStats {
        hits: 3,
        misses: 1,
        ..NodeStats::default()
    };
    assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
}

/// Counters serialize by field name.
#[test]
fn serializes_to_json() {
    let stats = NodeStats {
        writebacks: 2,
        ..NodeStats::default()
    };
    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["writebacks"], 2);
    assert_eq!(json["mshr_stalls"], 0);
}
