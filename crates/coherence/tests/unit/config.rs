//! Configuration Unit Tests.
//!
//! Verifies defaults, partial JSON loading with per-field defaults, file
//! loading and every validation rule.

use std::io::Write;

use cohsim_core::common::ConfigError;
use cohsim_core::config::{CacheGeometry, Config, MemoryControllerKind, MessageTags, NodeConfig};
use pretty_assertions::assert_eq;
use rstest::rstest;

// ══════════════════════════════════════════════════════════
// 1. Defaults
// ══════════════════════════════════════════════════════════

/// Defaults describe a 16 KiB, 4-way, 32-byte-line table with 8 MSHRs and 30 credits.
#[test]
fn default_node_geometry() {
    let config = Config::default();
    assert_eq!(config.l1.cache.size_bytes, 16 * 1024);
    assert_eq!(config.l1.cache.ways, 4);
    assert_eq!(config.l1.cache.line_bytes, 32);
    assert_eq!(config.l1.cache.sets(), 128);
    assert_eq!(config.l1.mshr_entries, 8);
    assert_eq!(config.l1.downstream_credits, 30);
    assert_eq!(config.l1.cache.lookup_time, 1);
    assert_eq!(config.l2.cache.lookup_time, 11);
    assert!(config.validate().is_ok());
}

/// The default configuration survives a JSON round trip unchanged.
#[test]
fn default_serializes_and_reloads() {
    let config = Config::default();
    let json = serde_json::to_string(&config).unwrap();
    assert_eq!(Config::from_json_str(&json).unwrap(), config);
}

// ══════════════════════════════════════════════════════════
// 2. JSON Loading
// ══════════════════════════════════════════════════════════

/// An empty object yields the defaults.
#[test]
fn empty_json_is_default() {
    assert_eq!(Config::from_json_str("{}").unwrap(), Config::default());
}

/// Fields left out of a section keep their defaults.
#[test]
fn partial_sections_fill_defaults() {
    let json = r#"{
        "l2": { "cache": { "ways": 8 } },
        "memory": { "controller": "Dram", "t_cas": 10 },
        "tags": { "credit": 7 }
    }"#;
    let config = Config::from_json_str(json).unwrap();
    assert_eq!(config.l2.cache.ways, 8);
    assert_eq!(config.l2.cache.line_bytes, 32);
    assert_eq!(config.l2.mshr_entries, 8);
    assert_eq!(config.memory.controller, MemoryControllerKind::Dram);
    assert_eq!(config.memory.t_cas, 10);
    assert_eq!(config.memory.t_ras, 14);
    assert_eq!(config.tags.credit, 7);
    assert_eq!(config.tags.coherence, 1);
}

/// Configuration files are read from disk.
#[test]
fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{ "topology": {{ "cores": 4, "l2_nodes": 2 }} }}"#).unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.topology.cores, 4);
    assert_eq!(config.topology.l2_nodes, 2);
}

/// A missing file is an I/O error; malformed JSON is a JSON error.
#[test]
fn load_errors_are_classified() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Config::from_file(dir.path().join("missing.json")),
        Err(ConfigError::Io(_))
    ));
    assert!(matches!(
        Config::from_json_str("{ not json"),
        Err(ConfigError::Json(_))
    ));
}

// ══════════════════════════════════════════════════════════
// 3. Validation
// ══════════════════════════════════════════════════════════

fn geometry(size_bytes: usize, line_bytes: usize, ways: usize) -> CacheGeometry {
    CacheGeometry {
        size_bytes,
        line_bytes,
        ways,
        ..CacheGeometry::default()
    }
}

/// Geometries that cannot form a power-of-two set count are rejected.
#[rstest]
#[case::zero_ways(geometry(1024, 32, 0))]
#[case::odd_line(geometry(1024, 48, 2))]
#[case::not_divisible(geometry(1000, 32, 2))]
#[case::three_sets(geometry(3 * 64, 32, 2))]
#[case::empty(geometry(0, 32, 2))]
#[case::set_overflow(geometry(1024, 32, usize::MAX / 16))]
fn invalid_geometry(#[case] cache: CacheGeometry) {
    assert!(matches!(cache.validate(), Err(ConfigError::Geometry(_))));
}

/// A set size that overflows reports zero sets instead of wrapping.
#[test]
fn overflowing_set_size() {
    let cache = geometry(1024, 32, usize::MAX / 16);
    assert_eq!(cache.sets(), 0);
    let Err(ConfigError::Geometry(msg)) = cache.validate() else {
        panic!("overflow accepted");
    };
    assert!(msg.contains("overflows"), "{msg}");
}

/// MSHR entries and credits must both be at least one.
#[test]
fn node_needs_mshr_and_credits() {
    let no_mshr = NodeConfig {
        mshr_entries: 0,
        ..NodeConfig::l1()
    };
    let no_credit = NodeConfig {
        downstream_credits: 0,
        ..NodeConfig::l1()
    };
    assert!(matches!(no_mshr.validate(), Err(ConfigError::Invalid(_))));
    assert!(matches!(no_credit.validate(), Err(ConfigError::Invalid(_))));
}

/// Two message types may not share a tag.
#[test]
fn tags_must_be_distinct() {
    let tags = MessageTags {
        coherence: 4,
        memory: 4,
        credit: 5,
    };
    assert!(matches!(tags.validate(), Err(ConfigError::Invalid(_))));
    assert!(MessageTags::default().validate().is_ok());
}

/// Topologies need at least one of every node kind.
#[rstest]
#[case(r#"{ "topology": { "cores": 0 } }"#)]
#[case(r#"{ "topology": { "l2_nodes": 0 } }"#)]
#[case(r#"{ "topology": { "memory_controllers": 0 } }"#)]
fn empty_topology_rejected(#[case] json: &str) {
    assert!(matches!(
        Config::from_json_str(json),
        Err(ConfigError::Invalid(_))
    ));
}

/// L1 and L2 must agree on the line size.
#[test]
fn line_sizes_must_match() {
    let json = r#"{ "l1": { "cache": { "line_bytes": 64 } } }"#;
    assert!(Config::from_json_str(json).is_err());
}
