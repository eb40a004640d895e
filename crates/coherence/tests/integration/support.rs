use cohsim_core::common::NodeId;
use cohsim_core::config::{
    CacheGeometry, Config, MemoryConfig, MemoryControllerKind, MessageTags, NodeConfig,
    TopologyConfig,
};
use cohsim_core::sim::{Access, System, SystemReport, Trace, TraceEntry};

use crate::common::harness::{init_tracing, small_node};

/// `cores` L1s with the small geometry over one L2 with the same geometry.
pub fn small_config(cores: usize) -> Config {
    Config {
        topology: TopologyConfig {
            cores,
            l2_nodes: 1,
            memory_controllers: 1,
            page_offset_bits: 12,
            link_latency: 1,
        },
        l1: small_node(4),
        l2: NodeConfig {
            cache: CacheGeometry {
                lookup_time: 2,
                ..small_node(8).cache
            },
            ..small_node(8)
        },
        memory: MemoryConfig {
            controller: MemoryControllerKind::Simple,
            latency: 10,
            ..MemoryConfig::default()
        },
        tags: MessageTags::default(),
        max_cycles: 20_000,
    }
}

/// Same as `small_config` with an L2 large enough never to replace.
pub fn roomy_config(cores: usize) -> Config {
    let mut config = small_config(cores);
    config.l2.cache.size_bytes = 8 * 1024;
    config
}

/// `cores` direct-mapped L1s over an L2 with two MSHR entries, two credits
/// per link and three-cycle links.
pub fn stress_config(cores: usize) -> Config {
    let mut config = small_config(cores);
    config.topology.link_latency = 3;
    config.l1.cache.ways = 1;
    config.l1.cache.size_bytes = 128;
    config.l1.downstream_credits = 2;
    config.l2.mshr_entries = 2;
    config.l2.downstream_credits = 2;
    config.max_cycles = 200_000;
    config
}

/// Node id of the single L2 in a system with `cores` cores.
pub const fn l2_id(cores: usize) -> NodeId {
    NodeId(cores as u32)
}

pub fn read(core: usize, addr: u64) -> TraceEntry {
    TraceEntry {
        core,
        access: Access::Read,
        addr,
    }
}

pub fn write(core: usize, addr: u64) -> TraceEntry {
    TraceEntry {
        core,
        access: Access::Write,
        addr,
    }
}

pub fn system(config: &Config) -> System {
    init_tracing();
    System::new(config).unwrap()
}

/// Runs `entries` to completion and checks the system drained.
pub fn run(system: &mut System, entries: Vec<TraceEntry>) -> SystemReport {
    system.load(&Trace::from_entries(entries)).unwrap();
    let report = system.run().unwrap();
    assert!(report.drained, "system did not drain by cycle {}", report.cycles);
    report
}
