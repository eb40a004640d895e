//! Configuration system for the coherence engine.
//!
//! This module defines all configuration structures used to parameterize cache
//! nodes and the reference simulation kernel. It provides:
//! 1. **Defaults:** Baseline geometry, MSHR, credit and latency constants.
//! 2. **Structures:** Hierarchical config for caches, message tags, memory and topology.
//! 3. **Validation:** Geometry and topology checks performed before any node is built.
//!
//! Configuration is supplied as JSON (`Config::from_file`) or built with
//! `Config::default()`. Message-type tags are part of the configuration and are
//! handed to every node at construction.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::ConfigError;

/// Default configuration constants.
///
/// These values define the baseline hierarchy when not explicitly overridden
/// in a JSON configuration file.
mod defaults {
    /// Default cache size in bytes (16 KiB).
    pub const CACHE_SIZE: usize = 16 * 1024;

    /// Default cache line size in bytes.
    pub const CACHE_LINE: usize = 32;

    /// Default cache associativity.
    pub const CACHE_WAYS: usize = 4;

    /// Default latency, in cycles, before a processor hit response is delivered.
    pub const HIT_TIME: u64 = 1;

    /// Default L1 tag lookup latency in cycles.
    ///
    /// Outbound messages become eligible for the link this many cycles after
    /// the event that produced them.
    pub const L1_LOOKUP_TIME: u64 = 1;

    /// Default L2 tag lookup latency in cycles.
    pub const L2_LOOKUP_TIME: u64 = 11;

    /// Default MSHR capacity (fully associative).
    pub const MSHR_ENTRIES: usize = 8;

    /// Default downstream credit count per node.
    pub const DOWNSTREAM_CREDITS: u32 = 30;

    /// Default tag for coherence messages.
    pub const TAG_COHERENCE: u32 = 1;

    /// Default tag for memory messages.
    pub const TAG_MEMORY: u32 = 2;

    /// Default tag for credit messages.
    pub const TAG_CREDIT: u32 = 3;

    /// Default fixed memory latency in cycles.
    pub const MEMORY_LATENCY: u64 = 100;

    /// CAS latency in memory cycles.
    pub const T_CAS: u64 = 14;

    /// RAS latency in memory cycles.
    pub const T_RAS: u64 = 14;

    /// Precharge latency in memory cycles.
    pub const T_PRE: u64 = 14;

    /// Default link latency in cycles.
    pub const LINK_LATENCY: u64 = 1;

    /// Default page offset used by page-based destination maps (4 KiB pages).
    pub const PAGE_OFFSET_BITS: u32 = 12;

    /// Default number of cores (one L1 each).
    pub const CORES: usize = 2;

    /// Default cycle limit for a reference run.
    pub const MAX_CYCLES: u64 = 10_000_000;
}

/// Geometry and timing of one cache table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheGeometry {
    /// Total capacity in bytes.
    #[serde(default = "CacheGeometry::default_size")]
    pub size_bytes: usize,

    /// Block size in bytes.
    #[serde(default = "CacheGeometry::default_line")]
    pub line_bytes: usize,

    /// Associativity (ways per set).
    #[serde(default = "CacheGeometry::default_ways")]
    pub ways: usize,

    /// Cycles before a processor response is delivered.
    #[serde(default = "CacheGeometry::default_hit_time")]
    pub hit_time: u64,

    /// Cycles before an outbound message reaches the link.
    #[serde(default = "CacheGeometry::default_l1_lookup")]
    pub lookup_time: u64,
}

impl CacheGeometry {
    fn default_size() -> usize {
        defaults::CACHE_SIZE
    }
    fn default_line() -> usize {
        defaults::CACHE_LINE
    }
    fn default_ways() -> usize {
        defaults::CACHE_WAYS
    }
    fn default_hit_time() -> u64 {
        defaults::HIT_TIME
    }
    fn default_l1_lookup() -> u64 {
        defaults::L1_LOOKUP_TIME
    }

    /// Number of sets implied by size, line size and associativity.
    pub const fn sets(&self) -> usize {
        match self.line_bytes.checked_mul(self.ways) {
            Some(set_bytes) if set_bytes > 0 => self.size_bytes / set_bytes,
            _ => 0,
        }
    }

    /// Checks that the geometry describes a realisable table.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ways == 0 {
            return Err(ConfigError::Geometry("associativity must be at least 1".into()));
        }
        if !self.line_bytes.is_power_of_two() {
            return Err(ConfigError::Geometry(format!(
                "line size {} is not a power of two",
                self.line_bytes
            )));
        }
        let Some(set_bytes) = self.line_bytes.checked_mul(self.ways) else {
            return Err(ConfigError::Geometry(format!(
                "{} ways x {} bytes overflows",
                self.ways, self.line_bytes
            )));
        };
        if self.size_bytes == 0 || self.size_bytes % set_bytes != 0 {
            return Err(ConfigError::Geometry(format!(
                "size {} is not a multiple of {} ways x {} bytes",
                self.size_bytes, self.ways, self.line_bytes
            )));
        }
        if !self.sets().is_power_of_two() {
            return Err(ConfigError::Geometry(format!(
                "set count {} is not a power of two",
                self.sets()
            )));
        }
        Ok(())
    }
}

impl Default for CacheGeometry {
    fn default() -> Self {
        Self {
            size_bytes: defaults::CACHE_SIZE,
            line_bytes: defaults::CACHE_LINE,
            ways: defaults::CACHE_WAYS,
            hit_time: defaults::HIT_TIME,
            lookup_time: defaults::L1_LOOKUP_TIME,
        }
    }
}

/// Settings shared by L1 and L2 cache nodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Cache table geometry.
    #[serde(default)]
    pub cache: CacheGeometry,

    /// Number of MSHR entries.
    #[serde(default = "NodeConfig::default_mshr")]
    pub mshr_entries: usize,

    /// Credits available on the node's outbound link.
    #[serde(default = "NodeConfig::default_credits")]
    pub downstream_credits: u32,
}

impl NodeConfig {
    fn default_mshr() -> usize {
        defaults::MSHR_ENTRIES
    }
    fn default_credits() -> u32 {
        defaults::DOWNSTREAM_CREDITS
    }

    /// Default L1 settings.
    pub fn l1() -> Self {
        Self {
            cache: CacheGeometry::default(),
            mshr_entries: defaults::MSHR_ENTRIES,
            downstream_credits: defaults::DOWNSTREAM_CREDITS,
        }
    }

    /// Default L2 settings: same table shape, longer lookup.
    pub fn l2() -> Self {
        Self {
            cache: CacheGeometry {
                lookup_time: defaults::L2_LOOKUP_TIME,
                ..CacheGeometry::default()
            },
            ..Self::l1()
        }
    }

    /// Validates geometry, MSHR size and credits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;
        if self.mshr_entries == 0 {
            return Err(ConfigError::Invalid("mshr_entries must be at least 1".into()));
        }
        if self.downstream_credits == 0 {
            return Err(ConfigError::Invalid(
                "downstream_credits must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::l1()
    }
}

/// Message-type tags used to dispatch packets for the whole run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTags {
    /// Tag carried by coherence requests and replies.
    #[serde(default = "MessageTags::default_coherence")]
    pub coherence: u32,

    /// Tag carried by memory requests and replies.
    #[serde(default = "MessageTags::default_memory")]
    pub memory: u32,

    /// Tag carried by credit messages.
    #[serde(default = "MessageTags::default_credit")]
    pub credit: u32,
}

impl MessageTags {
    fn default_coherence() -> u32 {
        defaults::TAG_COHERENCE
    }
    fn default_memory() -> u32 {
        defaults::TAG_MEMORY
    }
    fn default_credit() -> u32 {
        defaults::TAG_CREDIT
    }

    /// Rejects tag sets where two message types share a tag.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.coherence == self.memory
            || self.coherence == self.credit
            || self.memory == self.credit
        {
            return Err(ConfigError::Invalid(format!(
                "message tags must be distinct (coherence={}, memory={}, credit={})",
                self.coherence, self.memory, self.credit
            )));
        }
        Ok(())
    }
}

impl Default for MessageTags {
    fn default() -> Self {
        Self {
            coherence: defaults::TAG_COHERENCE,
            memory: defaults::TAG_MEMORY,
            credit: defaults::TAG_CREDIT,
        }
    }
}

/// Memory controller latency model used by the reference kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum MemoryControllerKind {
    /// Fixed latency per access.
    #[default]
    Simple,
    /// Row-buffer model with CAS/RAS/precharge timing.
    #[serde(alias = "DRAM")]
    Dram,
}

/// Memory controller settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Latency model.
    #[serde(default)]
    pub controller: MemoryControllerKind,

    /// Fixed latency for `Simple`.
    #[serde(default = "MemoryConfig::default_latency")]
    pub latency: u64,

    /// CAS latency for `Dram`.
    #[serde(default = "MemoryConfig::default_t_cas")]
    pub t_cas: u64,

    /// RAS latency for `Dram`.
    #[serde(default = "MemoryConfig::default_t_ras")]
    pub t_ras: u64,

    /// Precharge latency for `Dram`.
    #[serde(default = "MemoryConfig::default_t_pre")]
    pub t_pre: u64,
}

impl MemoryConfig {
    fn default_latency() -> u64 {
        defaults::MEMORY_LATENCY
    }
    fn default_t_cas() -> u64 {
        defaults::T_CAS
    }
    fn default_t_ras() -> u64 {
        defaults::T_RAS
    }
    fn default_t_pre() -> u64 {
        defaults::T_PRE
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            controller: MemoryControllerKind::default(),
            latency: defaults::MEMORY_LATENCY,
            t_cas: defaults::T_CAS,
            t_ras: defaults::T_RAS,
            t_pre: defaults::T_PRE,
        }
    }
}

/// Shape of the reference hierarchy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Number of cores, each with a private L1.
    #[serde(default = "TopologyConfig::default_cores")]
    pub cores: usize,

    /// Number of shared L2 banks.
    #[serde(default = "TopologyConfig::default_one")]
    pub l2_nodes: usize,

    /// Number of memory controllers.
    #[serde(default = "TopologyConfig::default_one")]
    pub memory_controllers: usize,

    /// Page offset used to interleave lines across L2 banks and memory controllers.
    #[serde(default = "TopologyConfig::default_page_offset")]
    pub page_offset_bits: u32,

    /// Fixed delivery latency of every link, in cycles.
    #[serde(default = "TopologyConfig::default_link_latency")]
    pub link_latency: u64,
}

impl TopologyConfig {
    fn default_cores() -> usize {
        defaults::CORES
    }
    fn default_one() -> usize {
        1
    }
    fn default_page_offset() -> u32 {
        defaults::PAGE_OFFSET_BITS
    }
    fn default_link_latency() -> u64 {
        defaults::LINK_LATENCY
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            cores: defaults::CORES,
            l2_nodes: 1,
            memory_controllers: 1,
            page_offset_bits: defaults::PAGE_OFFSET_BITS,
            link_latency: defaults::LINK_LATENCY,
        }
    }
}

/// Root configuration structure.
///
/// # Examples
///
/// ```
/// use cohsim_core::config::Config;
///
/// let json = r#"{ "topology": { "cores": 4 }, "l1": { "mshr_entries": 2 } }"#;
/// let config = Config::from_json_str(json).unwrap();
/// assert_eq!(config.topology.cores, 4);
/// assert_eq!(config.l1.mshr_entries, 2);
/// assert_eq!(config.l2.cache.lookup_time, 11);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Hierarchy shape.
    #[serde(default)]
    pub topology: TopologyConfig,

    /// Private L1 settings.
    #[serde(default = "NodeConfig::l1")]
    pub l1: NodeConfig,

    /// Shared L2 settings.
    #[serde(default = "NodeConfig::l2")]
    pub l2: NodeConfig,

    /// Memory controller settings.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Message-type tags for this run.
    #[serde(default)]
    pub tags: MessageTags,

    /// Cycle limit for a reference run.
    #[serde(default = "Config::default_max_cycles")]
    pub max_cycles: u64,
}

impl Config {
    fn default_max_cycles() -> u64 {
        defaults::MAX_CYCLES
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.l1.validate()?;
        self.l2.validate()?;
        self.tags.validate()?;
        let topo = &self.topology;
        if topo.cores == 0 || topo.l2_nodes == 0 || topo.memory_controllers == 0 {
            return Err(ConfigError::Invalid(
                "topology needs at least one core, L2 bank and memory controller".into(),
            ));
        }
        if topo.page_offset_bits >= 64 {
            return Err(ConfigError::Invalid(format!(
                "page_offset_bits {} is out of range",
                topo.page_offset_bits
            )));
        }
        if self.l1.cache.line_bytes != self.l2.cache.line_bytes {
            return Err(ConfigError::Invalid(format!(
                "L1 line size {} differs from L2 line size {}",
                self.l1.cache.line_bytes, self.l2.cache.line_bytes
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            topology: TopologyConfig::default(),
            l1: NodeConfig::l1(),
            l2: NodeConfig::l2(),
            memory: MemoryConfig::default(),
            tags: MessageTags::default(),
            max_cycles: defaults::MAX_CYCLES,
        }
    }
}
