//! Address-to-node destination maps.
//!
//! Cache nodes never hard-code where a line's manager or memory controller
//! lives; they ask a `DestMap`. Two maps are provided:
//!
//! - `PageBasedMap`: interleaves pages across a list of nodes.
//! - `SingleNodeMap`: sends everything to one node.

use crate::common::{ConfigError, NodeId};

/// Maps an address to the node responsible for it.
pub trait DestMap {
    /// Returns the destination node for `addr`.
    fn lookup(&self, addr: u64) -> NodeId;
}

/// Page-interleaved map.
///
/// The page number (`addr >> page_offset_bits`) selects a node by its low
/// bits. Only the largest power-of-two prefix of the node list is used, so a
/// list of three nodes interleaves over the first two.
#[derive(Clone, Debug)]
pub struct PageBasedMap {
    nodes: Vec<NodeId>,
    page_offset_bits: u32,
    mask: u64,
}

impl PageBasedMap {
    /// Creates a map over `nodes`.
    ///
    /// # Arguments
    ///
    /// * `nodes` - Candidate destinations, in interleave order.
    /// * `page_offset_bits` - log2 of the interleave granularity in bytes.
    ///
    /// # Returns
    ///
    /// The map, or `ConfigError::Invalid` if `nodes` is empty or the offset is
    /// not below 64.
    pub fn new(nodes: Vec<NodeId>, page_offset_bits: u32) -> Result<Self, ConfigError> {
        if nodes.is_empty() {
            return Err(ConfigError::Invalid(
                "page-based map needs at least one node".into(),
            ));
        }
        if page_offset_bits >= 64 {
            return Err(ConfigError::Invalid(format!(
                "page offset {page_offset_bits} is out of range"
            )));
        }
        let log2 = usize::BITS - 1 - nodes.len().leading_zeros();
        Ok(Self {
            nodes,
            page_offset_bits,
            mask: (1u64 << log2) - 1,
        })
    }

    /// Nodes the map interleaves over, in list order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }
}

impl DestMap for PageBasedMap {
    fn lookup(&self, addr: u64) -> NodeId {
        let idx = (addr >> self.page_offset_bits) & self.mask;
        self.nodes[idx as usize]
    }
}

/// Map that routes every address to one node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SingleNodeMap(pub NodeId);

impl DestMap for SingleNodeMap {
    fn lookup(&self, _addr: u64) -> NodeId {
        self.0
    }
}

impl<M: DestMap + ?Sized> DestMap for Box<M> {
    fn lookup(&self, addr: u64) -> NodeId {
        (**self).lookup(addr)
    }
}
