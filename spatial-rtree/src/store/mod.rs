//! Node storage backends.
//!
//! The tree engine only talks to a [`NodeStore`]: it allocates handles,
//! reads nodes by value, writes them back and frees them. Two backends are
//! provided:
//! - [`MemoryStore`]: an arena of nodes indexed by slot
//! - [`FileStore`]: fixed-size pages in a file, one node per page, with an
//!   LRU cache of decoded nodes and a free list threaded through freed pages
//!
//! Every mutating engine operation writes (or frees) each node it touched
//! before returning, so no backend ever holds a half-updated node.

pub mod cache;
pub mod file;
pub mod memory;
pub(crate) mod page;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::card::CardPolicy;
use crate::errors::RTreeResult;
use crate::node::{Node, NodeId};

/// Tree-level metadata a backend persists alongside its nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeMeta {
    pub root: NodeId,
    /// Number of levels; a lone leaf root has height 1.
    pub height: u32,
    pub entry_count: u64,
    pub card: CardPolicy,
}

/// Counters reported by a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub live_nodes: u64,
    pub cached_nodes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
}

/// Storage contract shared by the in-memory and paged-file backends.
pub trait NodeStore: Send + Sync {
    /// Allocates a handle holding an empty node of `level`.
    fn allocate(&mut self, level: u32) -> RTreeResult<NodeId>;

    /// Reads a copy of the node behind `id`.
    fn read(&self, id: NodeId) -> RTreeResult<Node>;

    /// Replaces the node behind `id`.
    fn write(&mut self, id: NodeId, node: &Node) -> RTreeResult<()>;

    /// Releases `id` for reuse.
    fn free(&mut self, id: NodeId) -> RTreeResult<()>;

    /// Returns true if `id` names a live node.
    fn contains(&self, id: NodeId) -> bool;

    /// Metadata last stored, or `None` for a store that never held a tree.
    fn load_meta(&self) -> Option<TreeMeta>;

    fn store_meta(&mut self, meta: &TreeMeta) -> RTreeResult<()>;

    /// Makes everything written so far durable.
    fn flush(&mut self) -> RTreeResult<()>;

    fn stats(&self) -> StoreStats;

    /// Largest fan-out a node may have in this backend, if bounded.
    fn page_capacity(&self) -> Option<usize> {
        None
    }

    /// Current root handle, if a tree was ever stored.
    fn root_handle(&self) -> Option<NodeId> {
        self.load_meta().map(|meta| meta.root)
    }
}
