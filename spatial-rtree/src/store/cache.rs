//! LRU cache of decoded nodes for the paged file backend.
//!
//! The cache is write-through: the file is always updated before the cache,
//! so evicting a node never needs a write. Pages are only cached once they
//! have been read or written, nothing is preloaded.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::node::Node;

/// Bounded node cache keyed by page offset. A capacity of zero disables
/// caching entirely.
pub struct NodeCache {
    nodes: Option<LruCache<u64, Node>>,
}

impl NodeCache {
    pub fn new(capacity: usize) -> Self {
        NodeCache {
            nodes: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    /// Returns a copy of the cached node, marking it most recently used.
    pub fn get(&mut self, offset: u64) -> Option<Node> {
        self.nodes.as_mut()?.get(&offset).cloned()
    }

    /// Caches `node`, evicting the least recently used node when full.
    pub fn insert(&mut self, offset: u64, node: Node) {
        if let Some(nodes) = self.nodes.as_mut() {
            nodes.put(offset, node);
        }
    }

    pub fn remove(&mut self, offset: u64) {
        if let Some(nodes) = self.nodes.as_mut() {
            nodes.pop(&offset);
        }
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.nodes
            .as_ref()
            .is_some_and(|nodes| nodes.contains(&offset))
    }

    pub fn len(&self) -> usize {
        self.nodes.as_ref().map_or(0, LruCache::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_new() {
        let cache = NodeCache::new(10);
        assert_eq!(cache.len(), 0);
        assert!(!cache.contains(4096));
    }

    #[test]
    fn test_cache_insert_and_get() {
        let mut cache = NodeCache::new(10);
        cache.insert(4096, Node::new(0));
        assert!(cache.contains(4096));
        assert_eq!(cache.get(4096), Some(Node::new(0)));
        assert_eq!(cache.get(8192), None);
    }

    #[test]
    fn test_cache_lru_eviction() {
        let mut cache = NodeCache::new(3);
        cache.insert(1, Node::new(0));
        cache.insert(2, Node::new(0));
        cache.insert(3, Node::new(0));

        // Touch 1 so that 2 becomes the oldest.
        assert!(cache.get(1).is_some());
        cache.insert(4, Node::new(0));

        assert_eq!(cache.len(), 3);
        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert!(cache.contains(3));
        assert!(cache.contains(4));
    }

    #[test]
    fn test_cache_overwrite_and_remove() {
        let mut cache = NodeCache::new(2);
        cache.insert(1, Node::new(0));
        cache.insert(1, Node::new(5));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(1).map(|node| node.level), Some(5));

        cache.remove(1);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get(1), None);
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let mut cache = NodeCache::new(0);
        cache.insert(1, Node::new(0));
        assert_eq!(cache.len(), 0);
        assert!(!cache.contains(1));
        assert_eq!(cache.get(1), None);
    }
}
