//! In-memory node arena.

use crate::errors::{RTreeError, RTreeResult};
use crate::node::{Node, NodeId};

use super::{NodeStore, StoreStats, TreeMeta};

/// Keeps nodes in a slot arena. Handles are slot numbers; freed slots are
/// reused before the arena grows.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Vec<Option<Node>>,
    free_slots: Vec<usize>,
    meta: Option<TreeMeta>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: NodeId) -> RTreeResult<&Node> {
        usize::try_from(id.get())
            .ok()
            .and_then(|index| self.slots.get(index))
            .and_then(Option::as_ref)
            .ok_or_else(|| RTreeError::InvalidOperation(format!("node {} is not allocated", id)))
    }

    fn slot_mut(&mut self, id: NodeId) -> RTreeResult<&mut Option<Node>> {
        let slot = usize::try_from(id.get())
            .ok()
            .and_then(|index| self.slots.get_mut(index))
            .ok_or_else(|| RTreeError::InvalidOperation(format!("node {} is out of range", id)))?;
        if slot.is_none() {
            return Err(RTreeError::InvalidOperation(format!(
                "node {} is not allocated",
                id
            )));
        }
        Ok(slot)
    }
}

impl NodeStore for MemoryStore {
    fn allocate(&mut self, level: u32) -> RTreeResult<NodeId> {
        let node = Node::new(level);
        let index = match self.free_slots.pop() {
            Some(index) => {
                self.slots[index] = Some(node);
                index
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        Ok(NodeId::new(index as u64))
    }

    fn read(&self, id: NodeId) -> RTreeResult<Node> {
        self.slot(id).cloned()
    }

    fn write(&mut self, id: NodeId, node: &Node) -> RTreeResult<()> {
        let slot = self.slot_mut(id)?;
        *slot = Some(node.clone());
        Ok(())
    }

    fn free(&mut self, id: NodeId) -> RTreeResult<()> {
        let slot = self.slot_mut(id)?;
        *slot = None;
        self.free_slots.push(id.get() as usize);
        Ok(())
    }

    fn contains(&self, id: NodeId) -> bool {
        self.slot(id).is_ok()
    }

    fn load_meta(&self) -> Option<TreeMeta> {
        self.meta
    }

    fn store_meta(&mut self, meta: &TreeMeta) -> RTreeResult<()> {
        self.meta = Some(*meta);
        Ok(())
    }

    fn flush(&mut self) -> RTreeResult<()> {
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            live_nodes: (self.slots.len() - self.free_slots.len()) as u64,
            ..StoreStats::default()
        }
    }
}
