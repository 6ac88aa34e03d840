//! Node, branch and child reference types shared by every storage backend.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::rect::Rect;

/// Caller-supplied identifier of an indexed object.
pub type EntryId = u64;

/// Opaque handle to a node inside a [`NodeStore`](crate::store::NodeStore).
///
/// The memory backend uses arena slot numbers, the file backend uses byte
/// offsets of pages. Engine code never interprets the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        NodeId(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a branch points at: a child node (internal levels) or an indexed
/// object (leaf level).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChildRef {
    Node(NodeId),
    Entry(EntryId),
}

impl ChildRef {
    #[inline]
    pub fn is_entry(&self) -> bool {
        matches!(self, ChildRef::Entry(_))
    }

    #[inline]
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            ChildRef::Node(id) => Some(*id),
            ChildRef::Entry(_) => None,
        }
    }
}

/// A bounding rectangle paired with the child it summarizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub rect: Rect,
    pub child: ChildRef,
}

impl Branch {
    pub fn entry(rect: Rect, id: EntryId) -> Self {
        Branch {
            rect,
            child: ChildRef::Entry(id),
        }
    }

    pub fn subtree(rect: Rect, node: NodeId) -> Self {
        Branch {
            rect,
            child: ChildRef::Node(node),
        }
    }
}

/// A tree node. Leaves are level 0 and hold entry branches; every other
/// level holds subtree branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub level: u32,
    pub branches: Vec<Branch>,
}

impl Node {
    pub fn new(level: u32) -> Self {
        Node {
            level,
            branches: Vec::new(),
        }
    }

    pub fn with_branches(level: u32, branches: Vec<Branch>) -> Self {
        Node { level, branches }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Tightest rectangle covering every branch; null for an empty node.
    pub fn cover(&self, ndims: usize) -> Rect {
        let mut rect = Rect::null(ndims);
        for branch in &self.branches {
            rect.expand(&branch.rect);
        }
        rect
    }

    /// Structural checks applied to every node read back from storage.
    pub(crate) fn check_shape(&self, ndims: usize, max_branches: usize) -> Result<(), String> {
        if self.branches.len() > max_branches {
            return Err(format!(
                "node at level {} has {} branches, capacity is {}",
                self.level,
                self.branches.len(),
                max_branches
            ));
        }
        for (i, branch) in self.branches.iter().enumerate() {
            if branch.rect.ndims() != ndims {
                return Err(format!(
                    "branch {} has {} dimensions, expected {}",
                    i,
                    branch.rect.ndims(),
                    ndims
                ));
            }
            if branch.child.is_entry() != self.is_leaf() {
                return Err(format!(
                    "branch {} child kind does not match node level {}",
                    i, self.level
                ));
            }
        }
        Ok(())
    }
}
