//! Structural verification of a whole tree.

use std::collections::HashSet;

use crate::errors::{RTreeError, RTreeResult};
use crate::node::{ChildRef, NodeId};
use crate::rect::Rect;
use crate::tree::RTree;

/// Result of [`RTree::check_integrity`].
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    /// Nodes that were read and checked
    pub nodes_checked: u64,
    /// Leaf entries reachable from the root
    pub entries_found: u64,
    pub height: u32,
    /// Nodes that could not be read back
    pub corrupted_nodes: Vec<NodeId>,
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn new() -> Self {
        Self {
            nodes_checked: 0,
            entries_found: 0,
            height: 0,
            corrupted_nodes: Vec::new(),
            is_valid: true,
            errors: Vec::new(),
        }
    }

    fn fail(&mut self, error: String) {
        self.is_valid = false;
        self.errors.push(error);
    }
}

impl Default for IntegrityReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RTree {
    /// Walks every node and verifies:
    /// - each node sits exactly one level below its parent, so all leaves
    ///   share one depth
    /// - each parent branch rectangle equals the cover of its child
    /// - non-root nodes hold between the minimum and maximum branch count,
    ///   and an internal root holds at least two
    /// - leaves hold entries only, internal nodes hold subtrees only
    /// - no node is reachable twice
    /// - the number of leaf entries matches [`RTree::len`]
    ///
    /// Findings are collected in the report. Only I/O failures are returned
    /// as errors.
    pub fn check_integrity(&self) -> RTreeResult<IntegrityReport> {
        let mut report = IntegrityReport::new();
        report.height = self.height();
        let ndims = self.ndims();
        let card = *self.card();
        let store = self.store();

        let mut visited = HashSet::new();
        let mut stack: Vec<(NodeId, u32, Option<Rect>)> =
            vec![(self.root_id(), self.height().saturating_sub(1), None)];

        while let Some((id, level, parent_rect)) = stack.pop() {
            if !visited.insert(id) {
                report.fail(format!("node {} is reachable more than once", id));
                continue;
            }
            let node = match store.read(id) {
                Ok(node) => node,
                Err(RTreeError::Io(e)) => return Err(RTreeError::Io(e)),
                Err(e) => {
                    report.corrupted_nodes.push(id);
                    report.fail(format!("node {}: {}", id, e));
                    continue;
                }
            };
            report.nodes_checked += 1;

            if node.level != level {
                report.fail(format!(
                    "node {} has level {}, expected {}",
                    id, node.level, level
                ));
            }

            let max = card.max_branches(node.level);
            if node.len() > max {
                report.fail(format!(
                    "node {} holds {} branches, maximum is {}",
                    id,
                    node.len(),
                    max
                ));
            }
            match parent_rect {
                None => {
                    if !node.is_leaf() && node.len() < 2 {
                        report.fail(format!(
                            "internal root {} has {} children",
                            id,
                            node.len()
                        ));
                    }
                }
                Some(rect) => {
                    let min = card.min_branches(node.level);
                    if node.len() < min {
                        report.fail(format!(
                            "node {} holds {} branches, minimum is {}",
                            id,
                            node.len(),
                            min
                        ));
                    }
                    let cover = node.cover(ndims);
                    if cover != rect {
                        report.fail(format!(
                            "branch rectangle {} of node {} differs from its cover {}",
                            rect, id, cover
                        ));
                    }
                }
            }

            for (index, branch) in node.branches.iter().enumerate() {
                if branch.rect.ndims() != ndims || branch.rect.is_null() {
                    report.fail(format!("branch {} of node {} has an invalid rectangle", index, id));
                }
                match branch.child {
                    ChildRef::Entry(_) if node.is_leaf() => report.entries_found += 1,
                    ChildRef::Entry(entry) => report.fail(format!(
                        "internal node {} holds entry {} in branch {}",
                        id, entry, index
                    )),
                    ChildRef::Node(child) if node.is_leaf() => report.fail(format!(
                        "leaf {} holds node {} in branch {}",
                        id, child, index
                    )),
                    ChildRef::Node(child) => stack.push((child, node.level - 1, Some(branch.rect))),
                }
            }
        }

        if report.entries_found != self.len() {
            report.fail(format!(
                "tree records {} entries but {} are reachable",
                self.len(),
                report.entries_found
            ));
        }
        Ok(report)
    }
}
