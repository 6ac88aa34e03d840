//! The R-tree handle: insertion, deletion, search and lifecycle.

use std::ops::ControlFlow;
use std::path::Path;

use crate::card::CardPolicy;
use crate::config::{RTreeConfig, SplitStrategy, StorageMode};
use crate::constants::DEFAULT_CACHE_PAGES;
use crate::errors::{RTreeError, RTreeResult};
use crate::node::{Branch, ChildRef, EntryId, Node, NodeId};
use crate::rect::{CoverMetric, Rect};
use crate::split::{quadratic_split, take_farthest};
use crate::store::{FileStore, MemoryStore, NodeStore, TreeMeta};

/// Counters describing a tree and its backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RTreeStats {
    pub total_entries: u64,
    pub tree_height: u32,
    pub node_count: u64,
    pub cached_nodes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
}

/// One step of a root-to-node descent: the node read at `id` and the index
/// of the branch that was followed out of it.
struct PathStep {
    id: NodeId,
    node: Node,
    index: usize,
}

/// A height-balanced R-tree over rectangles of a fixed dimensionality.
///
/// Mutations take `&mut self`; searches take `&self` and may run
/// concurrently when the tree is shared without a writer. Every node an
/// operation touches is written back (or freed) before it returns.
///
/// ```rust
/// use spatial_rtree::{RTree, RTreeConfig, Rect};
///
/// let mut tree = RTree::in_memory(RTreeConfig::new(2).unwrap()).unwrap();
/// tree.insert(&Rect::new(&[0.0, 0.0], &[1.0, 1.0]).unwrap(), 7).unwrap();
///
/// let query = Rect::new(&[0.5, 0.5], &[2.0, 2.0]).unwrap();
/// assert_eq!(tree.find_intersecting(&query).unwrap(), vec![7]);
/// ```
pub struct RTree {
    store: Box<dyn NodeStore>,
    config: RTreeConfig,
    root: NodeId,
    height: u32,
    entry_count: u64,
    closed: bool,
}

impl RTree {
    /// Creates an empty tree holding a single empty leaf. File mode creates
    /// or truncates the file.
    pub fn create(storage: StorageMode, config: RTreeConfig) -> RTreeResult<Self> {
        let store: Box<dyn NodeStore> = match &storage {
            StorageMode::Memory => Box::new(MemoryStore::new()),
            StorageMode::File(path) => Box::new(FileStore::create(path, &config)?),
        };
        let tree = Self::with_store(store, config)?;
        log::debug!(
            "Created {}-dimensional R-tree ({:?}, node max {}, leaf max {})",
            tree.ndims(),
            storage,
            tree.node_max(),
            tree.leaf_max()
        );
        Ok(tree)
    }

    pub fn in_memory(config: RTreeConfig) -> RTreeResult<Self> {
        Self::create(StorageMode::Memory, config)
    }

    /// Opens a file-backed tree. Only the header and root page are read.
    pub fn open(path: impl AsRef<Path>) -> RTreeResult<Self> {
        Self::open_with_cache_size(path, DEFAULT_CACHE_PAGES)
    }

    pub fn open_with_cache_size(path: impl AsRef<Path>, cache_pages: usize) -> RTreeResult<Self> {
        let (store, config) = FileStore::open(path.as_ref(), cache_pages)?;
        if store.load_meta().is_none() {
            return Err(RTreeError::CorruptStorage(
                "file header does not name a root node".to_string(),
            ));
        }
        Self::with_store(Box::new(store), config)
    }

    /// Builds a tree on any [`NodeStore`]. A store that already holds a tree
    /// is reattached; an empty one gets a fresh leaf root.
    pub fn with_store(mut store: Box<dyn NodeStore>, mut config: RTreeConfig) -> RTreeResult<Self> {
        if let Some(meta) = store.load_meta() {
            config.set_card(meta.card)?;
            let root = store.read(meta.root)?;
            if meta.height == 0 || root.level + 1 != meta.height {
                return Err(RTreeError::CorruptStorage(format!(
                    "root node has level {} but the tree height is {}",
                    root.level, meta.height
                )));
            }
            return Ok(RTree {
                store,
                config,
                root: meta.root,
                height: meta.height,
                entry_count: meta.entry_count,
                closed: false,
            });
        }

        let root = store.allocate(0)?;
        let mut tree = RTree {
            store,
            config,
            root,
            height: 1,
            entry_count: 0,
            closed: false,
        };
        tree.persist_meta()?;
        Ok(tree)
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.entry_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Number of levels; a tree whose root is a leaf has height 1.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn ndims(&self) -> usize {
        self.config.ndims()
    }

    pub fn config(&self) -> &RTreeConfig {
        &self.config
    }

    pub fn card(&self) -> &CardPolicy {
        self.config.card()
    }

    pub fn node_max(&self) -> usize {
        self.config.card().node_max()
    }

    pub fn leaf_max(&self) -> usize {
        self.config.card().leaf_max()
    }

    /// Changes the internal-node fan-out. Only allowed while the tree is
    /// empty.
    pub fn set_node_max(&mut self, node_max: usize) -> RTreeResult<()> {
        self.ensure_empty()?;
        let mut card = *self.config.card();
        card.set_node_max(node_max, self.config.min_fill_ratio())?;
        self.apply_card(card)
    }

    /// Changes the leaf fan-out. Only allowed while the tree is empty.
    pub fn set_leaf_max(&mut self, leaf_max: usize) -> RTreeResult<()> {
        self.ensure_empty()?;
        let mut card = *self.config.card();
        card.set_leaf_max(leaf_max, self.config.min_fill_ratio())?;
        self.apply_card(card)
    }

    /// Returns true if `child` can be stored in a branch: entry payloads
    /// always can, node references only when they name a live node.
    pub fn valid_child(&self, child: &ChildRef) -> bool {
        match child {
            ChildRef::Entry(_) => true,
            ChildRef::Node(id) => self.store.contains(*id),
        }
    }

    /// Indexes `rect` under `id`. The same id may be inserted more than
    /// once, with the same or different rectangles.
    pub fn insert(&mut self, rect: &Rect, id: EntryId) -> RTreeResult<()> {
        self.check_entry_rect(rect)?;
        self.insert_branch(Branch::entry(*rect, id), 0)?;
        self.entry_count += 1;
        self.persist_meta()
    }

    /// Removes one entry with payload `id` whose rectangle contains `rect`.
    /// Returns `Ok(false)` when no such entry exists.
    pub fn delete(&mut self, rect: &Rect, id: EntryId) -> RTreeResult<bool> {
        self.check_entry_rect(rect)?;
        let root = self.store.read(self.root)?;
        let mut path = Vec::with_capacity(self.height as usize);
        if !self.locate(self.root, root, rect, id, &mut path)? {
            return Ok(false);
        }
        self.condense(path)?;
        self.entry_count -= 1;
        self.persist_meta()?;
        Ok(true)
    }

    /// Calls `on_hit` for every entry whose rectangle overlaps `rect`
    /// (touching counts). Returning `ControlFlow::Break` stops the search
    /// without reading further nodes. Returns the number of hits reported,
    /// including the one that stopped the search.
    pub fn search<F>(&self, rect: &Rect, mut on_hit: F) -> RTreeResult<usize>
    where
        F: FnMut(EntryId, &Rect) -> ControlFlow<()>,
    {
        self.check_dims(rect)?;
        let mut hits = 0;
        // A break only ends the walk; the count already includes the hit
        // that asked for it.
        let _flow = self.search_node(self.root, rect, &mut on_hit, &mut hits)?;
        Ok(hits)
    }

    /// Ids of every entry overlapping `rect`, in traversal order.
    pub fn find_intersecting(&self, rect: &Rect) -> RTreeResult<Vec<EntryId>> {
        let mut found = Vec::new();
        self.search(rect, |id, _| {
            found.push(id);
            ControlFlow::Continue(())
        })?;
        Ok(found)
    }

    /// Ids of every entry whose rectangle lies inside `rect`.
    pub fn find_contained(&self, rect: &Rect) -> RTreeResult<Vec<EntryId>> {
        self.check_dims(rect)?;
        let mut found = Vec::new();
        self.contained_in_node(self.root, rect, &mut found)?;
        Ok(found)
    }

    /// The `k` entries nearest to `point`, measured from the point to the
    /// closest point of each entry's rectangle. Sorted by distance; equal
    /// distances keep traversal order.
    pub fn find_nearest(
        &self,
        point: &[f64],
        k: usize,
        max_distance: Option<f64>,
    ) -> RTreeResult<Vec<(EntryId, f64)>> {
        if point.len() != self.ndims() {
            return Err(RTreeError::DimensionMismatch {
                expected: self.ndims(),
                actual: point.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        let mut bound = max_distance.unwrap_or(f64::INFINITY);
        self.nearest_in_node(self.root, point, k, &mut results, &mut bound)?;
        results.sort_by(|a, b| a.1.total_cmp(&b.1));
        results.truncate(k);
        Ok(results)
    }

    /// Frees every node and starts over with a single empty leaf root.
    pub fn clear(&mut self) -> RTreeResult<()> {
        let mut pending = vec![self.root];
        while let Some(id) = pending.pop() {
            let node = self.store.read(id)?;
            pending.extend(node.branches.iter().filter_map(|b| b.child.as_node()));
            self.store.free(id)?;
        }
        self.root = self.store.allocate(0)?;
        self.height = 1;
        self.entry_count = 0;
        self.persist_meta()?;
        log::debug!("Cleared R-tree");
        Ok(())
    }

    pub fn flush(&mut self) -> RTreeResult<()> {
        self.persist_meta()?;
        self.store.flush()
    }

    /// Flushes and releases the backend.
    pub fn close(mut self) -> RTreeResult<()> {
        self.flush()?;
        self.closed = true;
        log::debug!("Closed R-tree with {} entries", self.entry_count);
        Ok(())
    }

    pub fn stats(&self) -> RTreeStats {
        let store = self.store.stats();
        RTreeStats {
            total_entries: self.entry_count,
            tree_height: self.height,
            node_count: store.live_nodes,
            cached_nodes: store.cached_nodes,
            cache_hits: store.cache_hits,
            cache_misses: store.cache_misses,
            disk_reads: store.disk_reads,
            disk_writes: store.disk_writes,
        }
    }

    /// Indented rendering of every node, root first.
    pub fn dump(&self) -> RTreeResult<String> {
        let mut out = String::new();
        self.dump_node(self.root, 0, &mut out)?;
        Ok(out)
    }

    pub(crate) fn store(&self) -> &dyn NodeStore {
        self.store.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn store_mut(&mut self) -> &mut dyn NodeStore {
        self.store.as_mut()
    }

    pub(crate) fn root_id(&self) -> NodeId {
        self.root
    }

    // ---------------------------------------------------------------------
    // Insertion
    // ---------------------------------------------------------------------

    /// Inserts `branch` into a node at `level`, handling every overflow it
    /// causes, including branches queued by forced reinsertion.
    pub(crate) fn insert_branch(&mut self, branch: Branch, level: u32) -> RTreeResult<()> {
        if level >= self.height {
            return Err(RTreeError::InvalidOperation(format!(
                "cannot insert at level {} into a tree of height {}",
                level, self.height
            )));
        }

        let mut pending = vec![(branch, level)];
        let mut reinserted_levels = Vec::new();
        while let Some((branch, level)) = pending.pop() {
            self.insert_one(branch, level, &mut reinserted_levels, &mut pending)?;
        }
        Ok(())
    }

    fn insert_one(
        &mut self,
        branch: Branch,
        level: u32,
        reinserted_levels: &mut Vec<bool>,
        pending: &mut Vec<(Branch, u32)>,
    ) -> RTreeResult<()> {
        let ndims = self.ndims();
        let (mut path, mut node_id, mut node) = self.choose_path(&branch.rect, level)?;
        node.branches.push(branch);

        loop {
            if node.len() <= self.card().max_branches(node.level) {
                self.store.write(node_id, &node)?;
                return self.tighten(path, node.cover(ndims));
            }

            if let SplitStrategy::ForcedReinsert { count } = self.config.split_strategy() {
                let slot = node.level as usize;
                if node_id != self.root && !reinserted_levels.get(slot).copied().unwrap_or(false) {
                    if reinserted_levels.len() <= slot {
                        reinserted_levels.resize(slot + 1, false);
                    }
                    reinserted_levels[slot] = true;

                    let victims = take_farthest(&mut node, count, ndims);
                    log::trace!(
                        "Forced reinsertion of {} branches from node {} at level {}",
                        victims.len(),
                        node_id,
                        node.level
                    );
                    self.store.write(node_id, &node)?;
                    self.tighten(path, node.cover(ndims))?;
                    // Victims come farthest first; the nearest is popped first.
                    pending.extend(victims.into_iter().map(|victim| (victim, node.level)));
                    return Ok(());
                }
            }

            let level = node.level;
            let (left, right) = quadratic_split(
                node.branches,
                self.card().min_branches(level),
                self.config.cover_metric(),
            );
            let left = Node::with_branches(level, left);
            let right = Node::with_branches(level, right);
            let left_cover = left.cover(ndims);
            let right_cover = right.cover(ndims);

            let right_id = self.store.allocate(level)?;
            self.store.write(right_id, &right)?;
            self.store.write(node_id, &left)?;
            log::trace!(
                "Split node {} at level {} into {} + {} ({} branches moved to {})",
                node_id,
                level,
                left.len(),
                right.len(),
                right.len(),
                right_id
            );

            match path.pop() {
                Some(PathStep {
                    id,
                    node: mut parent,
                    index,
                }) => {
                    parent.branches[index].rect = left_cover;
                    parent.branches.push(Branch::subtree(right_cover, right_id));
                    node_id = id;
                    node = parent;
                }
                None => {
                    let root = Node::with_branches(
                        level + 1,
                        vec![
                            Branch::subtree(left_cover, node_id),
                            Branch::subtree(right_cover, right_id),
                        ],
                    );
                    let root_id = self.store.allocate(level + 1)?;
                    self.store.write(root_id, &root)?;
                    self.root = root_id;
                    self.height += 1;
                    log::trace!("Root split, tree height is now {}", self.height);
                    return Ok(());
                }
            }
        }
    }

    /// Descends from the root to the node at `level` that needs the least
    /// enlargement to cover `rect`.
    fn choose_path(&self, rect: &Rect, level: u32) -> RTreeResult<(Vec<PathStep>, NodeId, Node)> {
        let metric = self.config.cover_metric();
        let mut path = Vec::with_capacity(self.height as usize);
        let mut id = self.root;
        let mut node = self.store.read(id)?;

        while node.level > level {
            let index = pick_branch(&node, rect, metric).ok_or_else(|| {
                RTreeError::CorruptStorage(format!("internal node {} has no branches", id))
            })?;
            let child_id = node.branches[index].child.as_node().ok_or_else(|| {
                RTreeError::CorruptStorage(format!("internal node {} holds an entry", id))
            })?;
            let child = self.store.read(child_id)?;
            if child.level + 1 != node.level {
                return Err(RTreeError::CorruptStorage(format!(
                    "node {} at level {} has child {} at level {}",
                    id, node.level, child_id, child.level
                )));
            }
            path.push(PathStep { id, node, index });
            id = child_id;
            node = child;
        }
        Ok((path, id, node))
    }

    /// Sets the followed branch of each path step to the cover of the node
    /// below it, bottom-up, stopping once a rectangle is already exact.
    fn tighten(&mut self, path: Vec<PathStep>, mut cover: Rect) -> RTreeResult<()> {
        let ndims = self.ndims();
        for mut step in path.into_iter().rev() {
            if step.node.branches[step.index].rect == cover {
                break;
            }
            step.node.branches[step.index].rect = cover;
            self.store.write(step.id, &step.node)?;
            cover = step.node.cover(ndims);
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Deletion
    // ---------------------------------------------------------------------

    /// Depth-first search for the leaf branch holding `entry` inside `rect`.
    /// On success `path` runs from the root to the leaf, the last step's
    /// index naming the matching branch.
    fn locate(
        &self,
        id: NodeId,
        node: Node,
        rect: &Rect,
        entry: EntryId,
        path: &mut Vec<PathStep>,
    ) -> RTreeResult<bool> {
        if node.is_leaf() {
            let found = node
                .branches
                .iter()
                .position(|b| b.child == ChildRef::Entry(entry) && b.rect.contains(rect));
            return Ok(match found {
                Some(index) => {
                    path.push(PathStep { id, node, index });
                    true
                }
                None => false,
            });
        }

        let mut node = node;
        for index in 0..node.len() {
            let branch = node.branches[index];
            if !branch.rect.contains(rect) {
                continue;
            }
            let child_id = branch.child.as_node().ok_or_else(|| {
                RTreeError::CorruptStorage(format!("internal node {} holds an entry", id))
            })?;
            let child = self.store.read(child_id)?;
            path.push(PathStep { id, node, index });
            if self.locate(child_id, child, rect, entry, path)? {
                return Ok(true);
            }
            node = match path.pop() {
                Some(step) => step.node,
                None => {
                    return Err(RTreeError::InvalidOperation(
                        "deletion path lost its parent".to_string(),
                    ))
                }
            };
        }
        Ok(false)
    }

    /// Removes the branch named by the last path step, then walks back up:
    /// underfull nodes are dissolved and their branches reinserted at their
    /// own level once the root is reached.
    fn condense(&mut self, mut path: Vec<PathStep>) -> RTreeResult<()> {
        let ndims = self.ndims();
        let Some(leaf) = path.pop() else {
            return Err(RTreeError::InvalidOperation(
                "deletion path is empty".to_string(),
            ));
        };

        let mut current_id = leaf.id;
        let mut current = leaf.node;
        current.branches.remove(leaf.index);
        let mut orphans: Vec<(Branch, u32)> = Vec::new();

        while let Some(mut parent) = path.pop() {
            if current.len() < self.card().min_branches(current.level) {
                log::trace!(
                    "Dissolving underfull node {} at level {} ({} branches)",
                    current_id,
                    current.level,
                    current.len()
                );
                orphans.extend(current.branches.iter().map(|b| (*b, current.level)));
                self.store.free(current_id)?;
                parent.node.branches.remove(parent.index);
            } else {
                self.store.write(current_id, &current)?;
                parent.node.branches[parent.index].rect = current.cover(ndims);
            }
            current_id = parent.id;
            current = parent.node;
        }
        self.store.write(current_id, &current)?;

        if !orphans.is_empty() {
            log::trace!("Reinserting {} orphaned branches", orphans.len());
        }
        for (branch, level) in orphans {
            self.insert_branch(branch, level)?;
        }
        self.shrink_root()
    }

    /// Replaces an internal root that has a single child by that child.
    fn shrink_root(&mut self) -> RTreeResult<()> {
        loop {
            let root = self.store.read(self.root)?;
            if root.is_leaf() {
                return Ok(());
            }
            match root.len() {
                0 => {
                    self.store.write(self.root, &Node::new(0))?;
                    self.height = 1;
                    return Ok(());
                }
                1 => {
                    let child = root.branches[0].child.as_node().ok_or_else(|| {
                        RTreeError::CorruptStorage(format!(
                            "internal root {} holds an entry",
                            self.root
                        ))
                    })?;
                    self.store.free(self.root)?;
                    self.root = child;
                    self.height -= 1;
                    log::trace!("Root shrunk, tree height is now {}", self.height);
                }
                _ => return Ok(()),
            }
        }
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    fn search_node<F>(
        &self,
        id: NodeId,
        rect: &Rect,
        on_hit: &mut F,
        hits: &mut usize,
    ) -> RTreeResult<ControlFlow<()>>
    where
        F: FnMut(EntryId, &Rect) -> ControlFlow<()>,
    {
        let node = self.store.read(id)?;
        for branch in &node.branches {
            if !branch.rect.overlaps(rect) {
                continue;
            }
            let flow = match branch.child {
                ChildRef::Entry(entry) => {
                    *hits += 1;
                    on_hit(entry, &branch.rect)
                }
                ChildRef::Node(child) => self.search_node(child, rect, on_hit, hits)?,
            };
            if flow.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn contained_in_node(&self, id: NodeId, rect: &Rect, found: &mut Vec<EntryId>) -> RTreeResult<()> {
        let node = self.store.read(id)?;
        for branch in &node.branches {
            match branch.child {
                ChildRef::Entry(entry) if rect.contains(&branch.rect) => found.push(entry),
                ChildRef::Entry(_) => {}
                ChildRef::Node(child) if branch.rect.overlaps(rect) => {
                    self.contained_in_node(child, rect, found)?
                }
                ChildRef::Node(_) => {}
            }
        }
        Ok(())
    }

    fn nearest_in_node(
        &self,
        id: NodeId,
        point: &[f64],
        k: usize,
        results: &mut Vec<(EntryId, f64)>,
        bound: &mut f64,
    ) -> RTreeResult<()> {
        let node = self.store.read(id)?;
        if node.is_leaf() {
            for branch in &node.branches {
                let distance = branch.rect.min_distance_sq(point).sqrt();
                if distance > *bound {
                    continue;
                }
                if let ChildRef::Entry(entry) = branch.child {
                    results.push((entry, distance));
                }
                if results.len() >= k {
                    results.sort_by(|a, b| a.1.total_cmp(&b.1));
                    results.truncate(k);
                    if let Some(&(_, kth)) = results.last() {
                        *bound = kth;
                    }
                }
            }
            return Ok(());
        }

        let mut candidates: Vec<(NodeId, f64)> = node
            .branches
            .iter()
            .filter_map(|b| {
                b.child
                    .as_node()
                    .map(|child| (child, b.rect.min_distance_sq(point).sqrt()))
            })
            .collect();
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
        for (child, distance) in candidates {
            if distance > *bound {
                continue;
            }
            self.nearest_in_node(child, point, k, results, bound)?;
        }
        Ok(())
    }

    fn dump_node(&self, id: NodeId, depth: usize, out: &mut String) -> RTreeResult<()> {
        let node = self.store.read(id)?;
        let indent = "  ".repeat(depth);
        out.push_str(&format!(
            "{}node {} level={} count={}\n",
            indent,
            id,
            node.level,
            node.len()
        ));
        for branch in &node.branches {
            match branch.child {
                ChildRef::Entry(entry) => {
                    out.push_str(&format!("{}  {} -> entry {}\n", indent, branch.rect, entry));
                }
                ChildRef::Node(child) => {
                    out.push_str(&format!("{}  {} -> node {}\n", indent, branch.rect, child));
                    self.dump_node(child, depth + 2, out)?;
                }
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn check_dims(&self, rect: &Rect) -> RTreeResult<()> {
        if rect.ndims() != self.ndims() {
            return Err(RTreeError::DimensionMismatch {
                expected: self.ndims(),
                actual: rect.ndims(),
            });
        }
        Ok(())
    }

    fn check_entry_rect(&self, rect: &Rect) -> RTreeResult<()> {
        self.check_dims(rect)?;
        if rect.is_null() {
            return Err(RTreeError::InvalidOperation(
                "the null rectangle cannot be indexed".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_empty(&self) -> RTreeResult<()> {
        if !self.is_empty() {
            return Err(RTreeError::InvalidConfiguration(format!(
                "cannot change fan-out of a tree holding {} entries",
                self.entry_count
            )));
        }
        Ok(())
    }

    fn apply_card(&mut self, card: CardPolicy) -> RTreeResult<()> {
        if let Some(capacity) = self.store.page_capacity() {
            if card.largest_max() > capacity {
                return Err(RTreeError::InvalidConfiguration(format!(
                    "fan-out {} does not fit a page holding {} branches",
                    card.largest_max(),
                    capacity
                )));
            }
        }
        self.config.set_card(card)?;
        self.persist_meta()?;
        log::debug!(
            "Fan-out changed: node {}..={}, leaf {}..={}",
            card.node_min(),
            card.node_max(),
            card.leaf_min(),
            card.leaf_max()
        );
        Ok(())
    }

    fn persist_meta(&mut self) -> RTreeResult<()> {
        let meta = TreeMeta {
            root: self.root,
            height: self.height,
            entry_count: self.entry_count,
            card: *self.config.card(),
        };
        self.store.store_meta(&meta)
    }
}

impl Drop for RTree {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.flush() {
                log::warn!("Failed to flush R-tree on drop: {}", e);
            }
        }
    }
}

/// Index of the branch needing the least enlargement to cover `rect`. Ties
/// go to the smaller resulting cover, then to the earlier branch.
fn pick_branch(node: &Node, rect: &Rect, metric: CoverMetric) -> Option<usize> {
    let mut best: Option<(usize, f64, f64)> = None;
    for (index, branch) in node.branches.iter().enumerate() {
        let grown = metric.measure(&branch.rect.combine(rect));
        let growth = grown - metric.measure(&branch.rect);
        let better = match best {
            None => true,
            Some((_, best_growth, best_grown)) => {
                growth < best_growth || (growth == best_growth && grown < best_grown)
            }
        };
        if better {
            best = Some((index, growth, grown));
        }
    }
    best.map(|(index, _, _)| index)
}
