use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spatial_rtree::{EntryId, RTree, RTreeConfig, RTreeResult, Rect, SplitStrategy};
use std::path::PathBuf;
use tempfile::TempDir;

/// Deterministic generator for reproducible workloads.
pub fn seeded(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// A random rectangle with its low corner in `[0, extent)` and sides of up
/// to `max_side` in every dimension.
pub fn random_rect(rng: &mut StdRng, ndims: usize, extent: f64, max_side: f64) -> Rect {
    let mut low = Vec::with_capacity(ndims);
    let mut high = Vec::with_capacity(ndims);
    for _ in 0..ndims {
        let start = rng.gen_range(0.0..extent);
        let side = rng.gen_range(0.0..=max_side);
        low.push(start);
        high.push(start + side);
    }
    Rect::new(&low, &high).unwrap()
}

/// `count` random rectangles paired with ids `0..count`.
pub fn random_entries(seed: u64, count: u64, ndims: usize) -> Vec<(Rect, EntryId)> {
    let mut rng = seeded(seed);
    (0..count)
        .map(|id| (random_rect(&mut rng, ndims, 1000.0, 25.0), id))
        .collect()
}

/// A rectangle covering every coordinate the helpers generate.
pub fn full_extent(ndims: usize) -> Rect {
    Rect::new(&vec![-1.0e6; ndims], &vec![1.0e6; ndims]).unwrap()
}

pub fn unit_square(x: f64, y: f64) -> Rect {
    Rect::new(&[x, y], &[x + 1.0, y + 1.0]).unwrap()
}

/// Configuration with equal node and leaf fan-out and the given minimum.
pub fn small_config(ndims: usize, max: usize, min: usize, strategy: SplitStrategy) -> RTreeConfig {
    RTreeConfig::builder(ndims)
        .node_max(max)
        .node_min(min)
        .leaf_max(max)
        .leaf_min(min)
        .split_strategy(strategy)
        .build()
        .unwrap()
}

/// Temporary directory and a tree file path inside it. Keep the directory
/// alive for as long as the file is used.
pub fn temp_tree_path(name: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    log::debug!("Using temporary tree file {}", path.display());
    (dir, path)
}

pub fn sorted_hits(tree: &RTree, query: &Rect) -> RTreeResult<Vec<EntryId>> {
    let mut ids = tree.find_intersecting(query)?;
    ids.sort_unstable();
    Ok(ids)
}

/// Panics with every finding if the tree violates an invariant.
pub fn assert_tree_valid(tree: &RTree) {
    let report = tree.check_integrity().unwrap();
    assert!(
        report.is_valid,
        "integrity check failed:\n{}\n{}",
        report.errors.join("\n"),
        tree.dump().unwrap_or_default()
    );
    assert_eq!(report.entries_found, tree.len());
}

/// Brute-force reference index: a flat list scanned on every query.
#[derive(Debug, Default, Clone)]
pub struct Model {
    entries: Vec<(Rect, EntryId)>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rect: Rect, id: EntryId) {
        self.entries.push((rect, id));
    }

    /// Same matching rule as the tree: payload equal and stored rectangle
    /// containing the query.
    pub fn delete(&mut self, rect: &Rect, id: EntryId) -> bool {
        match self
            .entries
            .iter()
            .position(|(stored, stored_id)| *stored_id == id && stored.contains(rect))
        {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn intersecting(&self, query: &Rect) -> Vec<EntryId> {
        let mut ids: Vec<EntryId> = self
            .entries
            .iter()
            .filter(|(rect, _)| rect.overlaps(query))
            .map(|(_, id)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn contained(&self, query: &Rect) -> Vec<EntryId> {
        let mut ids: Vec<EntryId> = self
            .entries
            .iter()
            .filter(|(rect, _)| query.contains(rect))
            .map(|(_, id)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Distances of the `k` nearest entries, ascending.
    pub fn nearest_distances(&self, point: &[f64], k: usize) -> Vec<f64> {
        let mut distances: Vec<f64> = self
            .entries
            .iter()
            .map(|(rect, _)| rect.min_distance_sq(point).sqrt())
            .collect();
        distances.sort_by(|a, b| a.total_cmp(b));
        distances.truncate(k);
        distances
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(Rect, EntryId)] {
        &self.entries
    }
}
