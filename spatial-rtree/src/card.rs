//! Fan-out (card) policy: how many branches internal and leaf nodes may hold.

use serde::{Deserialize, Serialize};

use crate::errors::{RTreeError, RTreeResult};

/// Minimum and maximum branch counts for internal nodes and leaves.
///
/// Invariant: `max >= 2` and `1 <= min <= max / 2` for both levels. The
/// root is exempt from the minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPolicy {
    node_max: usize,
    node_min: usize,
    leaf_max: usize,
    leaf_min: usize,
}

impl CardPolicy {
    /// Creates a policy whose minimums are `min_fill_ratio` of each maximum.
    pub fn new(node_max: usize, leaf_max: usize, min_fill_ratio: f64) -> RTreeResult<Self> {
        let policy = CardPolicy {
            node_max,
            node_min: derive_min(node_max, min_fill_ratio),
            leaf_max,
            leaf_min: derive_min(leaf_max, min_fill_ratio),
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Creates a policy with explicit minimums.
    pub fn with_minimums(
        node_max: usize,
        node_min: usize,
        leaf_max: usize,
        leaf_min: usize,
    ) -> RTreeResult<Self> {
        let policy = CardPolicy {
            node_max,
            node_min,
            leaf_max,
            leaf_min,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> RTreeResult<()> {
        check_level("internal", self.node_max, self.node_min)?;
        check_level("leaf", self.leaf_max, self.leaf_min)
    }

    /// Changes the internal-node maximum, re-deriving its minimum.
    pub fn set_node_max(&mut self, node_max: usize, min_fill_ratio: f64) -> RTreeResult<()> {
        let node_min = derive_min(node_max, min_fill_ratio);
        check_level("internal", node_max, node_min)?;
        self.node_max = node_max;
        self.node_min = node_min;
        Ok(())
    }

    /// Changes the leaf maximum, re-deriving its minimum.
    pub fn set_leaf_max(&mut self, leaf_max: usize, min_fill_ratio: f64) -> RTreeResult<()> {
        let leaf_min = derive_min(leaf_max, min_fill_ratio);
        check_level("leaf", leaf_max, leaf_min)?;
        self.leaf_max = leaf_max;
        self.leaf_min = leaf_min;
        Ok(())
    }

    #[inline]
    pub fn node_max(&self) -> usize {
        self.node_max
    }

    #[inline]
    pub fn node_min(&self) -> usize {
        self.node_min
    }

    #[inline]
    pub fn leaf_max(&self) -> usize {
        self.leaf_max
    }

    #[inline]
    pub fn leaf_min(&self) -> usize {
        self.leaf_min
    }

    /// Maximum branches for a node at `level`.
    #[inline]
    pub fn max_branches(&self, level: u32) -> usize {
        if level == 0 {
            self.leaf_max
        } else {
            self.node_max
        }
    }

    /// Minimum branches for a non-root node at `level`.
    #[inline]
    pub fn min_branches(&self, level: u32) -> usize {
        if level == 0 {
            self.leaf_min
        } else {
            self.node_min
        }
    }

    /// Largest fan-out of either level; bounds the size of any page.
    pub fn largest_max(&self) -> usize {
        self.node_max.max(self.leaf_max)
    }
}

/// `ceil(max * ratio)`, clamped into `1..=max/2`.
pub(crate) fn derive_min(max: usize, min_fill_ratio: f64) -> usize {
    let wanted = (max as f64 * min_fill_ratio).ceil() as usize;
    wanted.clamp(1, (max / 2).max(1))
}

fn check_level(kind: &str, max: usize, min: usize) -> RTreeResult<()> {
    if max < 2 {
        return Err(RTreeError::InvalidConfiguration(format!(
            "{} fan-out must be at least 2, got {}",
            kind, max
        )));
    }
    if min < 1 || min > max / 2 {
        return Err(RTreeError::InvalidConfiguration(format!(
            "{} minimum fill must be between 1 and {}, got {}",
            kind,
            max / 2,
            min
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_minimums() {
        let policy = CardPolicy::new(4, 10, 0.4).unwrap();
        assert_eq!(policy.node_min(), 2);
        assert_eq!(policy.leaf_min(), 4);
        assert_eq!(policy.max_branches(0), 10);
        assert_eq!(policy.max_branches(3), 4);
        assert_eq!(policy.min_branches(0), 4);
        assert_eq!(policy.min_branches(1), 2);
        assert_eq!(policy.largest_max(), 10);
    }

    #[test]
    fn test_minimum_clamped_to_half() {
        let policy = CardPolicy::new(3, 3, 0.5).unwrap();
        assert_eq!(policy.node_min(), 1);
        assert_eq!(policy.leaf_min(), 1);
    }

    #[test]
    fn test_rejects_tiny_fanout() {
        assert!(matches!(
            CardPolicy::new(1, 4, 0.4),
            Err(RTreeError::InvalidConfiguration(_))
        ));
        assert!(CardPolicy::new(4, 0, 0.4).is_err());
    }

    #[test]
    fn test_rejects_bad_explicit_minimums() {
        assert!(CardPolicy::with_minimums(4, 3, 4, 2).is_err());
        assert!(CardPolicy::with_minimums(4, 0, 4, 2).is_err());
        assert!(CardPolicy::with_minimums(4, 2, 4, 2).is_ok());
    }

    #[test]
    fn test_set_max() {
        let mut policy = CardPolicy::new(4, 4, 0.4).unwrap();
        policy.set_node_max(10, 0.4).unwrap();
        policy.set_leaf_max(20, 0.4).unwrap();
        assert_eq!(policy.node_min(), 4);
        assert_eq!(policy.leaf_min(), 8);

        assert!(policy.set_leaf_max(1, 0.4).is_err());
        assert_eq!(policy.leaf_max(), 20);
    }
}
