//! Tree configuration and its fluent builder.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::card::{derive_min, CardPolicy};
use crate::constants::{
    branches_per_page, DEFAULT_CACHE_PAGES, DEFAULT_MIN_FILL_RATIO, DEFAULT_PAGE_SIZE,
    MIN_PAGE_SIZE,
};
use crate::errors::{RTreeError, RTreeResult};
use crate::rect::{check_ndims, CoverMetric};

/// How an overflowing node is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SplitStrategy {
    /// Split immediately using quadratic seed selection.
    #[default]
    Quadratic,
    /// Before splitting, remove the `count` branches farthest from the node
    /// centre and insert them again from the top. Done at most once per level
    /// for each inserted entry, and never at the root.
    ForcedReinsert { count: usize },
}

/// Where the tree keeps its nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageMode {
    Memory,
    File(PathBuf),
}

/// Configuration carried by every tree handle.
///
/// Use [`RTreeConfig::builder`] to create one:
///
/// ```rust
/// use spatial_rtree::{RTreeConfig, SplitStrategy};
///
/// let config = RTreeConfig::builder(2)
///     .node_max(8)
///     .leaf_max(8)
///     .split_strategy(SplitStrategy::ForcedReinsert { count: 3 })
///     .build()
///     .unwrap();
/// assert_eq!(config.card().leaf_min(), 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RTreeConfig {
    ndims: usize,
    card: CardPolicy,
    min_fill_ratio: f64,
    split_strategy: SplitStrategy,
    cover_metric: CoverMetric,
    page_size: usize,
    cache_pages: usize,
}

impl RTreeConfig {
    /// Starts a builder for a tree of `ndims` dimensions.
    pub fn builder(ndims: usize) -> RTreeConfigBuilder {
        RTreeConfigBuilder::new(ndims)
    }

    /// Default configuration for `ndims` dimensions.
    pub fn new(ndims: usize) -> RTreeResult<Self> {
        Self::builder(ndims).build()
    }

    #[inline]
    pub fn ndims(&self) -> usize {
        self.ndims
    }

    #[inline]
    pub fn card(&self) -> &CardPolicy {
        &self.card
    }

    #[inline]
    pub fn min_fill_ratio(&self) -> f64 {
        self.min_fill_ratio
    }

    #[inline]
    pub fn split_strategy(&self) -> SplitStrategy {
        self.split_strategy
    }

    #[inline]
    pub fn cover_metric(&self) -> CoverMetric {
        self.cover_metric
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[inline]
    pub fn cache_pages(&self) -> usize {
        self.cache_pages
    }

    /// Largest fan-out a page of this configuration can hold.
    pub fn page_capacity(&self) -> usize {
        branches_per_page(self.page_size, self.ndims)
    }

    /// Fails if either fan-out does not fit into one page.
    pub fn check_page_capacity(&self) -> RTreeResult<()> {
        let capacity = self.page_capacity();
        if self.card.largest_max() > capacity {
            return Err(RTreeError::InvalidConfiguration(format!(
                "fan-out {} does not fit a {} byte page ({} branches of {} dimensions at most)",
                self.card.largest_max(),
                self.page_size,
                capacity,
                self.ndims
            )));
        }
        Ok(())
    }

    pub(crate) fn set_card(&mut self, card: CardPolicy) -> RTreeResult<()> {
        check_strategy(self.split_strategy, &card)?;
        self.card = card;
        Ok(())
    }

    /// Rebuilds a configuration from values persisted in a file header.
    pub(crate) fn from_persisted(
        ndims: usize,
        card: CardPolicy,
        min_fill_ratio: f64,
        split_strategy: SplitStrategy,
        cover_metric: CoverMetric,
        page_size: usize,
        cache_pages: usize,
    ) -> RTreeResult<Self> {
        check_ndims(ndims)?;
        card.validate()?;
        check_strategy(split_strategy, &card)?;
        Ok(RTreeConfig {
            ndims,
            card,
            min_fill_ratio,
            split_strategy,
            cover_metric,
            page_size,
            cache_pages,
        })
    }
}

/// Builder for [`RTreeConfig`].
#[derive(Debug, Clone)]
pub struct RTreeConfigBuilder {
    ndims: usize,
    node_max: Option<usize>,
    leaf_max: Option<usize>,
    node_min: Option<usize>,
    leaf_min: Option<usize>,
    min_fill_ratio: f64,
    split_strategy: SplitStrategy,
    cover_metric: CoverMetric,
    page_size: usize,
    cache_pages: usize,
}

impl RTreeConfigBuilder {
    fn new(ndims: usize) -> Self {
        RTreeConfigBuilder {
            ndims,
            node_max: None,
            leaf_max: None,
            node_min: None,
            leaf_min: None,
            min_fill_ratio: DEFAULT_MIN_FILL_RATIO,
            split_strategy: SplitStrategy::default(),
            cover_metric: CoverMetric::default(),
            page_size: DEFAULT_PAGE_SIZE,
            cache_pages: DEFAULT_CACHE_PAGES,
        }
    }

    /// Maximum branches per internal node. Defaults to what fits a page.
    pub fn node_max(mut self, node_max: usize) -> Self {
        self.node_max = Some(node_max);
        self
    }

    /// Maximum branches per leaf. Defaults to what fits a page.
    pub fn leaf_max(mut self, leaf_max: usize) -> Self {
        self.leaf_max = Some(leaf_max);
        self
    }

    /// Explicit internal-node minimum instead of the fill ratio.
    pub fn node_min(mut self, node_min: usize) -> Self {
        self.node_min = Some(node_min);
        self
    }

    /// Explicit leaf minimum instead of the fill ratio.
    pub fn leaf_min(mut self, leaf_min: usize) -> Self {
        self.leaf_min = Some(leaf_min);
        self
    }

    /// Fraction of the maximum used as the minimum fill (default 0.4).
    pub fn min_fill_ratio(mut self, ratio: f64) -> Self {
        self.min_fill_ratio = ratio;
        self
    }

    pub fn split_strategy(mut self, strategy: SplitStrategy) -> Self {
        self.split_strategy = strategy;
        self
    }

    pub fn cover_metric(mut self, metric: CoverMetric) -> Self {
        self.cover_metric = metric;
        self
    }

    /// Page size in bytes for the file backend; also drives default fan-out.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Number of decoded nodes the file backend keeps cached (0 disables).
    pub fn cache_pages(mut self, cache_pages: usize) -> Self {
        self.cache_pages = cache_pages;
        self
    }

    pub fn build(self) -> RTreeResult<RTreeConfig> {
        check_ndims(self.ndims)?;
        if self.page_size < MIN_PAGE_SIZE || self.page_size > u32::MAX as usize {
            return Err(RTreeError::InvalidConfiguration(format!(
                "page size must be between {} and {} bytes, got {}",
                MIN_PAGE_SIZE,
                u32::MAX,
                self.page_size
            )));
        }
        if !(self.min_fill_ratio > 0.0 && self.min_fill_ratio <= 0.5) {
            return Err(RTreeError::InvalidConfiguration(format!(
                "minimum fill ratio must be in (0, 0.5], got {}",
                self.min_fill_ratio
            )));
        }

        let per_page = branches_per_page(self.page_size, self.ndims);
        let node_max = self.node_max.unwrap_or(per_page);
        let leaf_max = self.leaf_max.unwrap_or(per_page);
        let card = CardPolicy::with_minimums(
            node_max,
            self.node_min
                .unwrap_or_else(|| derive_min(node_max, self.min_fill_ratio)),
            leaf_max,
            self.leaf_min
                .unwrap_or_else(|| derive_min(leaf_max, self.min_fill_ratio)),
        )?;
        check_strategy(self.split_strategy, &card)?;

        Ok(RTreeConfig {
            ndims: self.ndims,
            card,
            min_fill_ratio: self.min_fill_ratio,
            split_strategy: self.split_strategy,
            cover_metric: self.cover_metric,
            page_size: self.page_size,
            cache_pages: self.cache_pages,
        })
    }
}

/// Forced reinsertion must leave at least the minimum behind on both levels.
fn check_strategy(strategy: SplitStrategy, card: &CardPolicy) -> RTreeResult<()> {
    if let SplitStrategy::ForcedReinsert { count } = strategy {
        for level in [0u32, 1] {
            let limit = card.max_branches(level) + 1 - card.min_branches(level);
            if count == 0 || count > limit {
                return Err(RTreeError::InvalidConfiguration(format!(
                    "forced reinsertion count must be between 1 and {} for {} nodes, got {}",
                    limit,
                    if level == 0 { "leaf" } else { "internal" },
                    count
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_FORCED_REINSERT;

    #[test]
    fn test_defaults_derive_fanout_from_page() {
        let config = RTreeConfig::new(2).unwrap();
        assert_eq!(config.page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(config.card().leaf_max(), branches_per_page(DEFAULT_PAGE_SIZE, 2));
        assert_eq!(config.card().node_max(), config.card().leaf_max());
        assert_eq!(config.split_strategy(), SplitStrategy::Quadratic);
        assert_eq!(config.cover_metric(), CoverMetric::Volume);
        assert!(config.check_page_capacity().is_ok());
    }

    #[test]
    fn test_explicit_fanout() {
        let config = RTreeConfig::builder(2)
            .node_max(4)
            .leaf_max(6)
            .build()
            .unwrap();
        assert_eq!(config.card().node_min(), 2);
        assert_eq!(config.card().leaf_min(), 3);
    }

    #[test]
    fn test_explicit_minimum() {
        let config = RTreeConfig::builder(2)
            .node_max(8)
            .leaf_max(8)
            .leaf_min(2)
            .build()
            .unwrap();
        assert_eq!(config.card().leaf_min(), 2);
        assert_eq!(config.card().node_min(), 4);

        assert!(RTreeConfig::builder(2).leaf_max(8).leaf_min(5).build().is_err());
    }

    #[test]
    fn test_rejects_bad_dimensions() {
        assert!(matches!(
            RTreeConfig::new(0),
            Err(RTreeError::InvalidConfiguration(_))
        ));
        assert!(RTreeConfig::new(9).is_err());
    }

    #[test]
    fn test_rejects_bad_page_and_ratio() {
        assert!(RTreeConfig::builder(2).page_size(64).build().is_err());
        assert!(RTreeConfig::builder(2).min_fill_ratio(0.0).build().is_err());
        assert!(RTreeConfig::builder(2).min_fill_ratio(0.6).build().is_err());
        assert!(RTreeConfig::builder(2)
            .min_fill_ratio(f64::NAN)
            .build()
            .is_err());
    }

    #[test]
    fn test_forced_reinsert_bounds() {
        let ok = RTreeConfig::builder(2)
            .node_max(4)
            .leaf_max(4)
            .split_strategy(SplitStrategy::ForcedReinsert { count: 3 })
            .build();
        assert!(ok.is_ok());

        let too_many = RTreeConfig::builder(2)
            .node_max(4)
            .leaf_max(4)
            .split_strategy(SplitStrategy::ForcedReinsert { count: 4 })
            .build();
        assert!(too_many.is_err());

        let zero = RTreeConfig::builder(2)
            .split_strategy(SplitStrategy::ForcedReinsert { count: 0 })
            .build();
        assert!(zero.is_err());

        let default_count = RTreeConfig::builder(2)
            .split_strategy(SplitStrategy::ForcedReinsert {
                count: DEFAULT_FORCED_REINSERT,
            })
            .build();
        assert!(default_count.is_ok());
    }

    #[test]
    fn test_page_capacity_check() {
        let config = RTreeConfig::builder(2)
            .page_size(256)
            .node_max(50)
            .leaf_max(4)
            .build()
            .unwrap();
        assert!(matches!(
            config.check_page_capacity(),
            Err(RTreeError::InvalidConfiguration(_))
        ));
    }
}
