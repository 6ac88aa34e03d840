//! # Spatial R-Tree
//!
//! A multidimensional R-tree answering "which objects overlap this region"
//! over axis-aligned bounding boxes, maintained incrementally as objects are
//! inserted and removed.
//!
//! ## Features
//!
//! - **Two Backends**: an in-memory node arena or a paged file, behind one
//!   [`NodeStore`] trait
//! - **Quadratic Split**: Guttman's seed selection, with optional R*-style
//!   forced reinsertion before a split
//! - **Condensation**: underfull nodes are dissolved on delete and their
//!   branches reinserted at their own level
//! - **Checksummed Pages**: every page carries a CRC-32, corruption is
//!   reported instead of read back
//! - **LRU Cache**: decoded nodes of the file backend stay in memory
//! - **Early-Stop Search**: the hit callback decides whether to continue
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::ops::ControlFlow;
//! use spatial_rtree::{RTree, RTreeConfig, Rect, StorageMode};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RTreeConfig::builder(2).build()?;
//! let mut tree = RTree::create(StorageMode::File("places.rtree".into()), config)?;
//!
//! tree.insert(&Rect::new(&[0.0, 0.0], &[10.0, 10.0])?, 1)?;
//! tree.insert(&Rect::new(&[20.0, 20.0], &[30.0, 30.0])?, 2)?;
//!
//! let query = Rect::new(&[5.0, 5.0], &[15.0, 15.0])?;
//! let hits = tree.search(&query, |id, rect| {
//!     println!("{} at {}", id, rect);
//!     ControlFlow::Continue(())
//! })?;
//! assert_eq!(hits, 1);
//!
//! tree.close()?;
//! let tree = RTree::open("places.rtree")?;
//! assert_eq!(tree.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod card;
pub mod config;
pub mod constants;
pub mod errors;
pub mod integrity;
pub mod node;
pub mod rect;
pub mod split;
pub mod store;
pub mod tree;

pub use card::CardPolicy;
pub use config::{RTreeConfig, RTreeConfigBuilder, SplitStrategy, StorageMode};
pub use errors::{RTreeError, RTreeResult};
pub use integrity::IntegrityReport;
pub use node::{Branch, ChildRef, EntryId, Node, NodeId};
pub use rect::{CoverMetric, Rect};
pub use store::{FileStore, MemoryStore, NodeStore, StoreStats, TreeMeta};
pub use tree::{RTree, RTreeStats};

#[cfg(test)]
#[ctor::ctor]
fn init() {
    colog::init();
}
