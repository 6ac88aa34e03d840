//! Constants for the R-Tree engine and its paged file format.

/// Maximum number of dimensions a tree can be created with
pub const MAX_DIMS: usize = 8;

/// Default page size (4KB) - also used to derive fan-out for in-memory trees
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Smallest page size accepted; the header page must fit
pub const MIN_PAGE_SIZE: usize = 256;

/// Default node cache size in number of pages (1MB with 4KB pages)
pub const DEFAULT_CACHE_PAGES: usize = 256;

/// Minimum fill as a fraction of the maximum fan-out
pub const DEFAULT_MIN_FILL_RATIO: f64 = 0.4;

/// Number of branches force-reinserted before an R*-style split
pub const DEFAULT_FORCED_REINSERT: usize = 3;

/// Magic number for file format identification
pub const MAGIC: u32 = 0x53525452; // "SRTR"

/// File format version
pub const VERSION: u32 = 1;

/// Page framing: crc32 + body length
pub const PAGE_FRAME_SIZE: usize = 8;

/// Bytes of a node page that are not branches: framing, body tag, level, branch count
pub const NODE_HEADER_SIZE: usize = PAGE_FRAME_SIZE + 4 + 4 + 8;

/// Serialized size of one branch: coordinate count, coordinates, child tag, child value
pub const fn branch_size(ndims: usize) -> usize {
    8 + 16 * ndims + 4 + 8
}

/// Largest fan-out whose node still fits one page
pub const fn branches_per_page(page_size: usize, ndims: usize) -> usize {
    if page_size <= NODE_HEADER_SIZE {
        0
    } else {
        (page_size - NODE_HEADER_SIZE) / branch_size(ndims)
    }
}
