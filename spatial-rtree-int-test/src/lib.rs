//! Shared helpers for the R-tree integration tests.

pub mod test_util;
