//! Error and result types for R-Tree operations.

use std::io;
use thiserror::Error;

/// Errors that can occur while building, opening or mutating an R-Tree.
#[derive(Debug, Error)]
pub enum RTreeError {
    /// The underlying file failed a read or write.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Dimensionality, fan-out or page sizing is not usable.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A header or node page failed validation.
    #[error("Corrupt storage: {0}")]
    CorruptStorage(String),

    /// A node does not fit into a single page.
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// A rectangle's dimensionality does not match the tree.
    #[error("Dimension mismatch: tree has {expected} dimensions, rect has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RTreeError {
    /// Returns true for errors after which the tree handle must not be used.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RTreeError::InvalidConfiguration(_) | RTreeError::CorruptStorage(_)
        )
    }

    /// Maps an I/O failure during a page read, treating short reads as corruption.
    pub(crate) fn from_page_read(err: io::Error, offset: u64) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            RTreeError::CorruptStorage(format!("truncated page at offset {}", offset))
        } else {
            RTreeError::Io(err)
        }
    }
}

/// Result type for R-Tree operations
pub type RTreeResult<T> = Result<T, RTreeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: RTreeError = io_err.into();
        assert!(matches!(err, RTreeError::Io(_)));
        assert!(err.to_string().contains("denied"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_short_read_is_corruption() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let err = RTreeError::from_page_read(io_err, 8192);
        assert!(matches!(err, RTreeError::CorruptStorage(_)));
        assert!(err.to_string().contains("8192"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_other_read_failure_stays_io() {
        let io_err = io::Error::new(io::ErrorKind::Interrupted, "interrupted");
        let err = RTreeError::from_page_read(io_err, 0);
        assert!(matches!(err, RTreeError::Io(_)));
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = RTreeError::DimensionMismatch {
            expected: 2,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "Dimension mismatch: tree has 2 dimensions, rect has 3"
        );
    }
}
