//! Error types for tickstore

use thiserror::Error;

/// Result type alias for tickstore operations
pub type Result<T> = std::result::Result<T, TickError>;

/// tickstore error types
#[derive(Error, Debug)]
pub enum TickError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Caller supplied an argument outside its allowed domain
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Query boundaries violate the alignment rules of the requested period
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Range enumeration stepped past the query end
    #[error("misaligned range: {0}")]
    MisalignedRange(String),

    /// Entity already exists
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Entity not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Entity still owns data and cannot be removed
    #[error("{0} has existing data and cannot be deleted")]
    HasData(String),

    /// Operation is reserved but not implemented
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// A cancellation token was observed mid-iteration
    #[error("operation was cancelled")]
    Cancelled,

    /// Storage substrate failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Checksum mismatch while replaying the journal
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation on a disposed store or a double initialization
    #[error("lifecycle error: {0}")]
    Lifecycle(String),
}

impl TickError {
    /// Check if error indicates on-disk corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            TickError::Storage(_) | TickError::ChecksumMismatch { .. }
        )
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, TickError::Io(_))
    }
}
