//! Pool error types.

use thiserror::Error;

/// Errors that can occur when interacting with the bundle pool.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// A live bundle with the same replacement UUID already exists.
    #[error("bundle with UUID {0} already exists")]
    Duplicate(String),

    /// No bundle with the given replacement UUID is present.
    #[error("bundle with UUID {0} not found")]
    NotFound(String),
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
