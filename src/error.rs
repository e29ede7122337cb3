//! Error types for the blob cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the blob cache.
///
/// A missing key is not an error: lookups return `None` and deletes
/// report a count of zero.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The backing file could not be opened or prepared
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A read or write transaction could not complete
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// A configuration value was rejected; the previous value is kept
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The record key is not acceptable
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The serial worker is not running
    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),
}

impl CacheError {
    pub(crate) fn connection(err: impl std::fmt::Display) -> Self {
        CacheError::ConnectionFailed(err.to_string())
    }

    pub(crate) fn transaction(err: impl std::fmt::Display) -> Self {
        CacheError::TransactionFailed(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the blob cache.
pub type Result<T> = std::result::Result<T, CacheError>;
