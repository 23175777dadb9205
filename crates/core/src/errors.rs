//! Error types for the core crate.

use thiserror::Error;

use crate::sync::RemoteError;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in registry, persistence, and sync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input to a registry mutation; rejected before any state change.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation referenced a drain id absent from the registry.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local state store failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Snapshot serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote blob store failure.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl Error {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}
