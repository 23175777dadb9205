//! Error types for the cloud sync crate.

use thiserror::Error;

use drainwise_core::sync::RemoteError;

/// Result type alias for blob store operations.
pub type Result<T> = std::result::Result<T, CloudSyncError>;

/// Errors that can occur talking to the blob service.
#[derive(Debug, Error)]
pub enum CloudSyncError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the blob service
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// No blob exists under the given sync code (wrong or expired)
    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    /// Body or payload is not a snapshot sequence
    #[error("Format error: {0}")]
    Format(String),

    /// Creation succeeded but the response named no blob
    #[error("Blob service returned no id for the created blob")]
    MissingBlobId,

    /// Refused to create a blob for an empty snapshot
    #[error("Cannot create a shared blob from an empty snapshot")]
    EmptySnapshot,
}

impl CloudSyncError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a format error
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<CloudSyncError> for RemoteError {
    fn from(err: CloudSyncError) -> Self {
        match err {
            CloudSyncError::BlobNotFound(code) => RemoteError::CodeNotFound(code),
            CloudSyncError::Format(message) => RemoteError::Format(message),
            CloudSyncError::MissingBlobId => {
                RemoteError::Format("create response named no blob".to_string())
            }
            CloudSyncError::EmptySnapshot => {
                RemoteError::Format("refusing to store an empty snapshot".to_string())
            }
            other => RemoteError::Unavailable(other.to_string()),
        }
    }
}
