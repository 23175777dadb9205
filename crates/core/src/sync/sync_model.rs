//! Sync domain models and the remote blob store contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::drains::Drain;
use crate::errors::Result;

/// Result type alias for remote store operations.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Sync engine lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    PushPending,
    Pushing,
    Pulling,
    Error,
}

/// Observable engine status. Timestamps are RFC 3339 strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub sync_code: Option<String>,
    pub last_push_at: Option<String>,
    pub last_pull_at: Option<String>,
    pub last_error: Option<String>,
}

/// Outcome of one push cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Snapshot replaced the existing remote blob.
    Replaced,
    /// First push created the remote blob and yielded a sync code.
    Created { sync_code: String },
    /// Snapshot matches the last synced baseline; nothing sent.
    Unchanged,
    /// No sync code yet and the snapshot is empty; creation deferred until
    /// there is something worth storing.
    SkippedEmpty,
}

/// Outcome of one pull cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// Remote snapshot differed and replaced local state.
    Applied { drain_count: usize },
    /// Remote snapshot matches local state; nothing adopted.
    Unchanged,
    /// No sync code associated with this device; nothing to pull.
    NotLinked,
}

/// Failures talking to the remote blob store.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// Network failure or unexpected HTTP status.
    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    /// The sync code does not name a blob (unknown or expired).
    #[error("Unknown or expired sync code: {0}")]
    CodeNotFound(String),

    /// Remote payload is not a well-formed snapshot.
    #[error("Malformed remote payload: {0}")]
    Format(String),
}

impl RemoteError {
    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Create an unknown-code error.
    pub fn code_not_found(sync_code: impl Into<String>) -> Self {
        Self::CodeNotFound(sync_code.into())
    }

    /// Create a malformed-payload error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }
}

/// Remote blob store contract: create/read/replace of one opaque JSON blob
/// named by a sync code.
#[async_trait]
pub trait RemoteSnapshotStore: Send + Sync {
    /// Store a new blob, returning the opaque sync code that names it.
    async fn create(&self, payload: &str) -> RemoteResult<String>;

    /// Overwrite the blob named by `sync_code`.
    async fn replace(&self, sync_code: &str, payload: &str) -> RemoteResult<()>;

    /// Fetch the raw blob named by `sync_code`.
    async fn fetch(&self, sync_code: &str) -> RemoteResult<String>;
}

/// Canonical serialization of a snapshot. Every content-equality comparison
/// in the engine uses this form on both sides.
pub fn serialize_snapshot(drains: &[Drain]) -> Result<String> {
    Ok(serde_json::to_string(drains)?)
}

/// Parses a remote payload, requiring a JSON sequence of drains.
pub fn parse_snapshot(raw: &str) -> RemoteResult<Vec<Drain>> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|err| RemoteError::format(err.to_string()))?;
    if !value.is_array() {
        return Err(RemoteError::format("snapshot must be a sequence"));
    }
    serde_json::from_value(value).map_err(|err| RemoteError::format(err.to_string()))
}
