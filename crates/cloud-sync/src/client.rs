//! HTTP client for the snapshot blob service.
//!
//! The service is a dumb JSON blob store: POST creates a blob and names it in
//! a response header, PUT overwrites it, GET returns it. The trailing path
//! segment of that header is the sync code devices share to link up.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, ACCEPT, CACHE_CONTROL, CONTENT_TYPE, LOCATION};

use drainwise_core::sync::{RemoteResult, RemoteSnapshotStore};

use crate::error::{CloudSyncError, Result};

/// Default timeout for blob requests.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Fallback id header for services that omit `Location` on create.
const BLOB_ID_HEADER: &str = "x-blob-id";

/// Require `payload` to be a JSON sequence and return its items.
fn snapshot_items(payload: &str) -> Result<Vec<serde_json::Value>> {
    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|err| CloudSyncError::format(format!("not valid JSON: {}", err)))?;
    match value {
        serde_json::Value::Array(items) => Ok(items),
        _ => Err(CloudSyncError::format("not a snapshot sequence")),
    }
}

/// Extract the sync code from a create response.
///
/// Prefers the `Location` header and falls back to `x-blob-id`. Either may
/// hold a full URL or a bare id; the code is the trailing path segment.
fn extract_blob_id(headers: &HeaderMap) -> Option<String> {
    let raw = headers
        .get(LOCATION)
        .or_else(|| headers.get(BLOB_ID_HEADER))?
        .to_str()
        .ok()?;

    let code = raw.trim().trim_end_matches('/').rsplit('/').next()?.trim();
    if code.is_empty() {
        return None;
    }
    Some(code.to_string())
}

/// Client for the snapshot blob service.
#[derive(Debug, Clone)]
pub struct CloudBlobClient {
    client: reqwest::Client,
    base_url: String,
}

impl CloudBlobClient {
    /// Create a new blob client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The service root (e.g., "https://blobs.example.com");
    ///   blob endpoints live under `{base_url}/blobs`.
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn blob_url(&self, sync_code: &str) -> String {
        format!(
            "{}/blobs/{}",
            self.base_url,
            urlencoding::encode(sync_code)
        )
    }

    /// Create a blob holding `payload` and return its sync code.
    ///
    /// POST /blobs
    pub async fn create_blob(&self, payload: &str) -> Result<String> {
        if snapshot_items(payload)?.is_empty() {
            return Err(CloudSyncError::EmptySnapshot);
        }

        let url = format!("{}/blobs", self.base_url);
        debug!("[CloudSync] Creating blob at {}", url);

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(payload.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(CloudSyncError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }

        let code = extract_blob_id(response.headers()).ok_or(CloudSyncError::MissingBlobId)?;
        debug!("[CloudSync] Created blob {}", code);
        Ok(code)
    }

    /// Overwrite the blob behind `sync_code` with `payload`.
    ///
    /// PUT /blobs/{code}
    pub async fn replace_blob(&self, sync_code: &str, payload: &str) -> Result<()> {
        let url = self.blob_url(sync_code);
        debug!("[CloudSync] Replacing blob {}", sync_code);

        let response = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(payload.to_string())
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(CloudSyncError::BlobNotFound(sync_code.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await?;
            return Err(CloudSyncError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }
        Ok(())
    }

    /// Fetch the raw blob behind `sync_code`.
    ///
    /// The body must be a JSON sequence; callers parse it into drains.
    ///
    /// GET /blobs/{code}
    pub async fn fetch_blob(&self, sync_code: &str) -> Result<String> {
        let url = self.blob_url(sync_code);
        debug!("[CloudSync] Fetching blob {}", sync_code);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(CloudSyncError::BlobNotFound(sync_code.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await?;
            return Err(CloudSyncError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }

        let body = response.text().await?;
        snapshot_items(&body)?;
        Ok(body)
    }
}

#[async_trait]
impl RemoteSnapshotStore for CloudBlobClient {
    async fn create(&self, payload: &str) -> RemoteResult<String> {
        Ok(self.create_blob(payload).await?)
    }

    async fn replace(&self, sync_code: &str, payload: &str) -> RemoteResult<()> {
        Ok(self.replace_blob(sync_code, payload).await?)
    }

    async fn fetch(&self, sync_code: &str) -> RemoteResult<String> {
        Ok(self.fetch_blob(sync_code).await?)
    }
}
