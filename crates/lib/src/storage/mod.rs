//! Blob storage: key layout, the [`BlobStore`] seam, and the Azure backend.

mod azure;
mod path;

pub use azure::{shared_key_signature, AzureBlobStore, AZURE_STORAGE_VERSION};
pub use path::{PartitionScheme, PartitionZone, PartitionZoneError};

use async_trait::async_trait;

/// Content type every stored event is written with.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage account not configured: {0}")]
    NotConfigured(&'static str),
    #[error("storage account key is not valid base64")]
    InvalidAccountKey,
    #[error("invalid blob url {0}")]
    InvalidUrl(String),
    #[error("serializing event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("blob request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("blob service returned {status} ({code}): {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
    },
}

/// Write-only blob store. Implementations overwrite existing blobs and never retry.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError>;
}

/// Serialize `event` (the full original event object) and write it under `key`.
/// Failures are logged here and returned; callers only need the outcome.
pub async fn store_event(
    store: &dyn BlobStore,
    key: &str,
    event: &serde_json::Value,
) -> Result<(), StorageError> {
    let body = serde_json::to_string(event)?;
    log::info!("Blob name: {}", key);
    log::info!("Event body:\n{}", body);
    if let Err(e) = store.put(key, body.into_bytes(), JSON_CONTENT_TYPE).await {
        log::error!("writing blob {} failed: {}", key, e);
        return Err(e);
    }
    Ok(())
}
