//! Blob storage for source images and archives.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;

/// Opaque reference to a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobRef(String);

impl BlobRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored blob contents.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub data: Bytes,
    pub content_type: String,
}

/// Errors from blob storage.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(BlobRef),

    #[error("blob store unavailable: {0}")]
    Unavailable(String),
}

/// Write-once blob storage.
pub trait BlobStore: Send + Sync + 'static {
    /// Stores `data` and returns its reference.
    fn create_blob(
        &self,
        data: Bytes,
        content_type: &str,
    ) -> impl Future<Output = Result<BlobRef, BlobError>> + Send;

    /// Reads a blob back.
    fn read_blob(&self, blob: &BlobRef) -> impl Future<Output = Result<Blob, BlobError>> + Send;
}

/// In-memory blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<BlobRef, Blob>,
    next_id: AtomicU64,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    async fn create_blob(&self, data: Bytes, content_type: &str) -> Result<BlobRef, BlobError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let blob_ref = BlobRef::new(format!("blob-{}", id));
        self.blobs.insert(
            blob_ref.clone(),
            Blob {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(blob_ref)
    }

    async fn read_blob(&self, blob: &BlobRef) -> Result<Blob, BlobError> {
        self.blobs
            .get(blob)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BlobError::NotFound(blob.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_read() {
        let store = MemoryBlobStore::new();
        let a = store
            .create_blob(Bytes::from_static(b"zip"), "application/zip")
            .await
            .unwrap();
        let b = store
            .create_blob(Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap();

        assert_ne!(a, b);
        let blob = store.read_blob(&a).await.unwrap();
        assert_eq!(blob.data, Bytes::from_static(b"zip"));
        assert_eq!(blob.content_type, "application/zip");
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let store = MemoryBlobStore::new();
        let result = store.read_blob(&BlobRef::new("nope")).await;
        assert!(matches!(result, Err(BlobError::NotFound(_))));
    }
}
