//! Storage signer trait — the abstraction over object-storage URL signing.
//!
//! Passages that live in the course bucket carry a storage path instead of a
//! public URL. Turning that path into a time-limited link is the storage
//! layer's job; the citation resolver only needs `sign(path) -> url`.

use async_trait::async_trait;

use crate::error::StorageError;

/// Issues signed (presigned) URLs for stored objects.
#[async_trait]
pub trait UrlSigner: Send + Sync {
    /// A human-readable name for this signer (e.g., "s3", "static").
    fn name(&self) -> &str;

    /// Produce a URL for the object at `storage_path`.
    async fn sign(&self, storage_path: &str) -> std::result::Result<String, StorageError>;
}

/// A signer for deployments without private storage. Every call fails, so
/// storage-backed citations stay unresolved.
pub struct NoopSigner;

#[async_trait]
impl UrlSigner for NoopSigner {
    fn name(&self) -> &str {
        "noop"
    }

    async fn sign(&self, storage_path: &str) -> std::result::Result<String, StorageError> {
        Err(StorageError::NotConfigured(format!(
            "no signer available for {storage_path}"
        )))
    }
}
