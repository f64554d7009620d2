//! URL signer for the CLI: joins storage paths onto a public base URL.

use async_trait::async_trait;
use lectern_core::{StorageError, UrlSigner};

pub struct BaseUrlSigner {
    base_url: Option<String>,
}

impl BaseUrlSigner {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            base_url: base_url.filter(|u| !u.trim().is_empty()),
        }
    }
}

#[async_trait]
impl UrlSigner for BaseUrlSigner {
    fn name(&self) -> &str {
        "base_url"
    }

    async fn sign(&self, storage_path: &str) -> Result<String, StorageError> {
        let base = self.base_url.as_deref().ok_or_else(|| {
            StorageError::NotConfigured("storage.public_base_url is not set".into())
        })?;
        Ok(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            storage_path.trim_start_matches('/')
        ))
    }
}
