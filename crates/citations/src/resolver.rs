//! Citation link resolution with a per-response cache.
//!
//! A passage either carries a public `url`, used as-is, or a `storage_path`
//! that must be signed. Signing is remote and can be slow, so every
//! citation index is resolved at most once per response stream and the
//! outcome (link or failure) is cached.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lectern_config::CitationConfig;
use lectern_core::{Passage, StorageError, UrlSigner};
use tracing::{debug, warn};

/// Resolved links for one response, keyed by citation index as written in
/// the model output. `None` records an index that could not be resolved.
#[derive(Debug, Clone, Default)]
pub struct CitationLinkCache {
    links: HashMap<usize, Option<String>>,
}

impl CitationLinkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached outcome for `index`, if it was resolved before.
    pub fn get(&self, index: usize) -> Option<Option<&str>> {
        self.links.get(&index).map(Option::as_deref)
    }

    pub fn insert(&mut self, index: usize, link: Option<String>) {
        self.links.insert(index, link);
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Turns citation indices into links for one response.
pub struct LinkResolver {
    passages: HashMap<usize, Passage>,
    signer: Arc<dyn UrlSigner>,
    cache: CitationLinkCache,
    timeout: Duration,
}

impl LinkResolver {
    /// A resolver over the passages sent with the prompt. When two passages
    /// share an index the first one wins.
    pub fn new(passages: impl IntoIterator<Item = Passage>, signer: Arc<dyn UrlSigner>) -> Self {
        let mut by_index = HashMap::new();
        for passage in passages {
            by_index.entry(passage.index).or_insert(passage);
        }
        Self {
            passages: by_index,
            signer,
            cache: CitationLinkCache::new(),
            timeout: Duration::from_millis(CitationConfig::default().resolve_timeout_ms),
        }
    }

    pub fn from_config(
        passages: impl IntoIterator<Item = Passage>,
        signer: Arc<dyn UrlSigner>,
        config: &CitationConfig,
    ) -> Self {
        Self::new(passages, signer).with_timeout(Duration::from_millis(config.resolve_timeout_ms))
    }

    /// Upper bound on one signing call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache(&self) -> &CitationLinkCache {
        &self.cache
    }

    /// Resolve a passage to a link: its `url` if set, else a signed URL for
    /// its `storage_path`, else an empty string.
    pub async fn resolve(&self, passage: &Passage) -> Result<String, StorageError> {
        if let Some(url) = passage.url.as_deref().filter(|u| !u.is_empty()) {
            return Ok(url.to_string());
        }
        let Some(path) = passage.storage_path.as_deref().filter(|p| !p.is_empty()) else {
            return Ok(String::new());
        };

        match tokio::time::timeout(self.timeout, self.signer.sign(path)).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout {
                path: path.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    /// The link for a citation index, resolving it on first use.
    ///
    /// Returns `None` when the index names no passage, the passage has no
    /// link, or signing failed. The outcome is cached either way.
    pub async fn link_for(&mut self, index: usize) -> Option<String> {
        if let Some(cached) = self.cache.get(index) {
            debug!(index, hit = cached.is_some(), "Citation link cache hit");
            return cached.map(str::to_string);
        }

        let link = match self.passages.get(&index) {
            None => {
                debug!(index, "Citation names no passage");
                None
            }
            Some(passage) => match self.resolve(passage).await {
                Ok(url) if url.is_empty() => {
                    debug!(index, "Passage has no link");
                    None
                }
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(index, signer = self.signer.name(), error = %e, "Citation link unresolved");
                    None
                }
            },
        };

        self.cache.insert(index, link.clone());
        link
    }
}

impl std::fmt::Debug for LinkResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkResolver")
            .field("passages", &self.passages.len())
            .field("signer", &self.signer.name())
            .field("cached", &self.cache.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}
