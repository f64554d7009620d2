//! Token counting.
//!
//! [`TokenCounter`] wraps a model-specific tokenizer behind one
//! `count(text)` call. A counter is created empty and initialized exactly
//! once; counting before that fails with [`TokenizerError::NotInitialized`]
//! instead of quietly returning zero, which would let an unbounded prompt
//! through the budget.
//!
//! Supported encodings:
//! - `cl100k_base` / `o200k_base` BPE via `tiktoken-rs`
//! - `estimate`: 1 token ≈ 4 bytes, rounded up
//! - `huggingface`: a `tokenizer.json` file (feature `hf-tokenizer`)

use std::path::Path;
use std::sync::OnceLock;

use lectern_config::{EncodingKind, TokenizerConfig};
use lectern_core::TokenizerError;
use tiktoken_rs::CoreBPE;
use tiktoken_rs::tokenizer::{Tokenizer, get_tokenizer};
use tracing::debug;

/// A loaded tokenizer.
pub enum Encoding {
    Bpe { name: &'static str, bpe: CoreBPE },
    Estimate,
    #[cfg(feature = "hf-tokenizer")]
    HuggingFace(Box<tokenizers::Tokenizer>),
}

impl Encoding {
    /// Load the tokenizer for `kind`. `path` is only read for `huggingface`.
    pub fn load(kind: EncodingKind, path: Option<&Path>) -> Result<Self, TokenizerError> {
        let load_err = |reason: String| TokenizerError::Load {
            encoding: kind.as_str().to_string(),
            reason,
        };

        match kind {
            EncodingKind::Cl100kBase => tiktoken_rs::cl100k_base()
                .map(|bpe| Self::Bpe {
                    name: "cl100k_base",
                    bpe,
                })
                .map_err(|e| load_err(e.to_string())),
            EncodingKind::O200kBase => tiktoken_rs::o200k_base()
                .map(|bpe| Self::Bpe {
                    name: "o200k_base",
                    bpe,
                })
                .map_err(|e| load_err(e.to_string())),
            EncodingKind::Estimate => Ok(Self::Estimate),
            EncodingKind::HuggingFace => Self::load_huggingface(path).map_err(load_err),
        }
    }

    #[cfg(feature = "hf-tokenizer")]
    fn load_huggingface(path: Option<&Path>) -> Result<Self, String> {
        let path = path.ok_or_else(|| "no tokenizer.json path given".to_string())?;
        tokenizers::Tokenizer::from_file(path)
            .map(|t| Self::HuggingFace(Box::new(t)))
            .map_err(|e| format!("{}: {e}", path.display()))
    }

    #[cfg(not(feature = "hf-tokenizer"))]
    fn load_huggingface(_path: Option<&Path>) -> Result<Self, String> {
        Err("built without the `hf-tokenizer` feature".into())
    }

    /// Pick the BPE a model id was trained with, falling back to
    /// `cl100k_base` for ids tiktoken does not know.
    pub fn for_model(model: &str) -> Result<Self, TokenizerError> {
        match get_tokenizer(model) {
            Some(Tokenizer::O200kBase) => Self::load(EncodingKind::O200kBase, None),
            Some(Tokenizer::Cl100kBase) => Self::load(EncodingKind::Cl100kBase, None),
            _ => {
                debug!(model, "No known encoding for model, using cl100k_base");
                Self::load(EncodingKind::Cl100kBase, None)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Bpe { name, .. } => *name,
            Self::Estimate => "estimate",
            #[cfg(feature = "hf-tokenizer")]
            Self::HuggingFace(_) => "huggingface",
        }
    }

    fn count(&self, text: &str) -> Result<usize, TokenizerError> {
        if text.is_empty() {
            return Ok(0);
        }
        match self {
            Self::Bpe { bpe, .. } => Ok(bpe.encode_with_special_tokens(text).len()),
            Self::Estimate => Ok(estimate_tokens(text)),
            #[cfg(feature = "hf-tokenizer")]
            Self::HuggingFace(tokenizer) => tokenizer
                .encode(text, false)
                .map(|encoding| encoding.len())
                .map_err(|e| TokenizerError::Encode(e.to_string())),
        }
    }
}

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 bytes. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Counts tokens with a one-time-initialized tokenizer.
///
/// Share it as `Arc<TokenCounter>` between the assembler and the packer.
/// Initialization takes `&self`, so a shared counter can be created early
/// and initialized once the configuration is known.
#[derive(Default)]
pub struct TokenCounter {
    encoding: OnceLock<Encoding>,
}

impl TokenCounter {
    /// An uninitialized counter. Call [`initialize`](Self::initialize) before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// A counter already initialized with the given encoding.
    pub fn with_encoding(encoding: Encoding) -> Self {
        let counter = Self::new();
        // Freshly created, so the cell is empty.
        let _ = counter.encoding.set(encoding);
        counter
    }

    /// A counter using the 4-bytes-per-token heuristic.
    pub fn estimate() -> Self {
        Self::with_encoding(Encoding::Estimate)
    }

    /// A counter for the tokenizer a model id uses.
    pub fn for_model(model: &str) -> Result<Self, TokenizerError> {
        Encoding::for_model(model).map(Self::with_encoding)
    }

    /// A counter initialized from configuration.
    pub fn from_config(config: &TokenizerConfig) -> Result<Self, TokenizerError> {
        let counter = Self::new();
        counter.initialize(config.encoding, config.path.as_deref())?;
        Ok(counter)
    }

    /// Load the tokenizer. Fails if the counter was already initialized.
    pub fn initialize(&self, kind: EncodingKind, path: Option<&Path>) -> Result<(), TokenizerError> {
        if self.encoding.get().is_some() {
            return Err(TokenizerError::AlreadyInitialized);
        }
        let encoding = Encoding::load(kind, path)?;
        debug!(encoding = encoding.name(), "Token counter initialized");
        self.encoding
            .set(encoding)
            .map_err(|_| TokenizerError::AlreadyInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.encoding.get().is_some()
    }

    /// Name of the loaded encoding, if any.
    pub fn encoding_name(&self) -> Option<&'static str> {
        self.encoding.get().map(Encoding::name)
    }

    /// Count the tokens in `text`.
    pub fn count(&self, text: &str) -> Result<usize, TokenizerError> {
        self.encoding
            .get()
            .ok_or(TokenizerError::NotInitialized)?
            .count(text)
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("encoding", &self.encoding_name())
            .finish()
    }
}
