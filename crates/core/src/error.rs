//! Error types for the Lectern domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Lectern operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Tokenizer errors ---
    #[error("Tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),

    // --- Storage errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Upstream model stream ---
    #[error("Upstream stream failed: {0}")]
    Stream(String),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum TokenizerError {
    #[error("Token counter used before initialization; call TokenCounter::initialize first")]
    NotInitialized,

    #[error("Token counter is already initialized")]
    AlreadyInitialized,

    #[error("Failed to load tokenizer '{encoding}': {reason}")]
    Load { encoding: String, reason: String },

    #[error("Failed to encode text: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Signing failed for {path}: {reason}")]
    SigningFailed { path: String, reason: String },

    #[error("Signing timed out for {path} after {timeout_ms}ms")]
    Timeout { path: String, timeout_ms: u64 },

    #[error("Storage signer not configured: {0}")]
    NotConfigured(String),
}
