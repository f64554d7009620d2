//! Configuration loading, validation, and management for Lectern.
//!
//! Loads configuration from `~/.lectern/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The root configuration structure.
///
/// Maps directly to `~/.lectern/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Prompt assembly settings
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Token counter settings
    #[serde(default)]
    pub tokenizer: TokenizerConfig,

    /// Citation rewriting settings
    #[serde(default)]
    pub citations: CitationConfig,

    /// Object storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful teaching assistant for a university course. \
Answer the student's question accurately and concisely. When course documents are provided, \
ground your answer in them and say so when they do not contain the answer.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Global system prompt, used when a project has no override
    #[serde(default = "default_system_prompt")]
    pub default_system_prompt: String,

    /// Tokens held back from the model's window for model/image overhead
    #[serde(default = "default_reserved_tokens")]
    pub reserved_tokens: usize,

    /// Number of trailing messages whose cost is reserved for history
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Context window used when a caller does not name one
    #[serde(default = "default_model_token_limit")]
    pub default_model_token_limit: usize,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}
fn default_reserved_tokens() -> usize {
    1500
}
fn default_history_window() -> usize {
    4
}
fn default_model_token_limit() -> usize {
    128_000
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            default_system_prompt: default_system_prompt(),
            reserved_tokens: default_reserved_tokens(),
            history_window: default_history_window(),
            default_model_token_limit: default_model_token_limit(),
        }
    }
}

/// Which tokenizer backs the token counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodingKind {
    #[default]
    #[serde(rename = "cl100k_base")]
    Cl100kBase,
    #[serde(rename = "o200k_base")]
    O200kBase,
    /// ~4 characters per token, no tokenizer data needed
    #[serde(rename = "estimate")]
    Estimate,
    /// A `tokenizer.json` file (requires the `hf-tokenizer` feature)
    #[serde(rename = "huggingface")]
    HuggingFace,
}

impl EncodingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cl100kBase => "cl100k_base",
            Self::O200kBase => "o200k_base",
            Self::Estimate => "estimate",
            Self::HuggingFace => "huggingface",
        }
    }
}

impl FromStr for EncodingKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cl100k_base" | "cl100k" => Ok(Self::Cl100kBase),
            "o200k_base" | "o200k" => Ok(Self::O200kBase),
            "estimate" => Ok(Self::Estimate),
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            other => Err(ConfigError::ValidationError(format!(
                "unknown tokenizer encoding '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for EncodingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenizerConfig {
    #[serde(default)]
    pub encoding: EncodingKind,

    /// Path to `tokenizer.json` (huggingface only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationConfig {
    /// Upper bound on a single link resolution (signing) call
    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,

    /// Longest span the citation parser buffers before giving up on it
    #[serde(default = "default_max_span_chars")]
    pub max_span_chars: usize,
}

fn default_resolve_timeout_ms() -> u64 {
    10_000
}
fn default_max_span_chars() -> usize {
    256
}

impl Default for CitationConfig {
    fn default() -> Self {
        Self {
            resolve_timeout_ms: default_resolve_timeout_ms(),
            max_span_chars: default_max_span_chars(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base URL that storage paths are joined onto by the CLI signer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.lectern/config.toml).
    ///
    /// Environment variables take precedence over the file:
    /// - `LECTERN_ENCODING`
    /// - `LECTERN_MODEL_TOKEN_LIMIT`
    /// - `LECTERN_STORAGE_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(encoding) = std::env::var("LECTERN_ENCODING") {
            self.tokenizer.encoding = encoding.parse()?;
        }

        if let Ok(limit) = std::env::var("LECTERN_MODEL_TOKEN_LIMIT") {
            self.prompt.default_model_token_limit = limit.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "LECTERN_MODEL_TOKEN_LIMIT must be an integer, got '{limit}'"
                ))
            })?;
        }

        if let Ok(url) = std::env::var("LECTERN_STORAGE_BASE_URL") {
            self.storage.public_base_url = Some(url);
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".lectern")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prompt.history_window == 0 {
            return Err(ConfigError::ValidationError(
                "prompt.history_window must be at least 1".into(),
            ));
        }

        if self.citations.max_span_chars < 16 {
            return Err(ConfigError::ValidationError(
                "citations.max_span_chars must be at least 16".into(),
            ));
        }

        if self.citations.resolve_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "citations.resolve_timeout_ms must be > 0".into(),
            ));
        }

        if self.tokenizer.encoding == EncodingKind::HuggingFace && self.tokenizer.path.is_none() {
            return Err(ConfigError::ValidationError(
                "tokenizer.path is required for the huggingface encoding".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for lectern_core::Error {
    fn from(err: ConfigError) -> Self {
        lectern_core::Error::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.prompt.reserved_tokens, 1500);
        assert_eq!(config.prompt.history_window, 4);
        assert_eq!(config.tokenizer.encoding, EncodingKind::Cl100kBase);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.prompt.reserved_tokens, config.prompt.reserved_tokens);
        assert_eq!(parsed.tokenizer.encoding, config.tokenizer.encoding);
    }

    #[test]
    fn zero_history_window_rejected() {
        let mut config = AppConfig::default();
        config.prompt.history_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn huggingface_requires_path() {
        let mut config = AppConfig::default();
        config.tokenizer.encoding = EncodingKind::HuggingFace;
        assert!(config.validate().is_err());
        config.tokenizer.path = Some(PathBuf::from("tokenizer.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::read_file(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.prompt.reserved_tokens, 1500);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[prompt]
history_window = 6

[tokenizer]
encoding = "o200k_base"

[citations]
resolve_timeout_ms = 500
"#
        )
        .unwrap();

        let config = AppConfig::read_file(file.path()).unwrap();
        assert_eq!(config.prompt.history_window, 6);
        assert_eq!(config.prompt.reserved_tokens, 1500);
        assert_eq!(config.tokenizer.encoding, EncodingKind::O200kBase);
        assert_eq!(config.citations.resolve_timeout_ms, 500);
        assert_eq!(config.citations.max_span_chars, 256);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[prompt\nreserved_tokens = ").unwrap();
        let err = AppConfig::read_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn encoding_names_parse() {
        assert_eq!("cl100k_base".parse::<EncodingKind>().unwrap(), EncodingKind::Cl100kBase);
        assert_eq!("O200K".parse::<EncodingKind>().unwrap(), EncodingKind::O200kBase);
        assert_eq!("estimate".parse::<EncodingKind>().unwrap(), EncodingKind::Estimate);
        assert!("gpt2".parse::<EncodingKind>().is_err());
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("reserved_tokens = 1500"));
        assert!(toml_str.contains("cl100k_base"));
    }

    #[test]
    fn config_error_converts_to_core_error() {
        let err: lectern_core::Error = ConfigError::ValidationError("bad".into()).into();
        assert!(err.to_string().contains("bad"));
    }
}
