//! # Lectern Core
//!
//! Domain types, collaborator traits, and error definitions for Lectern's
//! prompt assembly and citation streaming. This crate has **no async runtime
//! dependency**; it defines the model that the other crates implement
//! against.
//!
//! External collaborators (document retrieval, the model call, object
//! storage, project settings) are represented here as plain data or traits
//! so they can be swapped or mocked in tests.

pub mod error;
pub mod message;
pub mod passage;
pub mod project;
pub mod storage;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result, StorageError, TokenizerError};
pub use message::{
    ContentPart, ConversationId, ConversationTurn, ImageUrl, Message, MessageContent, ModelSpec,
    Role,
};
pub use passage::{Passage, ToolOutput, ToolResult};
pub use project::{ProjectConfig, SystemPromptSource};
pub use storage::{NoopSigner, UrlSigner};
