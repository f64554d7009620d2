//! Project (course) level prompt settings.
//!
//! Each course may override the global system prompt. Where the override
//! comes from is up to the caller: a static [`ProjectConfig`] for tests and
//! the CLI, or a database-backed store implementing [`SystemPromptSource`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Looks up a project's system prompt override.
#[async_trait]
pub trait SystemPromptSource: Send + Sync {
    /// The project-level system prompt, or `None` to use the global default.
    async fn system_prompt(&self) -> std::result::Result<Option<String>, Error>;
}

/// Static project settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Course (project) name
    #[serde(default)]
    pub course_name: String,

    /// System prompt override for this project
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl ProjectConfig {
    pub fn new(course_name: impl Into<String>) -> Self {
        Self {
            course_name: course_name.into(),
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

#[async_trait]
impl SystemPromptSource for ProjectConfig {
    async fn system_prompt(&self) -> std::result::Result<Option<String>, Error> {
        // A blank override is treated as unset.
        Ok(self
            .system_prompt
            .as_ref()
            .filter(|p| !p.trim().is_empty())
            .cloned())
    }
}
