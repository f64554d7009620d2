//! Retrieved passages and tool results — the read-only inputs the prompt
//! assembler folds into a turn.

use serde::{Deserialize, Serialize};

/// A ranked, retrieved text excerpt with provenance metadata.
///
/// Produced by the external retriever in rank order. `index` is the 1-based
/// display index the model uses when citing (`[3]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// 1-based display index
    pub index: usize,

    /// Excerpt text
    pub text: String,

    /// Human-readable document name
    pub readable_filename: String,

    /// Page the excerpt came from, if the document is paginated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,

    /// Public URL of the source document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Object-storage path, signed on demand when no URL is stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,

    /// Course the document belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_name: Option<String>,
}

impl Passage {
    pub fn new(index: usize, readable_filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            readable_filename: readable_filename.into(),
            page_number: None,
            url: None,
            storage_path: None,
            course_name: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page_number = Some(page);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_storage_path(mut self, path: impl Into<String>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Whether the passage carries any text worth sending to the model.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// What a tool produced. At most one field is expected to be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// The result of a tool run on behalf of the user's message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Display name of the tool
    pub readable_name: String,

    /// Output, when the tool succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ToolOutput>,

    /// Error message, when the tool failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            readable_name: name.into(),
            output: Some(ToolOutput {
                text: Some(text.into()),
                ..Default::default()
            }),
            error: None,
        }
    }

    pub fn data(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            readable_name: name.into(),
            output: Some(ToolOutput {
                data: Some(data),
                ..Default::default()
            }),
            error: None,
        }
    }

    pub fn images(name: impl Into<String>, urls: Vec<String>) -> Self {
        Self {
            readable_name: name.into(),
            output: Some(ToolOutput {
                image_urls: Some(urls),
                ..Default::default()
            }),
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            readable_name: name.into(),
            output: None,
            error: Some(error.into()),
        }
    }
}
