//! Client-facing citation stream events.
//!
//! `CitationStreamEvent` wraps rewritten fragments into events a server can
//! forward to clients over SSE or WebSocket.

use serde::{Deserialize, Serialize};

/// Events emitted while streaming a rewritten response.
///
/// - `chunk` — rewritten text, links already resolved
/// - `done`  — the response is complete
/// - `error` — the upstream model stream failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CitationStreamEvent {
    /// Rewritten text.
    Chunk { content: String },

    /// The stream is complete.
    Done { fragments: usize },

    /// The upstream stream failed; no further events follow.
    Error { message: String },
}

impl CitationStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}
