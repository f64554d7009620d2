//! Parser state carried between stream fragments.

use serde::{Deserialize, Serialize};

/// What the citation parser is in the middle of.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    /// Plain text, emitted as it arrives.
    #[default]
    Normal,
    /// Saw `[` or a leading digit; not yet known whether a citation or a
    /// numbered filename line follows.
    PossibleCitationOrFilename,
    /// Inside `[n` or `[n, page: p`.
    InCitation,
    /// After `n.` at the start of a word, waiting for `[`.
    InFilename,
    /// Inside `n. [name](...`.
    InFilenameLink,
}

/// State of one citation parse, threaded through every call for a stream.
///
/// Create one per response stream and pass it to each
/// [`CitationRewriter::process`](crate::CitationRewriter::process) call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserState {
    pub(crate) mode: ParseMode,
    pub(crate) buffer: String,
    /// Whether the last consumed character was whitespace (or nothing was
    /// consumed yet).
    pub(crate) at_boundary: bool,
}

impl Default for ParserState {
    fn default() -> Self {
        Self {
            mode: ParseMode::Normal,
            buffer: String::new(),
            at_boundary: true,
        }
    }
}

impl ParserState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> ParseMode {
        self.mode
    }

    /// Text held back because it may still become a link.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// True when nothing is buffered.
    pub fn is_idle(&self) -> bool {
        self.mode == ParseMode::Normal && self.buffer.is_empty()
    }

    pub(crate) fn begin(&mut self, mode: ParseMode, c: char) {
        self.mode = mode;
        self.buffer.clear();
        self.buffer.push(c);
    }

    /// Clear the buffer and return to [`ParseMode::Normal`], returning what
    /// was buffered.
    pub(crate) fn take(&mut self) -> String {
        self.mode = ParseMode::Normal;
        std::mem::take(&mut self.buffer)
    }

    pub(crate) fn span_chars(&self) -> usize {
        self.buffer.chars().count()
    }

    /// Record emitted text.
    pub(crate) fn emitted(&mut self, out: &mut String, text: &str) {
        if let Some(last) = text.chars().last() {
            self.at_boundary = last.is_whitespace();
        }
        out.push_str(text);
    }
}
