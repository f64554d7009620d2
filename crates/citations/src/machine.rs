//! The citation rewriting state machine.
//!
//! Model output arrives as arbitrary text fragments. The rewriter scans it
//! one character at a time, holds back anything that may still turn out to
//! be a citation, and rewrites two shapes into links:
//!
//! | Written by the model | Emitted |
//! |----------------------|---------|
//! | `[n]` | `[n](url)` |
//! | `[n, page: p]` | `[n](url#page=p)` |
//! | `n. [name](#)` | `n. [name](url)` |
//! | `n. [name, page: p](#)` | `n. [name, page: p](url#page=p)` |
//!
//! Everything else passes through unchanged. The machine never looks past
//! the current character, so the concatenated output depends only on the
//! concatenated input, not on where fragment boundaries fall.

use std::collections::VecDeque;

use lectern_config::CitationConfig;
use tracing::debug;

use crate::resolver::LinkResolver;
use crate::state::{ParseMode, ParserState};

/// Rewrites citations in a streamed response. One per response stream.
#[derive(Debug)]
pub struct CitationRewriter {
    resolver: LinkResolver,
    max_span_chars: usize,
}

impl CitationRewriter {
    pub fn new(resolver: LinkResolver) -> Self {
        Self {
            resolver,
            max_span_chars: CitationConfig::default().max_span_chars,
        }
    }

    pub fn from_config(resolver: LinkResolver, config: &CitationConfig) -> Self {
        Self::new(resolver).with_max_span_chars(config.max_span_chars)
    }

    /// Longest span held back before it is given up on.
    pub fn with_max_span_chars(mut self, max: usize) -> Self {
        self.max_span_chars = max;
        self
    }

    pub fn resolver(&self) -> &LinkResolver {
        &self.resolver
    }

    /// Consume one fragment and return the text that can be emitted now.
    ///
    /// Text that may still become a link stays in `state` for the next call.
    pub async fn process(&mut self, state: &mut ParserState, fragment: &str) -> String {
        let mut out = String::with_capacity(fragment.len());
        let mut pending: VecDeque<char> = fragment.chars().collect();

        while let Some(c) = pending.pop_front() {
            match state.mode {
                ParseMode::Normal => self.normal(state, c, &mut out),
                ParseMode::PossibleCitationOrFilename => {
                    self.possible(state, c, &mut pending, &mut out)
                }
                ParseMode::InCitation => self.in_citation(state, c, &mut pending, &mut out).await,
                ParseMode::InFilename => self.in_filename(state, c, &mut pending, &mut out),
                ParseMode::InFilenameLink => {
                    self.in_filename_link(state, c, &mut pending, &mut out).await
                }
            }
        }

        out
    }

    /// End of stream: emit whatever is still buffered, unchanged.
    pub fn flush(&self, state: &mut ParserState) -> String {
        let rest = state.take();
        if !rest.is_empty() {
            debug!(span = %rest, "Flushing unfinished span");
        }
        rest
    }

    // ── States ────────────────────────────────────────────────────────────

    fn normal(&self, state: &mut ParserState, c: char, out: &mut String) {
        if c == '[' || (c.is_ascii_digit() && state.at_boundary) {
            state.begin(ParseMode::PossibleCitationOrFilename, c);
        } else {
            let mut buf = [0u8; 4];
            state.emitted(out, c.encode_utf8(&mut buf));
        }
    }

    fn possible(
        &self,
        state: &mut ParserState,
        c: char,
        pending: &mut VecDeque<char>,
        out: &mut String,
    ) {
        if state.buffer == "[" {
            if c.is_ascii_digit() {
                state.buffer.push(c);
                state.mode = ParseMode::InCitation;
            } else {
                abandon(state, c, pending, out);
            }
        } else if c.is_ascii_digit() {
            state.buffer.push(c);
            self.enforce_cap(state, out);
        } else if c == '.' {
            state.buffer.push(c);
            state.mode = ParseMode::InFilename;
        } else {
            abandon(state, c, pending, out);
        }
    }

    async fn in_citation(
        &mut self,
        state: &mut ParserState,
        c: char,
        pending: &mut VecDeque<char>,
        out: &mut String,
    ) {
        if c == ']' {
            state.buffer.push(c);
            let span = state.take();
            let rewritten = match parse_citation(&span) {
                Some((index, page)) => self
                    .resolver
                    .link_for(index)
                    .await
                    .map(|url| format!("[{index}]({})", with_page(&url, page))),
                None => None,
            };
            state.emitted(out, rewritten.as_deref().unwrap_or(&span));
        } else if is_citation_char(c) {
            state.buffer.push(c);
            self.enforce_cap(state, out);
        } else {
            abandon(state, c, pending, out);
        }
    }

    fn in_filename(
        &self,
        state: &mut ParserState,
        c: char,
        pending: &mut VecDeque<char>,
        out: &mut String,
    ) {
        if c == '[' {
            state.buffer.push(c);
            state.mode = ParseMode::InFilenameLink;
        } else if c.is_whitespace() && c != '\n' && c != '\r' {
            state.buffer.push(c);
            self.enforce_cap(state, out);
        } else {
            abandon(state, c, pending, out);
        }
    }

    async fn in_filename_link(
        &mut self,
        state: &mut ParserState,
        c: char,
        pending: &mut VecDeque<char>,
        out: &mut String,
    ) {
        state.buffer.push(c);

        if c == '\n' || state.span_chars() > self.max_span_chars {
            replay_link(state, pending, out);
            return;
        }

        let open = state.buffer.find('[').unwrap_or(0);
        let Some(close) = state.buffer[open..].find(']').map(|i| open + i) else {
            return;
        };
        let after = &state.buffer[close + 1..];
        if after.is_empty() {
            return;
        }
        if !after.starts_with('(') {
            replay_link(state, pending, out);
            return;
        }
        if c != ')' || after.len() < 2 {
            return;
        }

        match self.rewrite_filename_link(&state.buffer).await {
            Some(rewritten) => {
                state.take();
                state.emitted(out, &rewritten);
            }
            None => replay_link(state, pending, out),
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    /// Give up on a span that grew past the cap, emitting it unchanged.
    fn enforce_cap(&self, state: &mut ParserState, out: &mut String) {
        if state.span_chars() > self.max_span_chars {
            let span = state.take();
            debug!(chars = span.chars().count(), "Span too long, emitting unchanged");
            state.emitted(out, &span);
        }
    }

    async fn rewrite_filename_link(&mut self, span: &str) -> Option<String> {
        let open = span.find('[')?;
        let (prefix, link) = span.split_at(open);
        let index: usize = prefix.trim_end().strip_suffix('.')?.parse().ok()?;
        let close = link.find(']')?;
        let (name, page) = split_page(&link[1..close]);
        if name.trim().is_empty() {
            return None;
        }

        let url = self.resolver.link_for(index).await?;
        Some(match page {
            Some(page) => format!("{prefix}[{name}, page: {page}]({})", with_page(&url, Some(page))),
            None => format!("{prefix}[{name}]({url})"),
        })
    }
}

/// Emit the buffer unchanged and reprocess `c` from [`ParseMode::Normal`].
fn abandon(state: &mut ParserState, c: char, pending: &mut VecDeque<char>, out: &mut String) {
    let span = state.take();
    state.emitted(out, &span);
    pending.push_front(c);
}

/// Give up on a filename link: emit the `n.` prefix unchanged and replay the
/// rest of the span from [`ParseMode::Normal`], so citations inside it are
/// still found.
fn replay_link(state: &mut ParserState, pending: &mut VecDeque<char>, out: &mut String) {
    let span = state.take();
    let open = span.find('[').unwrap_or(span.len());
    state.emitted(out, &span[..open]);
    for ch in span[open..].chars().rev() {
        pending.push_front(ch);
    }
}

fn is_citation_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, ',' | ' ' | ':') || "pagePAGE".contains(c)
}

fn with_page(url: &str, page: Option<u32>) -> String {
    match page {
        Some(page) => format!("{url}#page={page}"),
        None => url.to_string(),
    }
}

/// Parse `[n]` or `[n, page: p]`.
fn parse_citation(span: &str) -> Option<(usize, Option<u32>)> {
    let inner = span.strip_prefix('[')?.strip_suffix(']')?;
    match inner.split_once(',') {
        Some((index, page)) => Some((index.trim().parse().ok()?, Some(parse_page(page)?))),
        None => Some((inner.trim().parse().ok()?, None)),
    }
}

/// Parse ` page: p` (keyword case-insensitive).
fn parse_page(text: &str) -> Option<u32> {
    let text = text.trim_start();
    let keyword = text.get(..4)?;
    if !keyword.eq_ignore_ascii_case("page") {
        return None;
    }
    text[4..].trim_start().strip_prefix(':')?.trim().parse().ok()
}

/// Split `name, page: p` into its name and page; other labels are all name.
fn split_page(label: &str) -> (&str, Option<u32>) {
    if let Some((name, page)) = label.rsplit_once(',')
        && let Some(page) = parse_page(page)
    {
        return (name.trim_end(), Some(page));
    }
    (label, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lectern_core::{NoopSigner, Passage, StorageError, UrlSigner};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ── Helpers ────────────────────────────────────────────────────────

    struct PrefixSigner {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UrlSigner for PrefixSigner {
        fn name(&self) -> &str {
            "prefix"
        }

        async fn sign(&self, storage_path: &str) -> Result<String, StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("signed:{storage_path}"))
        }
    }

    fn passages() -> Vec<Passage> {
        vec![
            Passage::new(1, "Lecture 1", "a").with_url("http://x/1"),
            Passage::new(2, "Lecture 2", "b").with_storage_path("s3://b"),
            Passage::new(3, "Lecture 3", "c").with_url("http://x/3"),
            Passage::new(7, "Lecture 7", "d").with_storage_path("courses/l7.pdf"),
            Passage::new(12, "Lecture 12", "e").with_url("http://x/12"),
        ]
    }

    fn rewriter() -> (CitationRewriter, Arc<PrefixSigner>) {
        let signer = Arc::new(PrefixSigner {
            calls: AtomicUsize::new(0),
        });
        let resolver = LinkResolver::new(passages(), signer.clone());
        (CitationRewriter::new(resolver), signer)
    }

    async fn rewrite_fragments(fragments: &[&str]) -> String {
        let (mut rw, _) = rewriter();
        let mut state = ParserState::new();
        let mut out = String::new();
        for fragment in fragments {
            out.push_str(&rw.process(&mut state, fragment).await);
        }
        out.push_str(&rw.flush(&mut state));
        out
    }

    async fn rewrite(text: &str) -> String {
        rewrite_fragments(&[text]).await
    }

    /// Every split of `text` into two fragments gives the same output.
    async fn assert_split_invariant(text: &str) {
        let whole = rewrite(text).await;
        for (i, _) in text.char_indices().skip(1) {
            let split = rewrite_fragments(&[&text[..i], &text[i..]]).await;
            assert_eq!(split, whole, "split at byte {i} of {text:?}");
        }
    }

    // ── Inline citations ───────────────────────────────────────────────

    #[tokio::test]
    async fn plain_text_passes_through() {
        let text = "Latches are level-sensitive; flip-flops are edge-triggered.";
        assert_eq!(rewrite(text).await, text);
    }

    #[tokio::test]
    async fn citation_with_url() {
        assert_eq!(rewrite("As shown [1].").await, "As shown [1](http://x/1).");
    }

    #[tokio::test]
    async fn citation_with_page() {
        assert_eq!(
            rewrite("See [12, page: 3] for details.").await,
            "See [12](http://x/12#page=3) for details."
        );
        assert_eq!(rewrite("[1, Page:4]").await, "[1](http://x/1#page=4)");
    }

    #[tokio::test]
    async fn citation_split_across_fragments() {
        assert_eq!(
            rewrite_fragments(&["See [1", "] and [2]."]).await,
            "See [1](http://x/1) and [2](signed:s3://b)."
        );
    }

    #[tokio::test]
    async fn unknown_index_left_unchanged() {
        assert_eq!(rewrite("Unknown [99] here").await, "Unknown [99] here");
    }

    #[tokio::test]
    async fn failed_signing_left_unchanged() {
        let resolver = LinkResolver::new(passages(), Arc::new(NoopSigner));
        let mut rw = CitationRewriter::new(resolver);
        let mut state = ParserState::new();
        let out = rw.process(&mut state, "Signed [2] vs public [1]").await;
        assert_eq!(out, "Signed [2] vs public [1](http://x/1)");
    }

    #[tokio::test]
    async fn non_citation_brackets_left_unchanged() {
        for text in [
            "an array a[i] here",
            "[note] inline",
            "[1 2 3]",
            "[1, pg 2]",
            "matrix [1; 2]",
            "[12",
            "[",
        ] {
            assert_eq!(rewrite(text).await, text, "{text:?}");
        }
    }

    #[tokio::test]
    async fn adjacent_citations() {
        assert_eq!(
            rewrite("[1][3]").await,
            "[1](http://x/1)[3](http://x/3)"
        );
    }

    #[tokio::test]
    async fn repeated_index_signed_once() {
        let (mut rw, signer) = rewriter();
        let mut state = ParserState::new();
        let out = rw
            .process(&mut state, "[7] then [7, page: 2] and again [7]")
            .await;
        assert_eq!(
            out,
            "[7](signed:courses/l7.pdf) then [7](signed:courses/l7.pdf#page=2) and again [7](signed:courses/l7.pdf)"
        );
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
    }

    // ── Filename links ─────────────────────────────────────────────────

    #[tokio::test]
    async fn filename_link_rewritten() {
        let text = "Relevant Sources:\n1. [Lecture 1](#)\n2. [Lecture 2, page: 5](#)\n";
        assert_eq!(
            rewrite(text).await,
            "Relevant Sources:\n1. [Lecture 1](http://x/1)\n2. [Lecture 2, page: 5](signed:s3://b#page=5)\n"
        );
    }

    #[tokio::test]
    async fn filename_link_uses_name_as_written() {
        assert_eq!(
            rewrite("3. [Week 3 Slides](#)").await,
            "3. [Week 3 Slides](http://x/3)"
        );
    }

    #[tokio::test]
    async fn numbered_list_without_link_unchanged() {
        let text = "Steps:\n1. Reset the latch\n2. Clock it\n3.5 volts, 3 cats";
        assert_eq!(rewrite(text).await, text);
    }

    #[tokio::test]
    async fn citation_inside_numbered_line_still_resolves() {
        assert_eq!(
            rewrite("3. [1] explains it").await,
            "3. [1](http://x/1) explains it"
        );
    }

    #[tokio::test]
    async fn filename_link_broken_by_newline() {
        assert_eq!(
            rewrite("1. [Lecture 1\n](#)").await,
            "1. [Lecture 1\n](#)"
        );
    }

    #[tokio::test]
    async fn unresolvable_filename_link_unchanged() {
        assert_eq!(rewrite("9. [Missing](#)").await, "9. [Missing](#)");
    }

    #[tokio::test]
    async fn digits_inside_words_do_not_start_spans() {
        assert_eq!(rewrite("x86. [1]").await, "x86. [1](http://x/1)");
    }

    #[tokio::test]
    async fn long_span_is_given_up() {
        let resolver = LinkResolver::new(passages(), Arc::new(NoopSigner));
        let mut rw = CitationRewriter::new(resolver).with_max_span_chars(16);
        let mut state = ParserState::new();
        let text = "1. [A very long document name](#)";
        let mut out = rw.process(&mut state, text).await;
        out.push_str(&rw.flush(&mut state));
        assert_eq!(out, text);
        assert!(state.is_idle());
    }

    // ── Fragment boundaries ────────────────────────────────────────────

    #[tokio::test]
    async fn unfinished_span_is_held_then_flushed() {
        let (mut rw, _) = rewriter();
        let mut state = ParserState::new();
        assert_eq!(rw.process(&mut state, "Trailing [12, pa").await, "Trailing ");
        assert_eq!(state.mode(), ParseMode::InCitation);
        assert_eq!(state.buffer(), "[12, pa");
        assert_eq!(rw.flush(&mut state), "[12, pa");
        assert!(state.is_idle());
    }

    #[tokio::test]
    async fn page_citation_survives_every_split() {
        assert_split_invariant("Flip-flops [12, page: 3] store state.").await;
    }

    #[tokio::test]
    async fn sources_list_survives_every_split() {
        assert_split_invariant(
            "Use [1] and [2, page: 4].\n\nRelevant Sources:\n1. [Lecture 1](#)\n2. [Lecture 2, page: 4](#)\n3. [1] x",
        )
        .await;
    }

    #[tokio::test]
    async fn char_by_char_matches_whole() {
        let text = "Per [3], see:\n3. [Lecture 3, page: 9](#) and [7].";
        let chars: Vec<String> = text.chars().map(String::from).collect();
        let fragments: Vec<&str> = chars.iter().map(String::as_str).collect();
        assert_eq!(rewrite_fragments(&fragments).await, rewrite(text).await);
    }

    #[tokio::test]
    async fn multibyte_text_preserved() {
        let text = "Résumé — naïve [1] 日本語";
        assert_eq!(rewrite(text).await, "Résumé — naïve [1](http://x/1) 日本語");
        assert_split_invariant(text).await;
    }

    // ── Parsing ────────────────────────────────────────────────────────

    #[test]
    fn parses_citation_forms() {
        assert_eq!(parse_citation("[4]"), Some((4, None)));
        assert_eq!(parse_citation("[4, page: 10]"), Some((4, Some(10))));
        assert_eq!(parse_citation("[4,PAGE :10]"), Some((4, Some(10))));
        assert_eq!(parse_citation("[4, 5]"), None);
        assert_eq!(parse_citation("[4, page:]"), None);
    }

    #[test]
    fn splits_page_from_name() {
        assert_eq!(split_page("Notes, page: 2"), ("Notes", Some(2)));
        assert_eq!(split_page("Smith, Jones"), ("Smith, Jones", None));
        assert_eq!(split_page("Plain"), ("Plain", None));
    }
}
