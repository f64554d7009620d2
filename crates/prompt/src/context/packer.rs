//! Greedy passage packing under a token limit.
//!
//! Passages arrive in rank order from the retriever. The packer walks them
//! once and keeps every passage whose cost still fits; a passage that does
//! not fit is skipped and the walk continues, so a smaller, lower-ranked
//! passage can still be included after a larger one was dropped.

use std::sync::Arc;

use lectern_core::{Passage, TokenizerError};
use tracing::debug;

use crate::context::token::TokenCounter;

/// Separator written before every packed passage.
pub const PASSAGE_SEPARATOR: &str = "---\n";

/// A passage that did not fit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPassage {
    /// Display index of the passage
    pub index: usize,
    /// Tokens it would have cost
    pub tokens: usize,
}

/// The outcome of packing.
#[derive(Debug, Clone, Default)]
pub struct PackedContext {
    /// Included passages, in rank order
    pub included: Vec<Passage>,
    /// Rendered text of the included passages
    pub text: String,
    /// Total cost of the included passages
    pub tokens: usize,
    /// Passages left out, in rank order
    pub skipped: Vec<SkippedPassage>,
}

impl PackedContext {
    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }

    pub fn skipped_tokens(&self) -> usize {
        self.skipped.iter().map(|s| s.tokens).sum()
    }
}

/// Selects the passages that fit a token limit.
#[derive(Debug, Clone)]
pub struct ContextPacker {
    counter: Arc<TokenCounter>,
}

impl ContextPacker {
    pub fn new(counter: Arc<TokenCounter>) -> Self {
        Self { counter }
    }

    /// Render one passage as it appears in the prompt.
    ///
    /// ```text
    /// ---
    /// 3: Lecture 4 Notes, page: 12
    /// <text>
    /// ```
    pub fn format_passage(passage: &Passage) -> String {
        let page = passage
            .page_number
            .map(|p| format!(", page: {p}"))
            .unwrap_or_default();
        format!(
            "{PASSAGE_SEPARATOR}{}: {}{}\n{}\n",
            passage.index, passage.readable_filename, page, passage.text
        )
    }

    /// Pack `passages` into at most `limit` tokens.
    pub fn pack(&self, passages: &[Passage], limit: usize) -> Result<PackedContext, TokenizerError> {
        let mut packed = PackedContext::default();

        for passage in passages {
            let entry = Self::format_passage(passage);
            let cost = self.counter.count(&entry)?;

            if packed.tokens + cost <= limit {
                debug!(index = passage.index, tokens = cost, "Packed passage");
                packed.text.push_str(&entry);
                packed.tokens += cost;
                packed.included.push(passage.clone());
            } else {
                debug!(
                    index = passage.index,
                    tokens = cost,
                    used = packed.tokens,
                    limit,
                    "Passage does not fit, skipping"
                );
                packed.skipped.push(SkippedPassage {
                    index: passage.index,
                    tokens: cost,
                });
            }
        }

        Ok(packed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Helpers ────────────────────────────────────────────────────────

    fn packer() -> ContextPacker {
        ContextPacker::new(Arc::new(TokenCounter::estimate()))
    }

    fn passage(index: usize, text: &str) -> Passage {
        Passage::new(index, format!("doc{index}"), text)
    }

    fn cost(p: &Passage) -> usize {
        TokenCounter::estimate()
            .count(&ContextPacker::format_passage(p))
            .unwrap()
    }

    // ── Tests ──────────────────────────────────────────────────────────

    #[test]
    fn passage_format_with_and_without_page() {
        let plain = passage(1, "Flip-flops store one bit.");
        assert_eq!(
            ContextPacker::format_passage(&plain),
            "---\n1: doc1\nFlip-flops store one bit.\n"
        );

        let paged = passage(2, "Latches are level-sensitive.").with_page(7);
        assert_eq!(
            ContextPacker::format_passage(&paged),
            "---\n2: doc2, page: 7\nLatches are level-sensitive.\n"
        );
    }

    #[test]
    fn everything_fits_with_generous_limit() {
        let passages = vec![passage(1, "alpha"), passage(2, "beta"), passage(3, "gamma")];
        let packed = packer().pack(&passages, 10_000).unwrap();
        assert_eq!(packed.included.len(), 3);
        assert!(packed.skipped.is_empty());
        assert_eq!(
            packed.text,
            "---\n1: doc1\nalpha\n---\n2: doc2\nbeta\n---\n3: doc3\ngamma\n"
        );
    }

    #[test]
    fn zero_limit_packs_nothing() {
        let passages = vec![passage(1, "alpha")];
        let packed = packer().pack(&passages, 0).unwrap();
        assert!(packed.is_empty());
        assert_eq!(packed.tokens, 0);
        assert_eq!(packed.skipped.len(), 1);
    }

    #[test]
    fn large_passage_is_skipped_and_later_small_one_kept() {
        let small_first = passage(1, "short");
        let large = passage(2, &"x".repeat(400));
        let small_last = passage(3, "tiny");
        let limit = cost(&small_first) + cost(&small_last);

        let packed = packer()
            .pack(&[small_first, large, small_last], limit)
            .unwrap();

        let indices: Vec<usize> = packed.included.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![1, 3]);
        assert_eq!(packed.skipped.len(), 1);
        assert_eq!(packed.skipped[0].index, 2);
        assert_eq!(packed.tokens, limit);
    }

    #[test]
    fn total_never_exceeds_limit() {
        let passages: Vec<Passage> = (1..=30)
            .map(|i| passage(i, &"word ".repeat(i * 7 % 23 + 1)))
            .collect();
        for limit in [0, 1, 5, 17, 40, 99, 250, 1000] {
            let packed = packer().pack(&passages, limit).unwrap();
            assert!(packed.tokens <= limit, "limit {limit} exceeded");
            let summed: usize = packed.included.iter().map(cost).sum();
            assert_eq!(summed, packed.tokens);
        }
    }

    #[test]
    fn rank_order_is_preserved() {
        let passages: Vec<Passage> = (1..=12)
            .map(|i| passage(i, &"z".repeat((13 - i) * 9)))
            .collect();
        let packed = packer().pack(&passages, 60).unwrap();
        let indices: Vec<usize> = packed.included.iter().map(|p| p.index).collect();
        let mut sorted = indices.clone();
        sorted.sort_unstable();
        assert_eq!(indices, sorted);
        assert!(!indices.is_empty());
    }

    #[test]
    fn packing_is_deterministic() {
        let passages: Vec<Passage> = (1..=8).map(|i| passage(i, &"q".repeat(i * 11))).collect();
        let a = packer().pack(&passages, 70).unwrap();
        let b = packer().pack(&passages, 70).unwrap();
        assert_eq!(a.text, b.text);
        assert_eq!(a.tokens, b.tokens);
        assert_eq!(a.skipped, b.skipped);
    }

    #[test]
    fn uninitialized_counter_propagates() {
        let packer = ContextPacker::new(Arc::new(TokenCounter::new()));
        let err = packer.pack(&[passage(1, "a")], 100).unwrap_err();
        assert!(matches!(err, TokenizerError::NotInitialized));
    }
}
