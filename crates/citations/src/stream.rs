//! Stream adapters that run model output through a [`CitationRewriter`].
//!
//! Fragments are rewritten strictly in arrival order on the task polling
//! the stream. Dropping the returned stream drops the rewriter along with
//! any link resolution in flight.

use futures::stream::{self, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::machine::CitationRewriter;
use crate::state::ParserState;
use crate::stream_event::CitationStreamEvent;

struct Rewriting<S> {
    upstream: S,
    rewriter: CitationRewriter,
    state: ParserState,
}

/// Rewrite citations in a stream of model output fragments.
///
/// Yields non-empty rewritten fragments, then whatever was still buffered
/// when upstream ended. An upstream error is yielded once and ends the
/// stream; buffered text is not emitted after it.
pub fn rewrite_stream<S, E>(
    upstream: S,
    rewriter: CitationRewriter,
) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<String, E>>,
{
    let start = Rewriting {
        upstream: Box::pin(upstream),
        rewriter,
        state: ParserState::new(),
    };

    stream::unfold(Some(start), |slot| async move {
        let mut r = slot?;
        loop {
            match r.upstream.next().await {
                Some(Ok(fragment)) => {
                    let out = r.rewriter.process(&mut r.state, &fragment).await;
                    if !out.is_empty() {
                        return Some((Ok(out), Some(r)));
                    }
                }
                Some(Err(e)) => {
                    warn!(buffered = r.state.buffer().len(), "Upstream stream failed");
                    return Some((Err(e), None));
                }
                None => {
                    let tail = r.rewriter.flush(&mut r.state);
                    debug!(links = r.rewriter.resolver().cache().len(), "Citation stream finished");
                    return if tail.is_empty() {
                        None
                    } else {
                        Some((Ok(tail), None))
                    };
                }
            }
        }
    })
}

/// [`rewrite_stream`] over the receiving half of a channel.
pub fn rewrite_receiver<E>(
    rx: mpsc::Receiver<Result<String, E>>,
    rewriter: CitationRewriter,
) -> impl Stream<Item = Result<String, E>> {
    rewrite_stream(ReceiverStream::new(rx), rewriter)
}

/// Wrap a rewritten stream as client-facing events: one `chunk` per
/// fragment, then `done`, or `error` in place of `done` on failure.
pub fn into_events<S, E>(rewritten: S) -> impl Stream<Item = CitationStreamEvent>
where
    S: Stream<Item = Result<String, E>>,
    E: std::fmt::Display,
{
    stream::unfold(Some((Box::pin(rewritten), 0usize)), |slot| async move {
        let (mut rewritten, fragments) = slot?;
        match rewritten.next().await {
            Some(Ok(content)) => Some((
                CitationStreamEvent::Chunk { content },
                Some((rewritten, fragments + 1)),
            )),
            Some(Err(e)) => Some((
                CitationStreamEvent::Error {
                    message: e.to_string(),
                },
                None,
            )),
            None => Some((CitationStreamEvent::Done { fragments }, None)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::LinkResolver;
    use lectern_core::{NoopSigner, Passage};
    use std::sync::Arc;

    // ── Helpers ────────────────────────────────────────────────────────

    fn rewriter() -> CitationRewriter {
        let passages = vec![
            Passage::new(1, "Lecture 1", "a").with_url("http://x/1"),
            Passage::new(2, "Lecture 2", "b").with_url("http://x/2"),
        ];
        CitationRewriter::new(LinkResolver::new(passages, Arc::new(NoopSigner)))
    }

    fn fragments(parts: &[&str]) -> Vec<Result<String, String>> {
        parts.iter().map(|p| Ok(p.to_string())).collect()
    }

    // ── Tests ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn rewrites_in_arrival_order() {
        let upstream = stream::iter(fragments(&["See [1", "] and [2]", "."]));
        let out: Vec<String> = rewrite_stream(upstream, rewriter())
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec!["See ", "[1](http://x/1) and [2](http://x/2)", "."]);
    }

    #[tokio::test]
    async fn buffered_tail_flushed_at_end() {
        let upstream = stream::iter(fragments(&["Ends with [1, pa"]));
        let out: Vec<String> = rewrite_stream(upstream, rewriter())
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec!["Ends with ", "[1, pa"]);
    }

    #[tokio::test]
    async fn empty_fragments_are_not_yielded() {
        let upstream = stream::iter(fragments(&["", "[", "1", "]"]));
        let out: Vec<String> = rewrite_stream(upstream, rewriter())
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec!["[1](http://x/1)"]);
    }

    #[tokio::test]
    async fn upstream_error_terminates() {
        let upstream = stream::iter(vec![
            Ok("Partial [1".to_string()),
            Err("connection reset".to_string()),
            Ok("] never seen".to_string()),
        ]);
        let out: Vec<Result<String, String>> = rewrite_stream(upstream, rewriter()).collect().await;
        assert_eq!(
            out,
            vec![Ok("Partial ".to_string()), Err("connection reset".to_string())]
        );
    }

    #[tokio::test]
    async fn receiver_stream_rewrites() {
        let (tx, rx) = mpsc::channel::<Result<String, String>>(8);
        tokio::spawn(async move {
            for part in ["Per [", "2]", ", done"] {
                tx.send(Ok(part.to_string())).await.unwrap();
            }
        });
        let out: String = rewrite_receiver(rx, rewriter())
            .map(|r| r.unwrap())
            .collect::<Vec<_>>()
            .await
            .concat();
        assert_eq!(out, "Per [2](http://x/2), done");
    }

    #[tokio::test]
    async fn events_end_with_done() {
        let upstream = stream::iter(fragments(&["A [1]", " B"]));
        let events: Vec<CitationStreamEvent> =
            into_events(rewrite_stream(upstream, rewriter())).collect().await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type(), "chunk");
        assert!(matches!(events[2], CitationStreamEvent::Done { fragments: 2 }));
    }

    #[tokio::test]
    async fn events_end_with_error_on_failure() {
        let upstream = stream::iter(vec![Ok("A".to_string()), Err("boom".to_string())]);
        let events: Vec<CitationStreamEvent> =
            into_events(rewrite_stream(upstream, rewriter())).collect().await;
        assert_eq!(events.len(), 2);
        match &events[1] {
            CitationStreamEvent::Error { message } => assert_eq!(message, "boom"),
            other => panic!("expected error, got {other:?}"),
        }
    }
}
