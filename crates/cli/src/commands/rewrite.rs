//! `lectern rewrite` — Resolve citations in model output read from stdin.
//!
//! The input is cut into fixed-size fragments and fed through the same
//! stream adapter a live model response goes through.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use lectern_citations::{CitationRewriter, LinkResolver, rewrite_stream};
use lectern_config::AppConfig;
use lectern_core::Passage;
use tokio::io::AsyncReadExt;

use crate::signer::BaseUrlSigner;

pub async fn run(
    config: &AppConfig,
    passages_path: &Path,
    chunk_size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(passages_path)
        .map_err(|e| format!("Failed to read {}: {e}", passages_path.display()))?;
    let passages: Vec<Passage> = serde_json::from_str(&raw)
        .map_err(|e| format!("Invalid passages file {}: {e}", passages_path.display()))?;

    let signer = Arc::new(BaseUrlSigner::new(config.storage.public_base_url.clone()));
    let resolver = LinkResolver::from_config(passages, signer, &config.citations);
    let rewriter = CitationRewriter::from_config(resolver, &config.citations);

    let mut input = String::new();
    tokio::io::stdin().read_to_string(&mut input).await?;

    let fragments = split_fragments(&input, chunk_size.max(1));
    let upstream = futures::stream::iter(fragments.into_iter().map(Ok::<_, std::io::Error>));
    let mut rewritten = std::pin::pin!(rewrite_stream(upstream, rewriter));

    let mut stdout = std::io::stdout();
    while let Some(fragment) = rewritten.next().await {
        stdout.write_all(fragment?.as_bytes())?;
        stdout.flush()?;
    }
    Ok(())
}

/// Cut `text` into fragments of at most `size` bytes without splitting a
/// character. A character wider than `size` gets a fragment of its own.
fn split_fragments(text: &str, size: usize) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if !current.is_empty() && current.len() + c.len_utf8() > size {
            fragments.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        fragments.push(current);
    }
    fragments
}
