//! Streaming citation rewriting for Lectern.
//!
//! Model output cites retrieved passages as `[n]`, `[n, page: p]` and, in
//! a trailing sources list, `n. [name](#)`. This crate turns those markers
//! into real links while the response is still streaming:
//!
//! - [`CitationRewriter`] — the per-character state machine
//! - [`ParserState`] — state carried between fragments
//! - [`LinkResolver`] / [`CitationLinkCache`] — passage lookup, URL signing,
//!   memoized per response
//! - [`rewrite_stream`] / [`rewrite_receiver`] — adapters over fragment streams

pub mod machine;
pub mod resolver;
pub mod state;
pub mod stream;
pub mod stream_event;

pub use machine::CitationRewriter;
pub use resolver::{CitationLinkCache, LinkResolver};
pub use state::{ParseMode, ParserState};
pub use stream::{into_events, rewrite_receiver, rewrite_stream};
pub use stream_event::CitationStreamEvent;
