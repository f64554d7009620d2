//! Request-time prompt assembly for Lectern.
//!
//! Given a conversation turn with retrieved passages and tool results
//! attached to its last message, [`PromptAssembler`] produces the system
//! and user prompts for the model call without exceeding the model's
//! context window.

pub mod context;

pub use context::{
    AssembledPrompt, AssemblerSettings, AssemblyError, AssemblyMetadata, ContextPacker, DropInfo,
    Encoding, PackedContext, PromptAssembler, SectionStats, TokenBudget, TokenCounter,
    build_tools_output_results, estimate_tokens,
};
