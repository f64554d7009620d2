//! Prompt assembly pipeline — turns a conversation turn into the bounded
//! `{system_prompt, user_prompt}` pair sent to the model.
//!
//! Sections are budgeted in a fixed order against one running budget that
//! starts at the model's context window minus a fixed reserve:
//!
//! 1. **System prompt** (project override or global default, equation
//!    addendum, citation rules when documents are attached) — always sent
//! 2. **User query** — always sent, its cost reserved up front
//! 3. **History window** — the last few messages' cost is held aside
//! 4. **Tool outputs** — sent if they fit
//! 5. **Documents** — packed greedily into what is left after the history
//!    reservation
//!
//! The user prompt is then `documents`, `tools`, `user query`, separated by
//! blank lines.
//!
//! # Determinism
//!
//! Identical inputs produce identical prompts. No random or time-dependent
//! logic is used during assembly.

use std::sync::Arc;

use lectern_config::PromptConfig;
use lectern_core::{ConversationTurn, Message, Passage, SystemPromptSource, ToolResult, TokenizerError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::context::budget::TokenBudget;
use crate::context::instructions::{
    CITATION_INSTRUCTIONS, EQUATION_ADDENDUM, build_tools_output_results, documents_envelope,
    user_query_section,
};
use crate::context::packer::ContextPacker;
use crate::context::token::TokenCounter;

// ── Types ─────────────────────────────────────────────────────────────────

/// Assembly settings, usually taken from `[prompt]` in the config file.
#[derive(Debug, Clone)]
pub struct AssemblerSettings {
    /// System prompt used when the project has no override.
    pub default_system_prompt: String,
    /// Tokens held back from the model window.
    pub reserved_tokens: usize,
    /// Number of trailing messages whose cost is reserved.
    pub history_window: usize,
}

impl From<&PromptConfig> for AssemblerSettings {
    fn from(config: &PromptConfig) -> Self {
        Self {
            default_system_prompt: config.default_system_prompt.clone(),
            reserved_tokens: config.reserved_tokens,
            history_window: config.history_window,
        }
    }
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self::from(&PromptConfig::default())
    }
}

/// The assembled prompt, ready for a model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledPrompt {
    /// Resolved system prompt.
    pub system_prompt: String,
    /// Engineered user prompt.
    pub user_prompt: String,
    /// The tool section as built, or `"No tools used."`.
    pub tools_output: String,
    /// Assembly metadata (token counts, drops).
    pub metadata: AssemblyMetadata,
}

/// Detailed metadata about the assembly process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// Budget after the model reserve, before any section.
    pub budget: usize,
    /// Budget left after all sections.
    pub remaining: usize,
    /// Tokens held aside for the history window.
    pub history_reserved: usize,
    /// Tokens used by all sections.
    pub total_tokens: usize,
    /// Per-section statistics.
    pub per_section: Vec<SectionStats>,
    /// Items dropped from each section.
    pub drops: Vec<DropInfo>,
}

/// Statistics for a single prompt section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionStats {
    /// Section name.
    pub name: String,
    /// Tokens consumed by this section.
    pub tokens: usize,
    /// Items included after budget enforcement.
    pub items_included: usize,
    /// Total items available before budget enforcement.
    pub items_total: usize,
}

/// Information about items dropped from a section during budget enforcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropInfo {
    /// Which section.
    pub section: String,
    /// Number of items dropped.
    pub items_dropped: usize,
    /// Tokens of dropped content.
    pub tokens_dropped: usize,
    /// Reason for dropping.
    pub reason: String,
}

/// Errors from prompt assembly. No partial prompt is produced on error.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("Cannot assemble a prompt for an undefined conversation (no messages)")]
    UndefinedConversation,

    #[error("Prompt assembly aborted, token counting failed: {0}")]
    Tokenizer(#[from] TokenizerError),

    #[error("Prompt assembly aborted, system prompt lookup failed: {0}")]
    SystemPrompt(String),
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// The prompt assembler. Holds no per-request state; create one and reuse it.
pub struct PromptAssembler {
    counter: Arc<TokenCounter>,
    packer: ContextPacker,
    settings: AssemblerSettings,
}

impl PromptAssembler {
    /// Create an assembler sharing `counter` with its packer.
    pub fn new(counter: Arc<TokenCounter>, settings: AssemblerSettings) -> Self {
        Self {
            packer: ContextPacker::new(Arc::clone(&counter)),
            counter,
            settings,
        }
    }

    pub fn settings(&self) -> &AssemblerSettings {
        &self.settings
    }

    /// Assemble the prompt for the last message of `turn`.
    ///
    /// On success the engineered user prompt and the resolved system prompt
    /// are also written onto the last message. On error the turn is left
    /// untouched.
    pub async fn assemble(
        &self,
        turn: &mut ConversationTurn,
        project: &dyn SystemPromptSource,
    ) -> Result<AssembledPrompt, AssemblyError> {
        let last = turn
            .last_message()
            .ok_or(AssemblyError::UndefinedConversation)?;

        // Independent lookups; dropping this future cancels all three.
        let (user_text, tools, base_prompt) = tokio::join!(
            last_user_text(last),
            last_tool_results(last),
            self.base_system_prompt(project),
        );
        let base_prompt = base_prompt?;

        let passages = attached_passages(last);
        let mut budget =
            TokenBudget::for_model(turn.model.token_limit, self.settings.reserved_tokens);
        let mut stats: Vec<SectionStats> = Vec::new();
        let mut drops: Vec<DropInfo> = Vec::new();

        // ── 1. System prompt (always sent) ─────────────────────────────────
        let system_prompt = build_system_prompt(&base_prompt, !passages.is_empty());
        let system_tokens = self.counter.count(&system_prompt)?;
        budget.reserve("system", system_tokens);
        stats.push(single_section("system", system_tokens));

        // ── 2. User query cost (text is sent last, unconditionally) ────────
        let user_tokens = self.counter.count(&user_text)?;
        budget.reserve("user_query", user_tokens);

        // ── 3. History window reservation ──────────────────────────────────
        let history_reserved = self.history_cost(&turn.messages)?;

        // ── 4. Tool outputs ────────────────────────────────────────────────
        let tools_output = build_tools_output_results(tools);
        let tool_section = if tools.is_empty() {
            None
        } else {
            let tool_tokens = self.counter.count(&tools_output)?;
            match budget.try_spend(tool_tokens) {
                Ok(()) => {
                    stats.push(SectionStats {
                        name: "tools".into(),
                        tokens: tool_tokens,
                        items_included: tools.len(),
                        items_total: tools.len(),
                    });
                    Some(tools_output.clone())
                }
                Err(overdraw) => {
                    warn!(%overdraw, tools = tools.len(), "Tool outputs do not fit, omitting");
                    stats.push(empty_section("tools", tools.len()));
                    drops.push(DropInfo {
                        section: "tools".into(),
                        items_dropped: tools.len(),
                        tokens_dropped: tool_tokens,
                        reason: "Tool outputs exceed remaining budget".into(),
                    });
                    None
                }
            }
        };

        // ── 5. Documents ───────────────────────────────────────────────────
        let document_section = if passages.is_empty() {
            None
        } else {
            self.render_documents(&passages, history_reserved, &mut budget, &mut stats, &mut drops)?
        };

        // ── 6. User query (always sent) ────────────────────────────────────
        stats.push(single_section("user_query", user_tokens));
        let sections: Vec<String> = document_section
            .into_iter()
            .chain(tool_section)
            .chain(std::iter::once(user_query_section(&user_text)))
            .collect();
        let user_prompt = sections.join("\n\n");

        let total_tokens = stats.iter().map(|s| s.tokens).sum();
        let metadata = AssemblyMetadata {
            budget: budget.initial(),
            remaining: budget.remaining(),
            history_reserved,
            total_tokens,
            per_section: stats,
            drops,
        };

        info!(
            course = %turn.course_name,
            model = %turn.model.id,
            budget = metadata.budget,
            remaining = metadata.remaining,
            total_tokens,
            "Prompt assembled"
        );

        // ── 7. Store on the last message ───────────────────────────────────
        if let Some(last) = turn.last_message_mut() {
            last.final_prompt_engineered_message = Some(user_prompt.clone());
            last.latest_system_message = Some(system_prompt.clone());
        }

        Ok(AssembledPrompt {
            system_prompt,
            user_prompt,
            tools_output,
            metadata,
        })
    }

    // ── Private helpers ───────────────────────────────────────────────────

    async fn base_system_prompt(
        &self,
        project: &dyn SystemPromptSource,
    ) -> Result<String, AssemblyError> {
        let project_prompt = project
            .system_prompt()
            .await
            .map_err(|e| AssemblyError::SystemPrompt(e.to_string()))?;
        Ok(project_prompt.unwrap_or_else(|| self.settings.default_system_prompt.clone()))
    }

    /// Cost of the last `history_window` messages.
    fn history_cost(&self, messages: &[Message]) -> Result<usize, TokenizerError> {
        messages
            .iter()
            .rev()
            .take(self.settings.history_window)
            .try_fold(0usize, |sum, message| -> Result<usize, TokenizerError> {
                Ok(sum + self.counter.count(&message.text())?)
            })
    }

    fn render_documents(
        &self,
        passages: &[Passage],
        history_reserved: usize,
        budget: &mut TokenBudget,
        stats: &mut Vec<SectionStats>,
        drops: &mut Vec<DropInfo>,
    ) -> Result<Option<String>, TokenizerError> {
        let overhead = self.counter.count(&documents_envelope(""))?;
        let limit = budget
            .remaining()
            .saturating_sub(history_reserved)
            .saturating_sub(overhead);
        let packed = self.packer.pack(passages, limit)?;

        if !packed.skipped.is_empty() {
            drops.push(DropInfo {
                section: "documents".into(),
                items_dropped: packed.skipped.len(),
                tokens_dropped: packed.skipped_tokens(),
                reason: "Passages skipped to fit remaining budget".into(),
            });
        }

        if packed.is_empty() {
            debug!(passages = passages.len(), limit, "No passage fits, omitting documents");
            stats.push(empty_section("documents", passages.len()));
            return Ok(None);
        }

        let charged = overhead + packed.tokens;
        if let Err(overdraw) = budget.try_spend(charged) {
            warn!(%overdraw, "Document section does not fit, omitting");
            stats.push(empty_section("documents", passages.len()));
            return Ok(None);
        }

        stats.push(SectionStats {
            name: "documents".into(),
            tokens: charged,
            items_included: packed.included.len(),
            items_total: passages.len(),
        });
        Ok(Some(documents_envelope(&packed.text)))
    }
}

async fn last_user_text(message: &Message) -> String {
    message.text()
}

async fn last_tool_results(message: &Message) -> &[ToolResult] {
    &message.tools
}

/// Passages attached to a message, minus those without text.
fn attached_passages(message: &Message) -> Vec<Passage> {
    let passages: Vec<Passage> = message
        .contexts
        .iter()
        .filter(|p| p.has_text())
        .cloned()
        .collect();
    let blank = message.contexts.len() - passages.len();
    if blank > 0 {
        debug!(blank, "Ignoring passages without text");
    }
    passages
}

fn build_system_prompt(base: &str, with_citations: bool) -> String {
    let mut prompt = format!("{base}\n\n{EQUATION_ADDENDUM}");
    if with_citations {
        prompt.push_str("\n\n");
        prompt.push_str(CITATION_INSTRUCTIONS);
    }
    prompt
}

fn single_section(name: &str, tokens: usize) -> SectionStats {
    SectionStats {
        name: name.into(),
        tokens,
        items_included: 1,
        items_total: 1,
    }
}

fn empty_section(name: &str, total: usize) -> SectionStats {
    SectionStats {
        name: name.into(),
        tokens: 0,
        items_included: 0,
        items_total: total,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
