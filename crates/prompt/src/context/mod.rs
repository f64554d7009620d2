//! Token-budgeted prompt assembly pipeline.
//!
//! Builds the `{system_prompt, user_prompt}` pair for one conversation turn,
//! keeping the total under the model's context window minus a fixed reserve.
//!
//! # Sections (in budget order)
//!
//! | Section | Source | Trim Strategy |
//! |---------|--------|---------------|
//! | 1. System | Project override or global default | Never trimmed |
//! | 2. User query | Last message text | Never trimmed |
//! | 3. History | Last few messages | Reserved, not sent here |
//! | 4. Tools | Tool results on the last message | Omitted whole if too large |
//! | 5. Documents | Retrieved passages | Passages skipped in rank order |

pub mod assembler;
pub mod budget;
pub mod instructions;
pub mod packer;
pub mod token;

pub use assembler::{
    AssembledPrompt, AssemblerSettings, AssemblyError, AssemblyMetadata, DropInfo,
    PromptAssembler, SectionStats,
};
pub use budget::{Overdraw, TokenBudget};
pub use instructions::{NO_TOOLS_USED, build_tools_output_results};
pub use packer::{ContextPacker, PackedContext, SkippedPassage};
pub use token::{Encoding, TokenCounter, estimate_tokens};
