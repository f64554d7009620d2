//! `lectern assemble` — Build the prompt for a conversation turn.

use std::path::Path;
use std::sync::Arc;

use lectern_config::AppConfig;
use lectern_core::{ConversationTurn, ProjectConfig};
use lectern_prompt::{AssemblerSettings, PromptAssembler, TokenCounter};

pub async fn run(
    config: &AppConfig,
    turn_path: &Path,
    system_prompt: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(turn_path)
        .map_err(|e| format!("Failed to read {}: {e}", turn_path.display()))?;
    let mut turn: ConversationTurn = serde_json::from_str(&raw)
        .map_err(|e| format!("Invalid turn file {}: {e}", turn_path.display()))?;
    if turn.model.token_limit == 0 {
        turn.model.token_limit = config.prompt.default_model_token_limit;
    }

    let counter = Arc::new(TokenCounter::from_config(&config.tokenizer)?);
    let assembler = PromptAssembler::new(counter, AssemblerSettings::from(&config.prompt));

    let mut project = ProjectConfig::new(turn.course_name.clone());
    if let Some(prompt) = system_prompt {
        project = project.with_system_prompt(prompt);
    }

    let assembled = assembler.assemble(&mut turn, &project).await?;
    println!("{}", serde_json::to_string_pretty(&assembled)?);
    Ok(())
}
