//! `lectern count` — Count tokens in a string.

use lectern_config::{AppConfig, EncodingKind};
use lectern_prompt::TokenCounter;

pub fn run(
    config: &AppConfig,
    encoding: Option<EncodingKind>,
    text: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let kind = encoding.unwrap_or(config.tokenizer.encoding);
    let counter = TokenCounter::new();
    counter.initialize(kind, config.tokenizer.path.as_deref())?;
    println!("{}", counter.count(text)?);
    Ok(())
}
