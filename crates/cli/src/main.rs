//! Lectern CLI — the main entry point.
//!
//! Commands:
//! - `assemble` — Build the prompt for a conversation turn
//! - `rewrite`  — Resolve citations in model output read from stdin
//! - `count`    — Count tokens in a string
//! - `config`   — Print configuration

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use lectern_config::{AppConfig, ConfigError, EncodingKind};

mod commands;
mod signer;

#[derive(Parser)]
#[command(
    name = "lectern",
    about = "Lectern — token-budgeted prompts and streaming citations",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.lectern/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the prompt for a conversation turn
    Assemble {
        /// Conversation turn as JSON
        #[arg(short, long)]
        turn: PathBuf,

        /// Project system prompt override
        #[arg(short, long)]
        system_prompt: Option<String>,
    },

    /// Rewrite citations in model output read from stdin
    Rewrite {
        /// Passages sent with the prompt, as a JSON array
        #[arg(short, long)]
        passages: PathBuf,

        /// Bytes per simulated stream fragment
        #[arg(long, default_value_t = 16)]
        chunk_size: usize,
    },

    /// Count tokens in a string
    Count {
        /// Override the configured encoding
        #[arg(short, long)]
        encoding: Option<EncodingKind>,

        text: String,
    },

    /// Print configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the default configuration (default)
    Default,
    /// Print the effective configuration
    Show,
    /// Print the default config file path
    Path,
}

fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries results only.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Assemble {
            turn,
            system_prompt,
        } => {
            let config = load_config(config_path)?;
            commands::assemble::run(&config, &turn, system_prompt).await?
        }
        Commands::Rewrite {
            passages,
            chunk_size,
        } => {
            let config = load_config(config_path)?;
            commands::rewrite::run(&config, &passages, chunk_size).await?
        }
        Commands::Count { encoding, text } => {
            let config = load_config(config_path)?;
            commands::count::run(&config, encoding, &text)?
        }
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Default) {
            ConfigAction::Default => commands::config_cmd::default(),
            ConfigAction::Show => commands::config_cmd::show(&load_config(config_path)?)?,
            ConfigAction::Path => commands::config_cmd::path(),
        },
    }

    Ok(())
}
