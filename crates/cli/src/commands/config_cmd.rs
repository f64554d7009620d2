//! `lectern config` — Configuration commands.

use lectern_config::AppConfig;

pub fn default() {
    println!("{}", AppConfig::default_toml());
}

pub fn show(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
}
