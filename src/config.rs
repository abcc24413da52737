//! Environment-driven configuration

use crate::completion::CompletionConfig;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BOT_TOKEN is not set")]
    MissingToken,
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub db_path: PathBuf,
    /// Username used to recognise `/command@username`; fetched from the API when unset
    pub bot_username: Option<String>,
    pub poll_timeout_secs: u64,
    pub telegram_api_url: Option<String>,
    pub completion: CompletionConfig,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let token = var("BOT_TOKEN").ok_or(ConfigError::MissingToken)?;

        let db_path = var("TALLY_DB_PATH").map_or_else(
            || {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".tally-bot").join("tally.db")
            },
            PathBuf::from,
        );

        let poll_timeout_secs = match var("TALLY_POLL_TIMEOUT_SECS") {
            Some(value) => value.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                name: "TALLY_POLL_TIMEOUT_SECS",
                value,
            })?,
            None => DEFAULT_POLL_TIMEOUT_SECS,
        };

        Ok(Self {
            token,
            db_path,
            bot_username: var("TALLY_BOT_USERNAME").map(|u| u.trim_start_matches('@').to_string()),
            poll_timeout_secs,
            telegram_api_url: var("TELEGRAM_API_URL"),
            completion: CompletionConfig {
                api_key: var("OPENROUTER_API_KEY"),
                model: var("TALLY_AI_MODEL"),
                base_url: var("TALLY_AI_BASE_URL"),
            },
        })
    }
}
