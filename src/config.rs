use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use teloxide::types::ChatId;
use thiserror::Error;

use crate::santa::aliases::default_aliases;
use crate::santa::{ForbiddenPairs, ParticipantId, SantaConfig};

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file '{}': {source}", path.display())]
    ParseJson { path: PathBuf, source: serde_json::Error },
    #[error("config validation error: {0}")]
    Validation(String),
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    /// Telegram user id of the organizer.
    admin_id: i64,
    /// Code names handed out at registration. Defaults to the built-in pool.
    #[serde(default)]
    aliases: Vec<String>,
    /// Pairs of user ids that must never be matched, in either direction.
    #[serde(default)]
    forbidden_pairs: Vec<[i64; 2]>,
    #[serde(default = "default_pending_edit_minutes")]
    pending_edit_minutes: u64,
    #[serde(default)]
    dry_run: bool,
    log_chat_id: Option<i64>,
    /// Directory for state files (logs, database). Defaults to current directory.
    data_dir: Option<String>,
}

fn default_pending_edit_minutes() -> u64 {
    10
}

pub struct Config {
    pub config_path: PathBuf,
    pub telegram_bot_token: String,
    pub admin_id: ParticipantId,
    pub aliases: Vec<String>,
    pub forbidden_pairs: ForbiddenPairs,
    /// How long `/wishlist` without text waits for the follow-up message.
    pub pending_edit_timeout: Duration,
    /// Log outgoing messages instead of sending them.
    pub dry_run: bool,
    pub log_chat_id: Option<ChatId>,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2
            || token_parts[0].parse::<u64>().is_err()
            || token_parts[1].is_empty()
        {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABC...)".into(),
            ));
        }
        if file.admin_id == 0 {
            return Err(ConfigError::Validation("admin_id must be a Telegram user id".into()));
        }
        if file.pending_edit_minutes == 0 {
            return Err(ConfigError::Validation("pending_edit_minutes must be at least 1".into()));
        }
        let pending_edit_secs = file.pending_edit_minutes.checked_mul(60).ok_or_else(|| {
            ConfigError::Validation(format!(
                "pending_edit_minutes is too large: {}",
                file.pending_edit_minutes
            ))
        })?;

        let aliases = if file.aliases.is_empty() {
            default_aliases()
        } else {
            validate_aliases(file.aliases)?
        };

        let mut forbidden_pairs = ForbiddenPairs::new();
        for [a, b] in file.forbidden_pairs {
            if a == b {
                return Err(ConfigError::Validation(format!(
                    "forbidden_pairs entry [{a}, {b}] pairs a participant with themselves"
                )));
            }
            forbidden_pairs.insert(a, b);
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            config_path,
            telegram_bot_token: file.telegram_bot_token,
            admin_id: file.admin_id,
            aliases,
            forbidden_pairs,
            pending_edit_timeout: Duration::from_secs(pending_edit_secs),
            dry_run: file.dry_run,
            log_chat_id: file.log_chat_id.map(ChatId),
            data_dir,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("santa.db")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Settings for [`crate::santa::SantaBot`].
    pub fn santa_config(&self) -> SantaConfig {
        SantaConfig {
            admin_id: self.admin_id,
            aliases: self.aliases.clone(),
            forbidden: self.forbidden_pairs.clone(),
            pending_timeout: self.pending_edit_timeout,
        }
    }
}

fn validate_aliases(aliases: Vec<String>) -> Result<Vec<String>, ConfigError> {
    let aliases: Vec<String> = aliases.into_iter().map(|a| a.trim().to_string()).collect();
    if aliases.iter().any(String::is_empty) {
        return Err(ConfigError::Validation("aliases must not contain blank names".into()));
    }
    let mut seen = HashSet::new();
    for alias in &aliases {
        if !seen.insert(alias.as_str()) {
            return Err(ConfigError::Validation(format!("alias '{alias}' is listed twice")));
        }
    }
    Ok(aliases)
}
