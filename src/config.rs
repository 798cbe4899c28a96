//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Bot credential variable.
pub const ENV_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
/// Reviewer chat id variable.
pub const ENV_REVIEWER_CHAT_ID: &str = "INTAKE_REVIEWER_CHAT_ID";
pub const ENV_UPLOADS_DIR: &str = "INTAKE_UPLOADS_DIR";
pub const ENV_POLL_TIMEOUT_SECS: &str = "INTAKE_POLL_TIMEOUT_SECS";
pub const ENV_WORKER_IDLE_SECS: &str = "INTAKE_WORKER_IDLE_SECS";
pub const ENV_LOG_DIR: &str = "INTAKE_LOG_DIR";

/// Intake bot configuration.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Telegram bot token.
    pub bot_token: SecretString,
    /// Chat id that receives every completed submission.
    pub reviewer_chat_id: String,
    /// Directory holding accepted documents.
    pub uploads_dir: PathBuf,
    /// Long-poll timeout for `getUpdates`.
    pub poll_timeout: Duration,
    /// How long a submitter's worker task lingers without events.
    pub worker_idle_timeout: Duration,
    /// Optional directory for a daily-rolling log file.
    pub log_dir: Option<PathBuf>,
}

impl IntakeConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = required(&lookup, ENV_BOT_TOKEN, "Create a bot with @BotFather")?;
        let reviewer_chat_id = required(
            &lookup,
            ENV_REVIEWER_CHAT_ID,
            "Set it to the chat id that should receive submissions",
        )?;

        let uploads_dir = lookup(ENV_UPLOADS_DIR)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("uploads"));

        let poll_timeout = Duration::from_secs(parse_secs(&lookup, ENV_POLL_TIMEOUT_SECS, 30)?);
        let worker_idle_timeout =
            Duration::from_secs(parse_secs(&lookup, ENV_WORKER_IDLE_SECS, 3600)?);

        let log_dir = lookup(ENV_LOG_DIR)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            reviewer_chat_id,
            uploads_dir,
            poll_timeout,
            worker_idle_timeout,
            log_dir,
        })
    }
}

fn required<F>(lookup: &F, key: &str, hint: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingRequired {
            key: key.to_string(),
            hint: hint.to_string(),
        })
}

fn parse_secs<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
    }
}
