//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Knobs of the transfer loop.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Pause between two items, to stay under platform rate limits.
    pub item_delay: Duration,
    /// Largest accepted batch count (inclusive).
    pub max_batch: u32,
    /// Edit the progress message after every N items.
    pub progress_every: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            item_delay: Duration::from_secs(2),
            max_batch: 200,
            progress_every: 5,
        }
    }
}

/// Process configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_token: SecretString,
    /// Operator allow-list (usernames or numeric ids, `*` = everyone).
    pub admins: Vec<String>,
    /// Chat the bot forwards into when it needs to read a public message.
    pub scratch_chat: Option<String>,
    /// Successful items per operator per UTC day. `None` = unlimited.
    pub daily_limit: Option<u32>,
    /// JSON file with delegated credentials and caption overrides.
    pub store_seed: Option<PathBuf>,
    pub transfer: TransferConfig,
}

impl BotConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()))?;

        let admins: Vec<String> = lookup("CANTARELLA_ADMINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let scratch_chat = lookup("CANTARELLA_SCRATCH_CHAT")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let defaults = TransferConfig::default();
        let item_delay_ms: u64 = parse_or(
            &lookup,
            "CANTARELLA_ITEM_DELAY_MS",
            defaults.item_delay.as_millis() as u64,
        )?;
        let max_batch: u32 = parse_or(&lookup, "CANTARELLA_MAX_BATCH", defaults.max_batch)?;
        let progress_every: u32 =
            parse_or(&lookup, "CANTARELLA_PROGRESS_EVERY", defaults.progress_every)?;

        if max_batch == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CANTARELLA_MAX_BATCH".into(),
                message: "must be at least 1".into(),
            });
        }
        if progress_every == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CANTARELLA_PROGRESS_EVERY".into(),
                message: "must be at least 1".into(),
            });
        }

        let daily_limit: u32 = parse_or(&lookup, "CANTARELLA_DAILY_LIMIT", 0)?;

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            admins,
            scratch_chat,
            daily_limit: (daily_limit > 0).then_some(daily_limit),
            store_seed: lookup("CANTARELLA_STORE_SEED").map(PathBuf::from),
            transfer: TransferConfig {
                item_delay: Duration::from_millis(item_delay_ms),
                max_batch,
                progress_every,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}
