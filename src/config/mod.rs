//! Configuration module.
//!
//! Loads configuration from environment variables (after `.env`).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::engine::{ActiveHours, SafetyConfig};

/// Bot running mode
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
    #[default]
    Polling,
    Webhook,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // Telegram
    pub bot_token: String,
    pub bot_mode: BotMode,
    pub webhook_url: Option<Url>,
    pub webhook_port: u16,
    pub webhook_secret: Option<String>,

    /// Owner user IDs (comma-separated).
    /// Owners pass every role check and receive reload notices.
    pub owner_ids: Vec<u64>,

    /// Bot admin user IDs (comma-separated).
    pub admin_ids: Vec<u64>,

    // Dispatch
    pub prefix: String,
    pub locale: String,
    pub handlers_dir: PathBuf,
    /// `None` disables the per-invocation timeout.
    pub handler_timeout: Option<Duration>,
    pub continuation_ttl: Duration,
    pub reload_debounce: Duration,
    pub safety: SafetyConfig,

    // MongoDB (optional; prefixes are kept in memory without it)
    pub mongodb_uri: Option<String>,
    pub mongodb_database: String,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_mode = match var("BOT_MODE").map(|m| m.to_lowercase()).as_deref() {
            None | Some("polling") => BotMode::Polling,
            Some("webhook") => BotMode::Webhook,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "BOT_MODE",
                    reason: format!("expected polling or webhook, got {other}"),
                });
            }
        };

        let webhook_url = var("WEBHOOK_URL")
            .map(|raw| {
                Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                    name: "WEBHOOK_URL",
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        if bot_mode == BotMode::Webhook && webhook_url.is_none() {
            return Err(ConfigError::Missing("WEBHOOK_URL"));
        }

        let prefix = var("PREFIX").unwrap_or_else(|| "!".to_string());
        crate::engine::PrefixResolver::validate(&prefix).map_err(|e| ConfigError::Invalid {
            name: "PREFIX",
            reason: e.to_string(),
        })?;

        let active_hours = match var("ACTIVE_HOURS") {
            Some(raw) => raw.parse::<ActiveHours>().map_err(|reason| ConfigError::Invalid {
                name: "ACTIVE_HOURS",
                reason,
            })?,
            None => ActiveHours::ALWAYS,
        };

        let break_probability: f64 = parse_or(&var, "BREAK_PROBABILITY", 0.1)?;
        if !(0.0..=1.0).contains(&break_probability) {
            return Err(ConfigError::Invalid {
                name: "BREAK_PROBABILITY",
                reason: "must be between 0 and 1".to_string(),
            });
        }
        let break_min = Duration::from_secs(parse_or(&var, "BREAK_MIN_SECS", 60)?);
        let break_max = Duration::from_secs(parse_or(&var, "BREAK_MAX_SECS", 300)?);
        if break_min > break_max {
            return Err(ConfigError::Invalid {
                name: "BREAK_MIN_SECS",
                reason: "must not exceed BREAK_MAX_SECS".to_string(),
            });
        }

        let safety = SafetyConfig {
            active_hours,
            max_daily_messages: parse_or(&var, "MAX_DAILY_MESSAGES", 5_000)?,
            sender_limit: parse_or(&var, "SENDER_RATE_LIMIT", 20)?,
            sender_window: Duration::from_secs(parse_or(&var, "SENDER_RATE_WINDOW_SECS", 60)?),
            content_filter: var("CONTENT_FILTER")
                .map(|raw| split_list(&raw).map(str::to_string).collect())
                .unwrap_or_default(),
            auto_breaks: parse_or(&var, "AUTO_BREAKS", false)?,
            break_probability,
            break_min,
            break_max,
        };

        let handler_timeout = match parse_or::<u64>(&var, "HANDLER_TIMEOUT_SECS", 30)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            bot_token: var("BOT_TOKEN").ok_or(ConfigError::Missing("BOT_TOKEN"))?,
            bot_mode,
            webhook_url,
            webhook_port: parse_or(&var, "WEBHOOK_PORT", 8443)?,
            webhook_secret: var("WEBHOOK_SECRET"),
            owner_ids: parse_ids(&var, "OWNER_IDS")?,
            admin_ids: parse_ids(&var, "ADMIN_IDS")?,
            prefix,
            locale: var("LOCALE").unwrap_or_else(|| "en".to_string()),
            handlers_dir: var("HANDLERS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("handlers")),
            handler_timeout,
            continuation_ttl: Duration::from_secs(parse_or(&var, "CONTINUATION_TTL_SECS", 3_600)?),
            reload_debounce: Duration::from_millis(parse_or(&var, "RELOAD_DEBOUNCE_MS", 300)?),
            safety,
            mongodb_uri: var("MONGODB_URI"),
            mongodb_database: var("MONGODB_DATABASE").unwrap_or_else(|| "nexus".to_string()),
        })
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_ids(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Vec<u64>, ConfigError> {
    var(name)
        .map(|raw| {
            split_list(&raw)
                .map(|id| {
                    id.parse::<u64>().map_err(|_| ConfigError::Invalid {
                        name,
                        reason: format!("\"{id}\" is not a user id"),
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .unwrap_or_else(|| Ok(Vec::new()))
}
