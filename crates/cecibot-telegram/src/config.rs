//! Telegram frontend configuration loading from file and environment
//! variables. The bot token is a secret and only ever comes from the
//! `CECIBOT_TELEGRAM_SECRET` environment variable, never from the file.

use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;

/// Top-level frontend configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub redis: RedisConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Base URL of the Bot API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Server-side long-poll window for `getUpdates`, in seconds.
    #[serde(default = "default_poll_timeout_seconds")]
    pub poll_timeout_seconds: u64,

    /// Cool-down window per identity, in seconds.
    #[serde(default = "default_cool_down_seconds")]
    pub cool_down_seconds: u64,

    /// Attempts inside one window before the identity is blacklisted.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditConfig {
    /// Directory for the monthly request databases; empty means
    /// `<HOME>/.cecibot/telegram/`.
    #[serde(default)]
    pub base_dir: String,

    /// Rows buffered before a flush; 1 writes through synchronously.
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_seconds() -> u64 {
    50
}

fn default_cool_down_seconds() -> u64 {
    15
}

fn default_max_attempts() -> u32 {
    10
}

fn default_redis_url() -> String {
    "redis://127.0.0.1/".to_string()
}

fn default_flush_threshold() -> usize {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            poll_timeout_seconds: default_poll_timeout_seconds(),
            cool_down_seconds: default_cool_down_seconds(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid environment variable {name}: {reason}")]
    InvalidEnvVar { name: &'static str, reason: String },

    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.telegram.cool_down_seconds == 0 {
        return Err(ConfigError::InvalidValue {
            field: "telegram.cool_down_seconds",
            reason: "must be >= 1".to_string(),
        });
    }

    if config.telegram.max_attempts < 2 {
        return Err(ConfigError::InvalidValue {
            field: "telegram.max_attempts",
            reason: format!(
                "must be >= 2 (1 would blacklist on the first cool-down hit), got {}",
                config.telegram.max_attempts
            ),
        });
    }

    if !(1..=90).contains(&config.telegram.poll_timeout_seconds) {
        return Err(ConfigError::InvalidValue {
            field: "telegram.poll_timeout_seconds",
            reason: format!(
                "must be in range 1..=90, got {}",
                config.telegram.poll_timeout_seconds
            ),
        });
    }

    Ok(())
}

fn parse_env_var<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => {
            let parsed = raw.parse::<T>().map_err(|err| ConfigError::InvalidEnvVar {
                name,
                reason: err.to_string(),
            })?;
            Ok(Some(parsed))
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidEnvVar {
            name,
            reason: "value is not valid unicode".to_string(),
        }),
    }
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `CECIBOT_REDIS_URL` overrides `redis.url`
/// - `CECIBOT_TELEGRAM_API_BASE` overrides `telegram.api_base`
/// - `CECIBOT_COOL_DOWN_SECONDS` overrides `telegram.cool_down_seconds`
/// - `CECIBOT_MAX_ATTEMPTS` overrides `telegram.max_attempts`
/// - `CECIBOT_AUDIT_DIR` overrides `audit.base_dir`
/// - `CECIBOT_LOG_LEVEL` overrides `logging.level`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// a value fails validation.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Some(url) = parse_env_var::<String>("CECIBOT_REDIS_URL")? {
        config.redis.url = url;
    }
    if let Some(base) = parse_env_var::<String>("CECIBOT_TELEGRAM_API_BASE")? {
        config.telegram.api_base = base;
    }
    if let Some(seconds) = parse_env_var("CECIBOT_COOL_DOWN_SECONDS")? {
        config.telegram.cool_down_seconds = seconds;
    }
    if let Some(attempts) = parse_env_var("CECIBOT_MAX_ATTEMPTS")? {
        config.telegram.max_attempts = attempts;
    }
    if let Some(dir) = parse_env_var::<String>("CECIBOT_AUDIT_DIR")? {
        config.audit.base_dir = dir;
    }
    if let Some(level) = parse_env_var::<String>("CECIBOT_LOG_LEVEL")? {
        config.logging.level = level;
    }

    validate_config(&config)?;

    Ok(config)
}
