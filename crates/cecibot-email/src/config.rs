//! Email frontend configuration loading from file and environment
//! variables. The webhook key and SMTP password are secrets and only ever
//! come from the environment (`CECIBOT_EMAIL_WEBHOOK_KEY`,
//! `CECIBOT_SMTP_PASSWORD`), never from the file.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use thiserror::Error;

/// Top-level frontend configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub redis: RedisConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the inbound-mail webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Address replies are sent from.
    #[serde(default = "default_from_address")]
    pub from_address: String,

    /// SMTP relay host.
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    /// SMTP relay port (STARTTLS).
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// SMTP username; the password comes from `CECIBOT_SMTP_PASSWORD`.
    #[serde(default)]
    pub smtp_username: String,

    /// Cool-down window per identity, in seconds. Email gets a longer
    /// window than chat; a mailbox round-trip is slow anyway.
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
    /// `<HOME>/.cecibot/email/`.
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

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3169
}

fn default_from_address() -> String {
    "bot@cecibot.com".to_string()
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_cool_down_seconds() -> u64 {
    30
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

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            from_address: default_from_address(),
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
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
    if config.email.cool_down_seconds == 0 {
        return Err(ConfigError::InvalidValue {
            field: "email.cool_down_seconds",
            reason: "must be >= 1".to_string(),
        });
    }

    if config.email.max_attempts < 2 {
        return Err(ConfigError::InvalidValue {
            field: "email.max_attempts",
            reason: format!(
                "must be >= 2 (1 would blacklist on the first cool-down hit), got {}",
                config.email.max_attempts
            ),
        });
    }

    if config.email.from_address.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "email.from_address",
            reason: "must not be empty".to_string(),
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
/// - `CECIBOT_EMAIL_HOST` overrides `server.host`
/// - `CECIBOT_EMAIL_PORT` overrides `server.port`
/// - `CECIBOT_REDIS_URL` overrides `redis.url`
/// - `CECIBOT_FROM_ADDRESS` overrides `email.from_address`
/// - `CECIBOT_SMTP_HOST` overrides `email.smtp_host`
/// - `CECIBOT_SMTP_PORT` overrides `email.smtp_port`
/// - `CECIBOT_SMTP_USERNAME` overrides `email.smtp_username`
/// - `CECIBOT_COOL_DOWN_SECONDS` overrides `email.cool_down_seconds`
/// - `CECIBOT_MAX_ATTEMPTS` overrides `email.max_attempts`
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

    if let Some(host) = parse_env_var("CECIBOT_EMAIL_HOST")? {
        config.server.host = host;
    }
    if let Some(port) = parse_env_var("CECIBOT_EMAIL_PORT")? {
        config.server.port = port;
    }
    if let Some(url) = parse_env_var::<String>("CECIBOT_REDIS_URL")? {
        config.redis.url = url;
    }
    if let Some(address) = parse_env_var::<String>("CECIBOT_FROM_ADDRESS")? {
        config.email.from_address = address;
    }
    if let Some(host) = parse_env_var::<String>("CECIBOT_SMTP_HOST")? {
        config.email.smtp_host = host;
    }
    if let Some(port) = parse_env_var("CECIBOT_SMTP_PORT")? {
        config.email.smtp_port = port;
    }
    if let Some(user) = parse_env_var::<String>("CECIBOT_SMTP_USERNAME")? {
        config.email.smtp_username = user;
    }
    if let Some(seconds) = parse_env_var("CECIBOT_COOL_DOWN_SECONDS")? {
        config.email.cool_down_seconds = seconds;
    }
    if let Some(attempts) = parse_env_var("CECIBOT_MAX_ATTEMPTS")? {
        config.email.max_attempts = attempts;
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
