//! Worker configuration loading from file and environment variables.

use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;

/// Top-level worker configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Redis connection settings.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Fetch/render settings.
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Redis connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis URL the bus and counters live on.
    #[serde(default = "default_redis_url")]
    pub url: String,
}

/// Fetch and render settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Directory artefacts are written to.
    #[serde(default = "default_download_path")]
    pub download_path: String,

    /// Upper bound for any artefact, in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Hard navigation deadline, in milliseconds.
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    /// PDF page width, in CSS pixels.
    #[serde(default = "default_page_width_px")]
    pub page_width_px: u32,

    /// Explicit Chromium binary; empty means chromiumoxide's autodetection.
    #[serde(default)]
    pub chrome_executable: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "cecibot_fetcher=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1/".to_string()
}

fn default_download_path() -> String {
    "/tmp".to_string()
}

fn default_max_file_size() -> u64 {
    2 * 1024 * 1024
}

fn default_navigation_timeout_ms() -> u64 {
    5_000
}

fn default_page_width_px() -> u32 {
    1080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            download_path: default_download_path(),
            max_file_size: default_max_file_size(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
            page_width_px: default_page_width_px(),
            chrome_executable: String::new(),
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
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Environment variable value was invalid for the expected type.
    #[error("invalid environment variable {name}: {reason}")]
    InvalidEnvVar { name: &'static str, reason: String },

    /// Configuration value is outside the allowed range.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

const MIN_MAX_FILE_SIZE: u64 = 1;
const MIN_NAVIGATION_TIMEOUT_MS: u64 = 100;
const MAX_NAVIGATION_TIMEOUT_MS: u64 = 300_000;
const MIN_PAGE_WIDTH_PX: u32 = 320;
const MAX_PAGE_WIDTH_PX: u32 = 7_680;

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.fetcher.max_file_size < MIN_MAX_FILE_SIZE {
        return Err(ConfigError::InvalidValue {
            field: "fetcher.max_file_size",
            reason: format!("must be >= {MIN_MAX_FILE_SIZE}, got {}", config.fetcher.max_file_size),
        });
    }

    if !(MIN_NAVIGATION_TIMEOUT_MS..=MAX_NAVIGATION_TIMEOUT_MS)
        .contains(&config.fetcher.navigation_timeout_ms)
    {
        return Err(ConfigError::InvalidValue {
            field: "fetcher.navigation_timeout_ms",
            reason: format!(
                "must be in range {MIN_NAVIGATION_TIMEOUT_MS}..={MAX_NAVIGATION_TIMEOUT_MS}, got {}",
                config.fetcher.navigation_timeout_ms
            ),
        });
    }

    if !(MIN_PAGE_WIDTH_PX..=MAX_PAGE_WIDTH_PX).contains(&config.fetcher.page_width_px) {
        return Err(ConfigError::InvalidValue {
            field: "fetcher.page_width_px",
            reason: format!(
                "must be in range {MIN_PAGE_WIDTH_PX}..={MAX_PAGE_WIDTH_PX}, got {}",
                config.fetcher.page_width_px
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

fn parse_env_bool(name: &'static str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => {
            let normalized = raw.trim().to_ascii_lowercase();
            let parsed = match normalized.as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            }
            .ok_or_else(|| ConfigError::InvalidEnvVar {
                name,
                reason: format!("expected one of [true,false,1,0,yes,no,on,off], got '{raw}'"),
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
/// - `CECIBOT_DOWNLOAD_PATH` overrides `fetcher.download_path`
/// - `CECIBOT_MAX_FILE_SIZE` overrides `fetcher.max_file_size`
/// - `CECIBOT_NAVIGATION_TIMEOUT_MS` overrides `fetcher.navigation_timeout_ms`
/// - `CECIBOT_PAGE_WIDTH_PX` overrides `fetcher.page_width_px`
/// - `CECIBOT_CHROME_EXECUTABLE` overrides `fetcher.chrome_executable`
/// - `CECIBOT_LOG_LEVEL` overrides `logging.level`
/// - `CECIBOT_LOG_JSON` overrides `logging.json` (set to "true" to enable)
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
    if let Some(path) = parse_env_var::<String>("CECIBOT_DOWNLOAD_PATH")? {
        config.fetcher.download_path = path;
    }
    if let Some(size) = parse_env_var("CECIBOT_MAX_FILE_SIZE")? {
        config.fetcher.max_file_size = size;
    }
    if let Some(timeout) = parse_env_var("CECIBOT_NAVIGATION_TIMEOUT_MS")? {
        config.fetcher.navigation_timeout_ms = timeout;
    }
    if let Some(width) = parse_env_var("CECIBOT_PAGE_WIDTH_PX")? {
        config.fetcher.page_width_px = width;
    }
    if let Some(exe) = parse_env_var::<String>("CECIBOT_CHROME_EXECUTABLE")? {
        config.fetcher.chrome_executable = exe;
    }
    if let Some(level) = parse_env_var::<String>("CECIBOT_LOG_LEVEL")? {
        config.logging.level = level;
    }
    if let Some(json) = parse_env_bool("CECIBOT_LOG_JSON")? {
        config.logging.json = json;
    }

    validate_config(&config)?;

    Ok(config)
}
