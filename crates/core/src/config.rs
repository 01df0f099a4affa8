use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Connection settings for the Observer server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Base URL of the server, without the `/api/v1` prefix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Attempts for idempotent requests (history reads, history clears)
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Delay before the first retry; later retries back off exponentially
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Transcript behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatConfig {
    /// Server-side conversation the transcript belongs to
    #[serde(default = "default_session_id")]
    pub session_id: String,

    /// Number of history messages requested per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Assistant text shown when a send fails
    #[serde(default = "default_failure_message")]
    pub failure_message: String,
}

fn default_session_id() -> String {
    "default".to_string()
}

fn default_page_size() -> usize {
    20
}

fn default_failure_message() -> String {
    "Sorry, something went wrong while reaching the assistant. Please try again.".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            session_id: default_session_id(),
            page_size: default_page_size(),
            failure_message: default_failure_message(),
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter directive for stderr output
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty`, `json` or `compact`
    #[serde(default = "default_log_format")]
    pub format: String,

    #[serde(default)]
    pub file: FileLoggingConfig,

    #[serde(default)]
    pub privacy: PrivacyLoggingConfig,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: FileLoggingConfig::default(),
            privacy: PrivacyLoggingConfig::default(),
        }
    }
}

/// `[logging.file]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileLoggingConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_file_log_level")]
    pub level: String,
}

fn default_file_log_level() -> String {
    "debug".to_string()
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self { enabled: false, level: default_file_log_level() }
    }
}

/// `[logging.privacy]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrivacyLoggingConfig {
    /// Include message text in trace output at all
    #[serde(default)]
    pub log_message_content: bool,

    /// Maximum characters of message text kept when content logging is on
    #[serde(default = "default_truncate_length")]
    pub truncate_length: usize,
}

fn default_truncate_length() -> usize {
    200
}

impl Default for PrivacyLoggingConfig {
    fn default() -> Self {
        Self { log_message_content: false, truncate_length: default_truncate_length() }
    }
}

/// Root configuration structure for observer.toml
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML string
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), base_url = %config.transport.base_url, "configuration loaded");
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let base_url = self.transport.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(self.transport.base_url.clone()).into());
        }

        if self.transport.retry_count == 0 {
            return Err(ConfigError::OutOfRange("transport.retry_count must be at least 1".to_string()).into());
        }

        if self.chat.page_size == 0 {
            return Err(ConfigError::OutOfRange("chat.page_size must be at least 1".to_string()).into());
        }

        if self.chat.session_id.trim().is_empty() {
            return Err(ConfigError::OutOfRange("chat.session_id cannot be empty".to_string()).into());
        }

        Ok(())
    }

    /// Get example configuration (as a string)
    pub fn example() -> &'static str {
        r#"# Observer chat client configuration

[transport]
# Server root; requests go to {base_url}/api/v1/chat
base_url = "http://localhost:8000"
timeout_ms = 30000
# Attempts for history reads and clears (sends are never retried)
retry_count = 3
retry_delay_ms = 1000

[chat]
session_id = "default"
# Messages fetched per history page
page_size = 20
failure_message = "Sorry, something went wrong while reaching the assistant. Please try again."

[logging]
level = "warn"
# "pretty", "json" or "compact"
format = "pretty"

[logging.file]
enabled = false
level = "debug"

[logging.privacy]
log_message_content = false
truncate_length = 200
"#
    }
}

/// Configuration-specific errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Base URL is not an http(s) URL
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// Numeric or string setting outside its allowed range
    #[error("value out of range: {0}")]
    OutOfRange(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::TomlParse(err.to_string())
    }
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err.to_string())
    }
}
