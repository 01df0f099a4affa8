//! Logging for the Observer chat client.
//!
//! Built on the tracing ecosystem: an `EnvFilter`, a formatted stderr layer and an
//! optional daily-rolling JSON file.
//!
//! # Environment Variables
//!
//! - `OBSERVER_LOG`: Filter directive (like `RUST_LOG`), e.g., `observer_chat=debug`
//! - `OBSERVER_LOG_FORMAT`: Output format for stderr: `pretty`, `json`, `compact`
//! - `OBSERVER_LOG_DIR`: Directory for file logs (default `~/.observer/logs`)
//!
//! # Example
//!
//! ```no_run
//! use observer_core::logging;
//!
//! let _guard = logging::init_logging(None)?;
//! # Ok::<(), observer_core::Error>(())
//! ```

use crate::Error;
use crate::config::{FileLoggingConfig, LoggingConfig as ConfigLoggingConfig};
use std::env;
use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// How events are rendered on stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, colored; picked automatically on a terminal
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
    /// One line per event; used when stderr is not a terminal
    Compact,
}

impl LogFormat {
    pub const VALUES: &[LogFormat] = &[LogFormat::Pretty, LogFormat::Json, LogFormat::Compact];

    /// Case-insensitive name lookup
    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            "compact" => Some(LogFormat::Compact),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
            LogFormat::Compact => "compact",
        }
    }
}

/// Privacy settings for message text in logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivacyConfig {
    /// Include message text in log events.
    pub log_message_content: bool,
    /// Maximum characters kept when content is logged.
    pub truncate_length: usize,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self { log_message_content: false, truncate_length: 200 }
    }
}

/// Runtime logging settings, built from the `[logging]` config section or by hand.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default log level for stderr output.
    pub level: String,
    /// Output format for stderr.
    pub format: LogFormat,
    /// File logging configuration (optional).
    pub file: Option<FileLoggingConfig>,
    pub privacy: PrivacyConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "warn".to_string(), format: LogFormat::default(), file: None, privacy: PrivacyConfig::default() }
    }
}

impl From<ConfigLoggingConfig> for LoggingConfig {
    fn from(config: ConfigLoggingConfig) -> Self {
        Self {
            level: config.level,
            format: LogFormat::parse_str(&config.format).unwrap_or_default(),
            file: if config.file.enabled { Some(config.file) } else { None },
            privacy: PrivacyConfig {
                log_message_content: config.privacy.log_message_content,
                truncate_length: config.privacy.truncate_length,
            },
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file_logging(mut self, config: FileLoggingConfig) -> Self {
        self.file = Some(config);
        self
    }

    pub fn with_privacy(mut self, config: PrivacyConfig) -> Self {
        self.privacy = config;
        self
    }

    /// `OBSERVER_LOG`, then `RUST_LOG`, then the configured level.
    fn build_env_filter(&self) -> EnvFilter {
        let filter = env::var("OBSERVER_LOG")
            .ok()
            .or_else(|| env::var("RUST_LOG").ok())
            .unwrap_or_else(|| self.level.clone());

        EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new(&self.level))
    }

    fn is_tty() -> bool {
        atty::is(atty::Stream::Stderr)
    }

    /// `OBSERVER_LOG_FORMAT` wins; otherwise an explicit non-pretty format, else TTY detection.
    fn detect_format(&self) -> LogFormat {
        if let Ok(fmt_str) = env::var("OBSERVER_LOG_FORMAT")
            && let Some(fmt) = LogFormat::parse_str(&fmt_str)
        {
            return fmt;
        }

        if self.format != LogFormat::Pretty {
            return self.format;
        }

        if Self::is_tty() { LogFormat::Pretty } else { LogFormat::Compact }
    }

    fn get_log_dir() -> Result<PathBuf, Error> {
        if let Ok(custom_dir) = env::var("OBSERVER_LOG_DIR") {
            return Ok(PathBuf::from(custom_dir));
        }

        let home = env::var("HOME")
            .or_else(|_| env::var("USERPROFILE"))
            .map_err(|_| Error::Config("Could not determine home directory".to_string()))?;

        Ok(PathBuf::from(home).join(".observer").join("logs"))
    }
}

/// Initialize the global tracing subscriber.
///
/// Returns the file writer guard when file logging is enabled; keep it alive for the
/// lifetime of the process so buffered lines are flushed.
pub fn init_logging(config: Option<LoggingConfig>) -> Result<Option<WorkerGuard>, Error> {
    let config = config.unwrap_or_default();
    let env_filter = config.build_env_filter();
    let format = config.detect_format();

    let stderr_layer = match format {
        LogFormat::Pretty => fmt::layer().pretty().with_writer(io::stderr).with_ansi(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(io::stderr).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_writer(io::stderr).boxed(),
    };

    let registry = Registry::default().with(stderr_layer.with_filter(env_filter));

    if let Some(file_config) = &config.file {
        let log_dir = LoggingConfig::get_log_dir()?;
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| Error::Config(format!("Failed to create log directory: {}", e)))?;

        let file_appender = tracing_appender::rolling::daily(log_dir, "observer.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let file_filter = EnvFilter::try_new(&file_config.level).unwrap_or_else(|_| EnvFilter::new("debug"));

        registry
            .with(fmt::layer().json().with_writer(non_blocking).with_filter(file_filter))
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to install subscriber: {}", e)))?;
        tracing::debug!(?format, level = %file_config.level, "logging initialized with file output");
        return Ok(Some(guard));
    }

    registry.try_init().map_err(|e| Error::Config(format!("Failed to install subscriber: {}", e)))?;
    tracing::debug!(?format, "logging initialized");
    Ok(None)
}

/// Message text as it may appear in a log line.
pub fn redact_content(content: &str, privacy: &PrivacyConfig) -> String {
    let total = content.chars().count();
    if !privacy.log_message_content {
        return format!("[REDACTED {} chars]", total);
    }

    if total <= privacy.truncate_length {
        return content.to_string();
    }

    let mut truncated = content.chars().take(privacy.truncate_length).collect::<String>();
    truncated.push_str("...");
    truncated.push_str(&format!(" ({} total chars)", total));
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!(LogFormat::parse_str("pretty"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse_str("PRETTY"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse_str("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse_str("compact"), Some(LogFormat::Compact));
        assert_eq!(LogFormat::parse_str("invalid"), None);
    }

    #[test]
    fn test_log_format_as_str() {
        for format in LogFormat::VALUES {
            assert_eq!(LogFormat::parse_str(format.as_str()), Some(*format));
        }
    }

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "warn");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.file.is_none());
        assert!(!config.privacy.log_message_content);
    }

    #[test]
    fn test_logging_config_builder() {
        let config = LoggingConfig::new()
            .with_level("debug")
            .with_format(LogFormat::Json)
            .with_file_logging(FileLoggingConfig { enabled: true, level: "trace".to_string() })
            .with_privacy(PrivacyConfig { log_message_content: true, truncate_length: 10 });

        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file.as_ref().map(|f| f.level.as_str()), Some("trace"));
        assert!(config.privacy.log_message_content);
    }

    #[test]
    fn test_logging_config_from_file_config() {
        let mut file_config = ConfigLoggingConfig::default();
        file_config.format = "compact".to_string();
        file_config.privacy.log_message_content = true;

        let config = LoggingConfig::from(file_config);
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.file.is_none());
        assert!(config.privacy.log_message_content);

        let mut enabled = ConfigLoggingConfig::default();
        enabled.file.enabled = true;
        enabled.format = "nonsense".to_string();
        let config = LoggingConfig::from(enabled);
        assert!(config.file.is_some());
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn test_redact_content_disabled() {
        let privacy = PrivacyConfig::default();
        assert_eq!(redact_content("secret plans", &privacy), "[REDACTED 12 chars]");
    }

    #[test]
    fn test_redact_content_truncates() {
        let privacy = PrivacyConfig { log_message_content: true, truncate_length: 10 };
        let redacted = redact_content("abcdefghijklmnopqrstuvwxyz", &privacy);
        assert!(redacted.starts_with("abcdefghij..."));
        assert!(redacted.contains("26 total chars"));
    }

    #[test]
    fn test_redact_content_short_passthrough() {
        let privacy = PrivacyConfig { log_message_content: true, truncate_length: 100 };
        assert_eq!(redact_content("hello", &privacy), "hello");
    }
}
