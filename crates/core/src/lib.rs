pub mod config;
pub mod error;
pub mod logging;

pub use config::{ChatConfig, Config, ConfigError, TransportConfig};
pub use error::{Error, Result, TransportError};
pub use logging::{LogFormat, PrivacyConfig, init_logging, redact_content};
