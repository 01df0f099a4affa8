use thiserror::Error;

/// Result type alias for observer-core
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the Observer chat client
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error for file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport (network/server) errors
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Parse/serialization errors
    #[error("parse error: {0}")]
    Parse(String),

    /// Validation errors
    #[error("validation error: {0}")]
    Validation(String),

    /// The owning view went away before the operation finished
    #[error("operation cancelled")]
    Cancelled,

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The transport failure behind this error, if any
    pub fn as_transport(&self) -> Option<&TransportError> {
        match self {
            Error::Transport(err) => Some(err),
            _ => None,
        }
    }
}

/// Failures talking to the Observer server
///
/// Every variant is recoverable from the transcript's point of view; callers decide
/// whether to retry, log, or surface a synthesized entry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection refused, reset, DNS failure and similar
    #[error("network failure: {0}")]
    Network(String),

    /// The request did not complete within the configured timeout
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Server answered with a non-success status
    #[error("server returned {code}: {body}")]
    Status { code: u16, body: String },

    /// Response body did not match the expected shape
    #[error("malformed response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Create a status error
    pub fn status(code: u16, body: impl Into<String>) -> Self {
        Self::Status { code, body: body.into() }
    }

    /// Transient failures worth another attempt: connectivity, timeouts, 5xx, 408 and 429.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Status { code, .. } => (500..600).contains(code) || *code == 408 || *code == 429,
            Self::Decode(_) => false,
        }
    }
}
