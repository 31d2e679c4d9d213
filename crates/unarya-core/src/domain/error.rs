//! Error taxonomy shared by the stage adapters, the retry policy and the
//! orchestrator.

use std::time::Duration;

/// Coarse classification of a stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The call never produced an answer (connection refused, deadline
    /// exceeded, overloaded upstream).
    Transport,
    /// The remote service ran and reported a domain failure, or answered with
    /// something we cannot decode.
    Application,
    /// The run was cancelled while the call was in flight.
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Application => write!(f, "application"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Failure of a single stage call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("deadline of {}ms exceeded", .0.as_millis())]
    Timeout(Duration),

    #[error("remote service error: {0}")]
    Application(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("call cancelled")]
    Cancelled,
}

impl StageError {
    /// Error kind used by the retry policy and the RPC surface.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::Timeout(_) => ErrorKind::Transport,
            Self::Application(_) | Self::Decode(_) => ErrorKind::Application,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Invalid request or invalid configuration. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("source URL must not be empty")]
    EmptyUrl,

    #[error("unsupported source type: {0}")]
    UnsupportedSourceType(String),

    #[error("invalid source URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Result type for configuration and request validation.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
