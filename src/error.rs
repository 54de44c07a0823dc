//! Error types for the failsafe core

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for the failsafe core
pub type Result<T> = std::result::Result<T, Error>;

/// Failsafe errors
///
/// Remote collaborators map their failures into one of these variants so the
/// retry policy and circuit breaker can classify them by [`ErrorKind`].
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Call rejected because the circuit is open
    #[error("Circuit breaker is open for service: {service}")]
    CircuitOpen {
        /// Service the breaker protects
        service: String,
    },

    /// Remote call timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Connection-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Remote throttled the request
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Permanent request error (bad input, not found, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Any other failure reported by the remote service
    #[error("Remote error: {0}")]
    Remote(String),

    /// Cache backing store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`Error`], used by retry and fallback filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// [`Error::Config`]
    Config,
    /// [`Error::CircuitOpen`]
    CircuitOpen,
    /// [`Error::Timeout`]
    Timeout,
    /// [`Error::Transport`]
    Transport,
    /// [`Error::RateLimited`]
    RateLimited,
    /// [`Error::InvalidInput`]
    InvalidInput,
    /// [`Error::Remote`]
    Remote,
    /// [`Error::Storage`]
    Storage,
    /// [`Error::Io`]
    Io,
    /// [`Error::Json`]
    Serialization,
    /// [`Error::Internal`]
    Internal,
}

impl ErrorKind {
    /// Stable snake_case name, matching the configuration spelling
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::CircuitOpen => "circuit_open",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::RateLimited => "rate_limited",
            Self::InvalidInput => "invalid_input",
            Self::Remote => "remote",
            Self::Storage => "storage",
            Self::Io => "io",
            Self::Serialization => "serialization",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Transport(_) => ErrorKind::Transport,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Remote(_) => ErrorKind::Remote,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) => ErrorKind::Serialization,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Create a circuit-open error for `service`
    pub fn circuit_open(service: impl Into<String>) -> Self {
        Self::CircuitOpen {
            service: service.into(),
        }
    }

    /// Returns `true` if the call was rejected by an open circuit
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}
