//! Error handling for the bot library.
//!
//! WHOIS lookups themselves never fail (see [`crate::WhoisFetcher`]); the errors
//! here cover everything around them: invalid input, persistence, configuration
//! and the chat transport.

use std::fmt;

/// Main error type for bot operations.
#[derive(Debug, Clone)]
pub enum BotError {
    /// Invalid domain name format
    InvalidDomain { domain: String, reason: String },

    /// Chat transport failures (HTTP errors, API rejections)
    TransportError {
        message: String,
        source: Option<String>,
    },

    /// JSON or TOML parsing errors
    ParseError { message: String },

    /// Configuration errors (missing token, invalid values)
    ConfigError { message: String },

    /// File I/O errors on persisted state or config files
    FileError { path: String, message: String },

    /// Timeout errors when operations take too long
    Timeout {
        operation: String,
        duration: std::time::Duration,
    },

    /// Generic internal errors that don't fit other categories
    Internal { message: String },
}

impl BotError {
    /// Create a new invalid domain error.
    pub fn invalid_domain<D: Into<String>, R: Into<String>>(domain: D, reason: R) -> Self {
        Self::InvalidDomain {
            domain: domain.into(),
            reason: reason.into(),
        }
    }

    /// Create a new transport error.
    pub fn transport<M: Into<String>>(message: M) -> Self {
        Self::TransportError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new transport error with source information.
    pub fn transport_with_source<M: Into<String>, S: Into<String>>(message: M, source: S) -> Self {
        Self::TransportError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout<O: Into<String>>(operation: O, duration: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Check if this error suggests the operation should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportError { .. } | Self::Timeout { .. })
    }
}

impl fmt::Display for BotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDomain { domain, reason } => {
                write!(f, "Invalid domain '{}': {}", domain, reason)
            }
            Self::TransportError { message, source } => {
                if let Some(source) = source {
                    write!(f, "Transport error: {} (source: {})", message, source)
                } else {
                    write!(f, "Transport error: {}", message)
                }
            }
            Self::ParseError { message } => {
                write!(f, "Parse error: {}", message)
            }
            Self::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::FileError { path, message } => {
                write!(f, "File error at '{}': {}", path, message)
            }
            Self::Timeout {
                operation,
                duration,
            } => {
                write!(f, "Timeout after {:?} during: {}", duration, operation)
            }
            Self::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for BotError {}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError {
            message: format!("JSON parsing failed: {}", err),
        }
    }
}

impl From<toml::de::Error> for BotError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigError {
            message: format!("Failed to parse TOML configuration: {}", err),
        }
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            message: format!("I/O error: {}", err),
        }
    }
}
