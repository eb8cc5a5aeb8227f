//! Shared error classification for the Floodgate crates
//!
//! Every error type that can reach a request handler implements
//! [`ErrorClassification`], so the handler can map it to a response (throttle,
//! overload, generic failure) and decide whether to retry without matching on
//! concrete variants.
//!
//! | Level | Use Case | Examples |
//! |-------|----------|----------|
//! | **Info** | Expected conditions | Cache misses, unknown ids |
//! | **Warning** | Degraded but operational | Rate limiting, open circuits, quota exhaustion |
//! | **Error** | Failure requiring attention | Invalid configuration |
//! | **Critical** | System integrity at risk | Internal invariant violations |
//!
//! ```rust,ignore
//! use floodgate_common::{ErrorClassification, ErrorSeverity};
//!
//! fn respond(err: &impl ErrorClassification) -> u16 {
//!     match err.severity() {
//!         ErrorSeverity::Warning if err.is_retryable() => 429,
//!         _ => 500,
//!     }
//! }
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type for configuration loading and validation
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors raised while building or loading settings
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A field holds a value outside its allowed range
    #[error("Invalid configuration for '{field}': {message}")]
    Invalid { field: String, message: String },

    /// An environment variable could not be parsed
    #[error("Invalid value '{value}' for environment variable {variable}")]
    Environment { variable: String, value: String },

    /// A configuration document could not be parsed
    #[error("Failed to parse {format} configuration: {message}")]
    Parse { format: String, message: String },
}

impl ConfigError {
    /// Create an invalid-field error
    pub fn invalid<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Invalid { field: field.into(), message: message.into() }
    }

    /// Create an environment parsing error
    pub fn environment<V: Into<String>, S: Into<String>>(variable: V, value: S) -> Self {
        Self::Environment { variable: variable.into(), value: value.into() }
    }

    /// Create a document parsing error
    pub fn parse<F: Into<String>, M: Into<String>>(format: F, message: M) -> Self {
        Self::Parse { format: format.into(), message: message.into() }
    }
}

impl ErrorClassification for ConfigError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Error
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Error classification trait for consistent error handling across modules
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient: rate limiting, open circuits, full
    /// slot pools, timeouts.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}
