//! Admission and resilience errors
//!
//! [`GuardError`] is what this layer itself rejects with. [`CallError`] is
//! returned by wrappers that run a caller's operation, and keeps the
//! operation's own error untouched next to the guard rejection.

use std::time::Duration;

use floodgate_common::{ErrorClassification, ErrorSeverity};
use thiserror::Error;

/// Result type for admission checks
pub type GuardResult<T> = Result<T, GuardError>;

/// Rejections produced by the admission and resilience layer
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GuardError {
    /// The client's token bucket cannot cover the request
    #[error("Rate limit exceeded for client '{client_id}': {limit} requests per {window:?}")]
    RateLimitExceeded { limit: u32, window: Duration, client_id: String },

    /// A bounded resource is used up
    ///
    /// `resource_type` is `concurrent_requests`, `request_duration`, or
    /// `quota_<type>` for per-client quotas. `request_duration` reports
    /// seconds.
    #[error("Resource exhausted: {resource_type} ({current}/{limit})")]
    ResourceExhausted { resource_type: String, current: f64, limit: f64 },

    /// The named circuit breaker is open
    #[error("Circuit breaker '{name}' is open, retry after {retry_after:?}")]
    CircuitOpen { name: String, retry_after: Duration },

    /// A request id that already holds a slot tried to claim another
    #[error("Request '{request_id}' already holds a slot")]
    DuplicateRequest { request_id: String },

    /// An operation did not finish within its time bound
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },
}

impl GuardError {
    /// Build a `ResourceExhausted` error
    pub fn resource_exhausted(resource_type: impl Into<String>, current: f64, limit: f64) -> Self {
        Self::ResourceExhausted { resource_type: resource_type.into(), current, limit }
    }

    /// Short machine-readable tag for logs and response mapping
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::ResourceExhausted { .. } => "resource_exhausted",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::DuplicateRequest { .. } => "duplicate_request",
            Self::Timeout { .. } => "timeout",
        }
    }
}

impl ErrorClassification for GuardError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimitExceeded { .. } | Self::CircuitOpen { .. } | Self::Timeout { .. } => {
                true
            }
            Self::ResourceExhausted { resource_type, .. } => resource_type == "concurrent_requests",
            Self::DuplicateRequest { .. } => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Timeout { .. } => ErrorSeverity::Error,
            _ => ErrorSeverity::Warning,
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => Some(*retry_after),
            Self::RateLimitExceeded { limit, window, .. } if *limit > 0 => {
                Some(*window / *limit)
            }
            _ => None,
        }
    }
}

/// Outcome of running an operation through a guard
///
/// `Operation` carries the operation's error exactly as it was returned.
#[derive(Debug, Error, PartialEq)]
pub enum CallError<E> {
    /// The guard rejected or bounded the call
    #[error(transparent)]
    Guard(#[from] GuardError),

    /// The operation ran and failed
    #[error("{0}")]
    Operation(E),
}

impl<E> CallError<E> {
    /// The operation's error, if the operation ran and failed
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(err) => Some(err),
            Self::Guard(_) => None,
        }
    }

    /// Borrow the operation's error
    pub fn operation(&self) -> Option<&E> {
        match self {
            Self::Operation(err) => Some(err),
            Self::Guard(_) => None,
        }
    }

    /// Borrow the guard rejection
    pub fn guard(&self) -> Option<&GuardError> {
        match self {
            Self::Guard(err) => Some(err),
            Self::Operation(_) => None,
        }
    }

    /// Whether the guard produced this error
    pub fn is_guard(&self) -> bool {
        matches!(self, Self::Guard(_))
    }

    /// Map the operation error, leaving guard errors alone
    pub fn map_operation<F, U>(self, f: F) -> CallError<U>
    where
        F: FnOnce(E) -> U,
    {
        match self {
            Self::Guard(err) => CallError::Guard(err),
            Self::Operation(err) => CallError::Operation(f(err)),
        }
    }
}

impl<E> CallError<CallError<E>> {
    /// Collapse one level of nesting from stacked guards
    ///
    /// `Timeout` around a `CircuitBreaker` yields `CallError<CallError<E>>`;
    /// flattening keeps whichever guard rejected and the operation error.
    pub fn flatten(self) -> CallError<E> {
        match self {
            Self::Guard(err) => CallError::Guard(err),
            Self::Operation(inner) => inner,
        }
    }
}
