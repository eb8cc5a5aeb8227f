//! Scripted operations for exercising resilience policies
//!
//! A [`ScriptedOperation`] fails a fixed number of times before it starts
//! succeeding, and counts every invocation. Retry and circuit breaker tests use
//! it to assert exact attempt counts.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Error returned by a [`ScriptedOperation`] while it is still failing
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ScriptedError {
    /// Transient failure, expected to be retried
    #[error("transient failure on attempt {0}")]
    Transient(u32),
    /// Permanent failure, expected to be surfaced immediately
    #[error("permanent failure on attempt {0}")]
    Permanent(u32),
}

impl ScriptedError {
    /// Whether this failure should be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Shared invocation counter
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicU32>);

impl CallCounter {
    /// Create a counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment and return the new count
    pub fn hit(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current count
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Operation that fails `failures` times, then returns the attempt number
#[derive(Debug, Clone)]
pub struct ScriptedOperation {
    failures: u32,
    permanent: bool,
    counter: CallCounter,
}

impl ScriptedOperation {
    /// Fail with [`ScriptedError::Transient`] for the first `failures` calls
    pub fn failing_times(failures: u32) -> Self {
        Self { failures, permanent: false, counter: CallCounter::new() }
    }

    /// Fail with [`ScriptedError::Permanent`] on every call
    pub fn always_permanent() -> Self {
        Self { failures: u32::MAX, permanent: true, counter: CallCounter::new() }
    }

    /// Operation that always succeeds
    pub fn succeeding() -> Self {
        Self::failing_times(0)
    }

    /// Invoke the operation once
    pub fn call(&self) -> Result<u32, ScriptedError> {
        let attempt = self.counter.hit();
        if attempt <= self.failures {
            if self.permanent {
                return Err(ScriptedError::Permanent(attempt));
            }
            return Err(ScriptedError::Transient(attempt));
        }
        Ok(attempt)
    }

    /// Number of invocations so far
    pub fn calls(&self) -> u32 {
        self.counter.get()
    }
}
