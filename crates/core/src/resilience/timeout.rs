//! Time bounds for single invocations
//!
//! The async form drops (cancels) the future when the bound expires. The
//! blocking form runs the operation on a helper thread and stops waiting when
//! the bound expires; the operation itself keeps running to completion in the
//! background and its result is discarded.

use std::future::Future;
use std::sync::mpsc;
use std::time::Duration;

use tracing::{error, warn};

use crate::error::{CallError, GuardError};

/// Time bound for one named operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeout {
    operation: String,
    duration: Duration,
}

impl Timeout {
    /// Bound `operation` to `duration`
    pub fn new(operation: impl Into<String>, duration: Duration) -> Self {
        Self { operation: operation.into(), duration }
    }

    /// Configured bound
    pub fn duration(&self) -> Duration {
        self.duration
    }

    fn expired(&self) -> GuardError {
        warn!(
            operation = %self.operation,
            timeout_ms = self.duration.as_millis() as u64,
            "operation_timed_out"
        );
        GuardError::Timeout { operation: self.operation.clone(), duration: self.duration }
    }

    /// Await `future` for at most the configured duration
    pub async fn execute<F, T, E>(&self, future: F) -> Result<T, CallError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(self.duration, future).await {
            Ok(result) => result.map_err(CallError::Operation),
            Err(_) => Err(CallError::Guard(self.expired())),
        }
    }

    /// Run a blocking `operation` on a helper thread, waiting at most the
    /// configured duration
    ///
    /// A panic in the operation is resumed on the calling thread.
    pub fn call<F, T, E>(&self, operation: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let spawned = std::thread::Builder::new()
            .name(format!("timeout-{}", self.operation))
            .spawn(move || {
                // The receiver is gone if the caller already timed out.
                let _ = tx.send(operation());
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                error!(operation = %self.operation, error = %err, "timeout_thread_spawn_failed");
                return Err(CallError::Guard(GuardError::resource_exhausted(
                    "timeout_threads",
                    0.0,
                    0.0,
                )));
            }
        };

        match rx.recv_timeout(self.duration) {
            Ok(result) => result.map_err(CallError::Operation),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(CallError::Guard(self.expired())),
            Err(mpsc::RecvTimeoutError::Disconnected) => match handle.join() {
                Err(panic) => std::panic::resume_unwind(panic),
                // The sender only drops without sending when the closure panics.
                Ok(()) => Err(CallError::Guard(self.expired())),
            },
        }
    }
}
