//! Bulkhead for capping concurrency into one dependency
//!
//! Callers beyond the limit wait for a permit; they are never rejected. The
//! async and blocking forms share one semaphore, so the cap holds across both
//! execution models.

use std::future::Future;
use std::sync::Arc;

use floodgate_common::{ConfigError, ConfigResult};
use serde::Serialize;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, instrument};

use crate::error::{CallError, GuardError};

/// Point-in-time bulkhead occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BulkheadStats {
    /// Configured concurrency cap
    pub max_concurrent: usize,
    /// Operations currently holding a permit
    pub current: usize,
    /// Permits free right now
    pub available: usize,
}

/// Counting-semaphore concurrency limiter
///
/// # Examples
///
/// ```rust
/// use floodgate_core::resilience::BulkheadLimiter;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bulkhead = BulkheadLimiter::new("vector-index", 4)?;
/// let hits = bulkhead.execute(|| async { Ok::<_, std::io::Error>(vec![1, 2, 3]) }).await?;
/// assert_eq!(hits.len(), 3);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BulkheadLimiter {
    name: String,
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
}

impl BulkheadLimiter {
    /// Create a bulkhead allowing `max_concurrent` simultaneous operations
    pub fn new(name: impl Into<String>, max_concurrent: usize) -> ConfigResult<Self> {
        if max_concurrent == 0 {
            return Err(ConfigError::invalid("max_concurrent", "must be greater than 0"));
        }
        if max_concurrent > Semaphore::MAX_PERMITS {
            return Err(ConfigError::invalid(
                "max_concurrent",
                "exceeds the semaphore permit limit",
            ));
        }
        Ok(Self {
            name: name.into(),
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        })
    }

    /// Bulkhead name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current occupancy
    pub fn stats(&self) -> BulkheadStats {
        let available = self.semaphore.available_permits();
        BulkheadStats {
            max_concurrent: self.max_concurrent,
            current: self.max_concurrent.saturating_sub(available),
            available,
        }
    }

    fn closed(&self) -> GuardError {
        GuardError::resource_exhausted(
            format!("bulkhead_{}", self.name),
            self.max_concurrent as f64,
            self.max_concurrent as f64,
        )
    }

    fn log_wait(&self) {
        if self.semaphore.available_permits() == 0 {
            debug!(bulkhead = %self.name, max_concurrent = self.max_concurrent, "bulkhead_waiting");
        }
    }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>, GuardError> {
        self.log_wait();
        self.semaphore.acquire().await.map_err(|_| self.closed())
    }

    /// Run `operation` once a permit is free, holding it until completion
    ///
    /// A guard error only surfaces if the semaphore has been closed, which this
    /// type never does.
    #[instrument(skip_all, fields(bulkhead = %self.name))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _permit = self.acquire().await?;
        operation().await.map_err(CallError::Operation)
    }

    /// Blocking form of [`execute`](Self::execute), parking the thread until a
    /// permit is free
    ///
    /// Must not be called from inside an async task.
    pub fn call<F, T, E>(&self, operation: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let _permit = futures::executor::block_on(self.acquire())?;
        operation().map_err(CallError::Operation)
    }
}
