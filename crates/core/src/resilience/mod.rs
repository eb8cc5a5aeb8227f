//! Call-wrapping resilience policies
//!
//! Each policy offers an async `execute` and a blocking `call`. They compose by
//! nesting: a per-attempt [`Timeout`] inside [`Retry`], the retry sequence
//! inside a [`CircuitBreaker`], and so on.
//!
//! - [`CircuitBreaker`]: three-state failure isolation
//! - [`Retry`]: bounded attempts with exponential backoff
//! - [`Timeout`]: time bound on one invocation
//! - [`Fallback`]: substitute result on failure
//! - [`BulkheadLimiter`]: concurrency cap that queues callers

pub mod bulkhead;
pub mod circuit_breaker;
pub mod fallback;
pub mod retry;
pub mod timeout;

pub use bulkhead::{BulkheadLimiter, BulkheadStats};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerMetrics,
    CircuitState,
};
pub use fallback::Fallback;
pub use retry::{Retry, RetryConfig};
pub use timeout::Timeout;
