//! # Floodgate Core
//!
//! Admission control and resilience policies for services that front a slow
//! or unreliable dependency (an inference engine, a vector-search index).
//!
//! This crate contains:
//! - Admission checks: per-client rate limits, concurrent request slots,
//!   per-client quotas
//! - Call-wrapping policies: circuit breaker, retry, timeout, fallback,
//!   bulkhead
//! - Expiring LRU result caches
//!
//! ## Architecture Principles
//! - Only depends on `floodgate-common`
//! - No sockets, files or global state; everything is constructed explicitly
//! - Every time-dependent component is generic over [`floodgate_common::Clock`]
//! - Blocking `call` and async `execute` forms share one state machine
//!
//! ## Example
//!
//! ```rust
//! use floodgate_core::{AdmissionControl, FloodgateConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let control = AdmissionControl::new(FloodgateConfig::default())?;
//!
//! let permit = control.admit("client-a", "req-1", "api_calls")?;
//! let answer = control
//!     .breaker("inference")
//!     .execute(|| async { Ok::<_, std::io::Error>("generated text") })
//!     .await?;
//! drop(permit);
//! # let _ = answer;
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod cache;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod resilience;
pub mod resources;

pub use admission::{AdmissionControl, AdmissionPermit};
pub use cache::{CacheManager, CacheStats, Cached, LruCache};
pub use config::FloodgateConfig;
pub use error::{CallError, GuardError, GuardResult};
pub use rate_limit::{RateLimiter, TokenBucket};
pub use resilience::{
    BulkheadLimiter, CircuitBreaker, CircuitBreakerConfig, CircuitState, Fallback, Retry,
    RetryConfig, Timeout,
};
pub use resources::{QuotaManager, ResourceManager, SlotGuard};
