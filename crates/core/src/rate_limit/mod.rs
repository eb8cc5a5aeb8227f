//! Per-client rate limiting
//!
//! - [`TokenBucket`]: continuous-refill bucket with fractional tokens
//! - [`RateLimiter`]: bounded map of buckets keyed by client id, with
//!   per-client overrides

pub mod bucket;
pub mod limiter;

pub use bucket::TokenBucket;
pub use limiter::{ClientLimit, ClientStatus, RateLimitConfig, RateLimiter, RATE_WINDOW};
