//! Token bucket primitive
//!
//! A bucket holds up to `capacity` tokens and refills continuously at
//! `refill_rate` tokens per second. Tokens are fractional so slow rates (one
//! request per minute) refill smoothly instead of in whole-token steps.

use std::sync::Arc;
use std::time::{Duration, Instant};

use floodgate_common::{Clock, ConfigError, ConfigResult, SystemClock};

/// Continuous-refill token bucket
///
/// Not internally synchronized: the rate limiter wraps each bucket in its own
/// mutex.
///
/// # Examples
///
/// ```rust
/// use floodgate_core::rate_limit::TokenBucket;
///
/// # fn example() -> Result<(), floodgate_common::ConfigError> {
/// let mut bucket = TokenBucket::new(10.0, 1.0)?;
/// assert!(bucket.consume(10.0));
/// assert!(!bucket.consume(1.0));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TokenBucket<C: Clock = SystemClock> {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
    clock: Arc<C>,
}

impl TokenBucket<SystemClock> {
    /// Create a full bucket on the system clock
    pub fn new(capacity: f64, refill_rate: f64) -> ConfigResult<Self> {
        Self::with_clock(capacity, refill_rate, Arc::new(SystemClock))
    }
}

impl<C: Clock> TokenBucket<C> {
    /// Create a full bucket reading time from `clock`
    pub fn with_clock(capacity: f64, refill_rate: f64, clock: Arc<C>) -> ConfigResult<Self> {
        if !(capacity.is_finite() && capacity > 0.0) {
            return Err(ConfigError::invalid("capacity", "must be a positive number"));
        }
        if !(refill_rate.is_finite() && refill_rate > 0.0) {
            return Err(ConfigError::invalid("refill_rate", "must be a positive number"));
        }
        Ok(Self::full(capacity, refill_rate, clock))
    }

    /// Construct without validation; callers guarantee positive finite values
    pub(crate) fn full(capacity: f64, refill_rate: f64, clock: Arc<C>) -> Self {
        let now = clock.now();
        Self { capacity, refill_rate, tokens: capacity, last_refill: now, clock }
    }

    fn refill(&mut self) {
        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Take `n` tokens if available
    ///
    /// Either all `n` tokens are taken or none are.
    pub fn consume(&mut self, n: f64) -> bool {
        self.refill();
        if self.tokens >= n {
            self.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Time until `n` tokens will be available, zero if they already are
    ///
    /// Rounded up to the next whole microsecond plus one, so `consume(n)`
    /// succeeds once the returned duration has passed.
    pub fn wait_time(&mut self, n: f64) -> Duration {
        self.refill();
        if self.tokens >= n {
            return Duration::ZERO;
        }
        let micros = ((n - self.tokens) / self.refill_rate * 1e6).ceil() + 1.0;
        if !micros.is_finite() || micros >= u64::MAX as f64 {
            return Duration::MAX;
        }
        Duration::from_micros(micros as u64)
    }

    /// Tokens available now, with refill applied
    pub fn available(&mut self) -> f64 {
        self.refill();
        self.tokens
    }

    /// Tokens that would be available now, without updating the bucket
    pub fn peek_available(&self) -> f64 {
        let elapsed =
            self.clock.now().saturating_duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * self.refill_rate).min(self.capacity)
    }

    /// Maximum tokens the bucket can hold
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens added per second
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }
}
