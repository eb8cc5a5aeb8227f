//! Per-client rate limiter
//!
//! Each client gets its own [`TokenBucket`], created full on first use. Rates
//! are requests per minute; a bucket for `(rate, burst)` holds `burst` tokens
//! and refills at `rate / 60` tokens per second.
//!
//! The client map is an LRU capped at `max_tracked_clients`. A client whose
//! bucket was evicted starts again with a full bucket. Per-client overrides
//! are kept separately and are never evicted.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use floodgate_common::{Clock, ConfigError, ConfigResult, SystemClock};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::bucket::TokenBucket;
use crate::error::{GuardError, GuardResult};

/// Window the configured rate is expressed over
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Longest single sleep inside the waiting loops
const MAX_WAIT_SLICE: Duration = Duration::from_secs(1);

/// Rate limiter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per minute for clients without an override
    pub default_rate: u32,
    /// Bucket capacity for clients without an override
    pub default_burst: u32,
    /// Upper bound on buckets held at once
    pub max_tracked_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { default_rate: 60, default_burst: 10, max_tracked_clients: 10_000 }
    }
}

impl RateLimitConfig {
    /// Create a config with the given default rate and burst
    pub fn new(default_rate: u32, default_burst: u32) -> Self {
        Self { default_rate, default_burst, ..Self::default() }
    }

    /// Set the client map bound
    pub fn with_max_tracked_clients(mut self, max: usize) -> Self {
        self.max_tracked_clients = max;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        ClientLimit::new(self.default_rate, self.default_burst)?;
        if self.max_tracked_clients == 0 {
            return Err(ConfigError::invalid("max_tracked_clients", "must be greater than 0"));
        }
        Ok(())
    }

    fn default_limit(&self) -> ClientLimit {
        ClientLimit { rate: self.default_rate, burst: self.default_burst }
    }
}

/// Rate and burst applied to one client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientLimit {
    /// Requests per minute
    pub rate: u32,
    /// Bucket capacity
    pub burst: u32,
}

impl ClientLimit {
    /// Create a validated limit
    pub fn new(rate: u32, burst: u32) -> ConfigResult<Self> {
        if rate == 0 {
            return Err(ConfigError::invalid("rate", "must be greater than 0"));
        }
        if burst == 0 {
            return Err(ConfigError::invalid("burst", "must be greater than 0"));
        }
        Ok(Self { rate, burst })
    }

    /// Tokens added per second
    pub fn refill_per_second(&self) -> f64 {
        f64::from(self.rate) / RATE_WINDOW.as_secs_f64()
    }
}

/// Read-only view of one client's bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientStatus {
    /// Tokens available now
    pub available_tokens: f64,
    /// Bucket capacity
    pub capacity: f64,
    /// Tokens added per second
    pub refill_rate: f64,
    /// Whether the client has a custom limit
    pub has_override: bool,
}

struct BucketEntry<C: Clock> {
    limit: ClientLimit,
    bucket: Mutex<TokenBucket<C>>,
}

/// Per-client token bucket rate limiter
///
/// The map lock only covers lookup and insertion; each bucket is consumed
/// under its own mutex.
pub struct RateLimiter<C: Clock = SystemClock> {
    config: RateLimitConfig,
    buckets: Mutex<lru::LruCache<String, Arc<BucketEntry<C>>>>,
    overrides: RwLock<HashMap<String, ClientLimit>>,
    clock: Arc<C>,
}

impl<C: Clock> std::fmt::Debug for RateLimiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("tracked_clients", &self.tracked_clients())
            .finish()
    }
}

impl RateLimiter<SystemClock> {
    /// Create a limiter on the system clock
    pub fn new(config: RateLimitConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a limiter with a custom clock
    pub fn with_clock(config: RateLimitConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        let cap = NonZeroUsize::new(config.max_tracked_clients).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            config,
            buckets: Mutex::new(lru::LruCache::new(cap)),
            overrides: RwLock::new(HashMap::new()),
            clock: Arc::new(clock),
        })
    }

    fn limit_for(&self, client_id: &str) -> ClientLimit {
        self.overrides
            .read()
            .get(client_id)
            .copied()
            .unwrap_or_else(|| self.config.default_limit())
    }

    fn entry_for(&self, client_id: &str) -> Arc<BucketEntry<C>> {
        let mut buckets = self.buckets.lock();
        if let Some(entry) = buckets.get(client_id) {
            return Arc::clone(entry);
        }

        let limit = self.limit_for(client_id);
        let entry = Arc::new(BucketEntry {
            limit,
            bucket: Mutex::new(TokenBucket::full(
                f64::from(limit.burst),
                limit.refill_per_second(),
                Arc::clone(&self.clock),
            )),
        });

        if let Some((evicted, _)) = buckets.push(client_id.to_string(), Arc::clone(&entry)) {
            debug!(client_id = %evicted, "rate_limit_bucket_evicted");
        }
        entry
    }

    fn exceeded(client_id: &str, limit: ClientLimit) -> GuardError {
        GuardError::RateLimitExceeded {
            limit: limit.rate,
            window: RATE_WINDOW,
            client_id: client_id.to_string(),
        }
    }

    /// Take `tokens` from the client's bucket or reject
    ///
    /// Never waits. A rejection consumes nothing.
    pub fn check_rate_limit(&self, client_id: &str, tokens: u32) -> GuardResult<()> {
        let entry = self.entry_for(client_id);
        let allowed = entry.bucket.lock().consume(f64::from(tokens));

        if allowed {
            debug!(client_id, tokens, "rate_limit_passed");
            Ok(())
        } else {
            warn!(client_id, tokens, rate = entry.limit.rate, "rate_limit_exceeded");
            Err(Self::exceeded(client_id, entry.limit))
        }
    }

    /// Next step of a waiting loop: `Ok(None)` once the tokens were taken,
    /// otherwise how long to sleep before trying again
    fn try_take(&self, client_id: &str, tokens: u32) -> GuardResult<Option<Duration>> {
        let entry = self.entry_for(client_id);
        let mut bucket = entry.bucket.lock();
        let n = f64::from(tokens);

        if bucket.consume(n) {
            return Ok(None);
        }
        // Never satisfiable, waiting would spin forever.
        if n > bucket.capacity() {
            warn!(client_id, tokens, burst = entry.limit.burst, "rate_limit_request_exceeds_burst");
            return Err(Self::exceeded(client_id, entry.limit));
        }
        Ok(Some(bucket.wait_time(n).min(MAX_WAIT_SLICE)))
    }

    /// Wait until `tokens` can be taken from the client's bucket
    ///
    /// Sleeps on the tokio timer for at most one second at a time without
    /// holding any lock. Cancelling the future consumes nothing. Fails only if
    /// `tokens` exceeds the client's burst.
    #[instrument(skip(self))]
    pub async fn wait_for_token(&self, client_id: &str, tokens: u32) -> GuardResult<()> {
        while let Some(wait) = self.try_take(client_id, tokens)? {
            debug!(wait_ms = wait.as_millis() as u64, "rate_limit_waiting");
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }

    /// Thread-blocking form of [`wait_for_token`](Self::wait_for_token)
    pub fn wait_for_token_blocking(&self, client_id: &str, tokens: u32) -> GuardResult<()> {
        while let Some(wait) = self.try_take(client_id, tokens)? {
            std::thread::sleep(wait);
        }
        Ok(())
    }

    /// Replace the client's limit and discard its current bucket
    pub fn set_custom_limit(&self, client_id: &str, rate: u32, burst: u32) -> ConfigResult<()> {
        let limit = ClientLimit::new(rate, burst)?;
        self.overrides.write().insert(client_id.to_string(), limit);
        self.buckets.lock().pop(client_id);
        debug!(client_id, rate, burst, "rate_limit_override_set");
        Ok(())
    }

    /// Drop the client's override, returning to defaults with a fresh bucket
    pub fn remove_custom_limit(&self, client_id: &str) -> bool {
        let removed = self.overrides.write().remove(client_id).is_some();
        if removed {
            self.buckets.lock().pop(client_id);
            debug!(client_id, "rate_limit_override_removed");
        }
        removed
    }

    /// Snapshot of the client's bucket, `None` if it is not tracked
    ///
    /// Does not refill the stored bucket or change LRU order.
    pub fn client_status(&self, client_id: &str) -> Option<ClientStatus> {
        let entry = self.buckets.lock().peek(client_id).map(Arc::clone)?;
        let has_override = self.overrides.read().contains_key(client_id);
        let bucket = entry.bucket.lock();

        Some(ClientStatus {
            available_tokens: bucket.peek_available(),
            capacity: bucket.capacity(),
            refill_rate: bucket.refill_rate(),
            has_override,
        })
    }

    /// Number of buckets currently held
    pub fn tracked_clients(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Active configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use floodgate_common::testing::assert_approx_eq;
    use floodgate_common::MockClock;

    use super::*;

    fn limiter(rate: u32, burst: u32) -> (RateLimiter<MockClock>, MockClock) {
        let clock = MockClock::new();
        let limiter = RateLimiter::with_clock(RateLimitConfig::new(rate, burst), clock.clone())
            .expect("valid config");
        (limiter, clock)
    }

    #[test]
    fn test_burst_exactness() {
        let (limiter, _clock) = limiter(60, 10);

        for i in 0..10 {
            assert!(limiter.check_rate_limit("c1", 1).is_ok(), "request {i} should pass");
        }

        let err = limiter.check_rate_limit("c1", 1).unwrap_err();
        assert_eq!(
            err,
            GuardError::RateLimitExceeded {
                limit: 60,
                window: Duration::from_secs(60),
                client_id: "c1".to_string()
            }
        );
    }

    #[test]
    fn test_clients_are_independent() {
        let (limiter, _clock) = limiter(60, 1);
        assert!(limiter.check_rate_limit("a", 1).is_ok());
        assert!(limiter.check_rate_limit("a", 1).is_err());
        assert!(limiter.check_rate_limit("b", 1).is_ok());
    }

    #[test]
    fn test_refills_at_rate_per_minute() {
        let (limiter, clock) = limiter(60, 2);
        assert!(limiter.check_rate_limit("c1", 2).is_ok());
        assert!(limiter.check_rate_limit("c1", 1).is_err());

        clock.advance(Duration::from_secs(1));
        assert!(limiter.check_rate_limit("c1", 1).is_ok());
        assert!(limiter.check_rate_limit("c1", 1).is_err());
    }

    #[test]
    fn test_custom_limit_discards_bucket() {
        let (limiter, _clock) = limiter(60, 2);
        assert!(limiter.check_rate_limit("vip", 2).is_ok());
        assert!(limiter.check_rate_limit("vip", 1).is_err());

        limiter.set_custom_limit("vip", 600, 5).expect("valid limit");

        let status = limiter.client_status("vip");
        assert!(status.is_none(), "bucket should be discarded");

        for _ in 0..5 {
            assert!(limiter.check_rate_limit("vip", 1).is_ok());
        }
        let err = limiter.check_rate_limit("vip", 1).unwrap_err();
        assert!(matches!(err, GuardError::RateLimitExceeded { limit: 600, .. }));
    }

    #[test]
    fn test_remove_custom_limit() {
        let (limiter, _clock) = limiter(60, 1);
        limiter.set_custom_limit("c1", 120, 3).expect("valid limit");
        assert!(limiter.check_rate_limit("c1", 3).is_ok());

        assert!(limiter.remove_custom_limit("c1"));
        assert!(!limiter.remove_custom_limit("c1"));

        assert!(limiter.check_rate_limit("c1", 1).is_ok());
        assert!(limiter.check_rate_limit("c1", 1).is_err());
    }

    #[test]
    fn test_invalid_custom_limit_rejected() {
        let (limiter, _clock) = limiter(60, 1);
        assert!(limiter.set_custom_limit("c1", 0, 1).is_err());
        assert!(limiter.set_custom_limit("c1", 1, 0).is_err());
    }

    #[test]
    fn test_client_status_snapshot() {
        let (limiter, clock) = limiter(60, 10);
        assert!(limiter.client_status("c1").is_none());

        limiter.check_rate_limit("c1", 4).expect("within burst");
        clock.advance(Duration::from_secs(2));

        let status = limiter.client_status("c1").expect("tracked");
        assert_approx_eq(status.available_tokens, 8.0, 1e-9);
        assert_approx_eq(status.capacity, 10.0, 1e-9);
        assert_approx_eq(status.refill_rate, 1.0, 1e-9);
        assert!(!status.has_override);
    }

    #[test]
    fn test_bounded_client_map_evicts_lru() {
        let clock = MockClock::new();
        let config = RateLimitConfig::new(60, 1).with_max_tracked_clients(2);
        let limiter = RateLimiter::with_clock(config, clock).expect("valid config");

        limiter.check_rate_limit("a", 1).expect("a");
        limiter.check_rate_limit("b", 1).expect("b");
        limiter.check_rate_limit("c", 1).expect("c");

        assert_eq!(limiter.tracked_clients(), 2);
        assert!(limiter.client_status("a").is_none());
        // Evicted client returns with a full bucket.
        assert!(limiter.check_rate_limit("a", 1).is_ok());
    }

    #[test]
    fn test_blocking_wait_rejects_request_larger_than_burst() {
        let (limiter, _clock) = limiter(60, 3);
        let err = limiter.wait_for_token_blocking("c1", 4).unwrap_err();
        assert!(matches!(err, GuardError::RateLimitExceeded { .. }));
        assert_approx_eq(
            limiter.client_status("c1").expect("tracked").available_tokens,
            3.0,
            1e-9,
        );
    }

    #[test]
    fn test_config_validation() {
        assert!(RateLimitConfig::default().validate().is_ok());
        assert!(RateLimitConfig::new(0, 10).validate().is_err());
        assert!(RateLimitConfig::new(60, 0).validate().is_err());
        assert!(RateLimitConfig::new(60, 10).with_max_tracked_clients(0).validate().is_err());
    }
}
