//! Retry with exponential backoff
//!
//! An operation is attempted up to `max_attempts` times. After each retryable
//! failure the policy sleeps for the current delay and multiplies it by
//! `backoff`, capped at `max_delay` when set. Once attempts run out, or on an
//! error the predicate rejects, the last error is returned unchanged.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use floodgate_common::{duration_millis, option_duration_millis, ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Sleep before the first retry
    #[serde(rename = "delay_ms", with = "duration_millis")]
    pub delay: Duration,
    /// Multiplier applied to the delay after each retry
    pub backoff: f64,
    /// Upper bound on any single delay
    #[serde(rename = "max_delay_ms", with = "option_duration_millis")]
    pub max_delay: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, delay: Duration::from_secs(1), backoff: 2.0, max_delay: None }
    }
}

impl RetryConfig {
    /// Create a config with the given attempts, initial delay and multiplier
    pub fn new(max_attempts: u32, delay: Duration, backoff: f64) -> Self {
        Self { max_attempts, delay, backoff, max_delay: None }
    }

    /// Cap every delay at `max_delay`
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "must be greater than 0"));
        }
        if !(self.backoff.is_finite() && self.backoff >= 1.0) {
            return Err(ConfigError::invalid("backoff", "must be a finite number >= 1.0"));
        }
        Ok(())
    }

    /// Delay to use after `current`
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next = Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff)
            .unwrap_or(Duration::MAX);
        self.cap(next)
    }

    fn cap(&self, delay: Duration) -> Duration {
        self.max_delay.map_or(delay, |max| delay.min(max))
    }
}

type Predicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
type RetryHook<E> = Arc<dyn Fn(u32, &E) + Send + Sync>;

/// Retry policy for operations failing with `E`
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use floodgate_core::resilience::{Retry, RetryConfig};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let retry = Retry::<std::io::Error>::new(RetryConfig::new(3, Duration::ZERO, 2.0))?
///     .retry_if(|err| err.kind() == std::io::ErrorKind::TimedOut);
///
/// let mut attempts = 0;
/// let value = retry.call(|| {
///     attempts += 1;
///     if attempts < 2 {
///         Err(std::io::Error::from(std::io::ErrorKind::TimedOut))
///     } else {
///         Ok(attempts)
///     }
/// })?;
/// assert_eq!(value, 2);
/// # Ok(())
/// # }
/// ```
pub struct Retry<E> {
    config: RetryConfig,
    should_retry: Option<Predicate<E>>,
    on_retry: Option<RetryHook<E>>,
}

impl<E> Clone for Retry<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            should_retry: self.should_retry.clone(),
            on_retry: self.on_retry.clone(),
        }
    }
}

impl<E> fmt::Debug for Retry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("config", &self.config)
            .field("has_on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl<E> Retry<E> {
    /// Policy that retries every error
    pub fn new(config: RetryConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { config, should_retry: None, on_retry: None })
    }

    /// Only retry errors matching `predicate`
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Call `hook(attempt, &err)` before sleeping ahead of each retry
    pub fn on_retry<H>(mut self, hook: H) -> Self
    where
        H: Fn(u32, &E) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Active configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Decide what follows a failed `attempt`: `None` to give up, otherwise
    /// the delay before the next attempt
    fn after_failure(&self, attempt: u32, err: &E, delay: Duration) -> Option<Duration> {
        if attempt >= self.config.max_attempts {
            debug!(attempt, "retry_attempts_exhausted");
            return None;
        }
        if !self.should_retry.as_ref().map_or(true, |retryable| retryable(err)) {
            debug!(attempt, "retry_error_not_retryable");
            return None;
        }

        let delay = self.config.cap(delay);
        warn!(
            attempt,
            max_attempts = self.config.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "retrying_operation"
        );
        if let Some(hook) = &self.on_retry {
            hook(attempt, err);
        }
        Some(delay)
    }

    /// Run an async operation with retries, sleeping on the tokio timer
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut delay = self.config.delay;
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(wait) = self.after_failure(attempt, &err, delay) else {
                        return Err(err);
                    };
                    tokio::time::sleep(wait).await;
                    delay = self.config.next_delay(wait);
                    attempt += 1;
                }
            }
        }
    }

    /// Run a blocking operation with retries, sleeping the thread
    pub fn call<F, T>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
    {
        let mut delay = self.config.delay;
        let mut attempt = 1;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(wait) = self.after_failure(attempt, &err, delay) else {
                        return Err(err);
                    };
                    std::thread::sleep(wait);
                    delay = self.config.next_delay(wait);
                    attempt += 1;
                }
            }
        }
    }
}
