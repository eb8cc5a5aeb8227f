//! Three-state circuit breaker
//!
//! ```text
//! Closed   --failures >= threshold-->                   Open
//! Open     --next call after recovery_timeout-->        HalfOpen
//! HalfOpen --success-->                                 Closed
//! HalfOpen --failure-->                                 Open
//! ```
//!
//! All state lives behind one mutex per breaker. The lock is taken to admit a
//! call and again to record its outcome, never while the operation runs.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use floodgate_common::{duration_millis, Clock, ConfigError, ConfigResult, SystemClock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{CallError, GuardError};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are rejected without running
    Open,
    /// Calls pass through to probe recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before a probe is allowed
    #[serde(rename = "recovery_timeout_ms", with = "duration_millis")]
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, recovery_timeout: Duration::from_secs(60) }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`]
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    /// Consecutive failures that open the circuit
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Time the circuit stays open before a probe is allowed
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.config.recovery_timeout = timeout;
        self
    }

    /// Validate and return the config
    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Circuit breaker metrics for monitoring
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerMetrics {
    /// State as of the snapshot, no transition applied
    pub state: CircuitState,
    /// Failures counted since the last reset or successful call
    pub failure_count: u32,
    /// Calls admitted to run
    pub total_calls: u64,
    /// Calls rejected while open
    pub rejected_calls: u64,
    /// When the most recent counted failure happened
    pub last_failure_time: Option<Instant>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    total_calls: u64,
    rejected_calls: u64,
}

/// Failure-isolating guard around one dependency
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &inner.state)
            .field("failure_count", &inner.failure_count)
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker on the system clock
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker with a custom clock (useful for testing)
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: C,
    ) -> ConfigResult<Self> {
        Self::with_shared_clock(name, config, Arc::new(clock))
    }

    pub(crate) fn with_shared_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<C>,
    ) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::from_validated(name, config, clock))
    }

    /// Build from a config that has already passed `validate`
    pub(crate) fn from_validated(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<C>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
                total_calls: 0,
                rejected_calls: 0,
            }),
            clock,
        }
    }

    /// Admit a call or reject it, moving Open to HalfOpen once the cooldown
    /// has passed
    fn try_acquire(&self) -> Result<(), GuardError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open {
            let elapsed = inner
                .last_failure_time
                .map_or(self.config.recovery_timeout, |at| now.saturating_duration_since(at));

            if elapsed < self.config.recovery_timeout {
                inner.rejected_calls += 1;
                let retry_after = self.config.recovery_timeout - elapsed;
                debug!(
                    breaker = %self.name,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "circuit_call_rejected"
                );
                return Err(GuardError::CircuitOpen { name: self.name.clone(), retry_after });
            }

            inner.state = CircuitState::HalfOpen;
            info!(breaker = %self.name, "circuit_half_open");
        }

        inner.total_calls += 1;
        Ok(())
    }

    /// Record a successful call: HalfOpen or Closed becomes Closed with a
    /// zero failure count
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                info!(breaker = %self.name, "circuit_closed");
            }
            // A call admitted before the circuit opened finished late.
            CircuitState::Open => {}
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_time = Some(now);

        match inner.state {
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                inner.state = CircuitState::Open;
                warn!(breaker = %self.name, failures = inner.failure_count, "circuit_opened");
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                warn!(breaker = %self.name, "circuit_reopened_after_probe");
            }
            _ => {}
        }
    }

    /// Run a blocking operation; every error counts as a failure
    pub fn call<F, T, E>(&self, operation: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.call_if(operation, |_| true)
    }

    /// Run a blocking operation; only errors matching `is_failure` count
    ///
    /// Non-matching errors are returned without touching breaker state.
    pub fn call_if<F, P, T, E>(&self, operation: F, is_failure: P) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        P: FnOnce(&E) -> bool,
    {
        self.try_acquire()?;
        let result = operation();
        self.settle(result, is_failure)
    }

    /// Run an async operation; every error counts as a failure
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_if(operation, |_| true).await
    }

    /// Run an async operation; only errors matching `is_failure` count
    #[instrument(skip_all, fields(breaker = %self.name))]
    pub async fn execute_if<F, Fut, P, T, E>(
        &self,
        operation: F,
        is_failure: P,
    ) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnOnce(&E) -> bool,
    {
        self.try_acquire()?;
        let result = operation().await;
        self.settle(result, is_failure)
    }

    fn settle<T, E, P>(&self, result: Result<T, E>, is_failure: P) -> Result<T, CallError<E>>
    where
        P: FnOnce(&E) -> bool,
    {
        match result {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                if is_failure(&err) {
                    self.record_failure();
                } else {
                    debug!(breaker = %self.name, "circuit_ignored_error");
                }
                Err(CallError::Operation(err))
            }
        }
    }

    /// Current state; does not apply the Open to HalfOpen transition
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Snapshot of counters and state
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        CircuitBreakerMetrics {
            state: inner.state,
            failure_count: inner.failure_count,
            total_calls: inner.total_calls,
            rejected_calls: inner.rejected_calls,
            last_failure_time: inner.last_failure_time,
        }
    }

    /// Force the breaker closed and clear failures
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure_time = None;
        info!(breaker = %self.name, "circuit_manually_reset");
    }

    /// Breaker name, used in errors and logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Active configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use floodgate_common::testing::{CallCounter, ScriptedError, ScriptedOperation};
    use floodgate_common::MockClock;

    use super::*;

    fn breaker(threshold: u32, timeout_secs: u64) -> (CircuitBreaker<MockClock>, MockClock) {
        let clock = MockClock::new();
        let config = CircuitBreakerConfig::builder()
            .failure_threshold(threshold)
            .recovery_timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("valid config");
        let breaker = CircuitBreaker::with_clock("downstream", config, clock.clone())
            .expect("valid config");
        (breaker, clock)
    }

    fn trip(breaker: &CircuitBreaker<MockClock>, times: u32) {
        for _ in 0..times {
            let _ = breaker.call(|| Err::<(), _>("boom"));
        }
    }

    #[test]
    fn test_opens_at_threshold() {
        let (breaker, _clock) = breaker(3, 60);

        trip(&breaker, 2);
        assert_eq!(breaker.state(), CircuitState::Closed);

        trip(&breaker, 1);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.metrics().failure_count, 3);
    }

    #[test]
    fn test_open_rejects_without_invoking() {
        let (breaker, clock) = breaker(3, 60);
        trip(&breaker, 3);
        clock.advance(Duration::from_secs(20));

        let counter = CallCounter::new();
        let result = breaker.call(|| {
            counter.hit();
            Ok::<_, &str>(())
        });

        assert_eq!(counter.get(), 0);
        match result {
            Err(CallError::Guard(GuardError::CircuitOpen { name, retry_after })) => {
                assert_eq!(name, "downstream");
                assert_eq!(retry_after, Duration::from_secs(40));
            }
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
        assert_eq!(breaker.metrics().rejected_calls, 1);
    }

    #[test]
    fn test_probe_success_closes() {
        let (breaker, clock) = breaker(3, 60);
        trip(&breaker, 3);
        clock.advance(Duration::from_secs(60));

        assert_eq!(breaker.call(|| Ok::<_, &str>(7)), Ok(7));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().failure_count, 0);
    }

    #[test]
    fn test_probe_failure_reopens() {
        let (breaker, clock) = breaker(3, 60);
        trip(&breaker, 3);
        clock.advance(Duration::from_secs(61));

        let op = ScriptedOperation::failing_times(1);
        let result = breaker.call(|| op.call());
        assert_eq!(result, Err(CallError::Operation(ScriptedError::Transient(1))));
        assert_eq!(op.calls(), 1);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.metrics().failure_count, 4);

        // Cooldown restarts from the probe failure.
        clock.advance(Duration::from_secs(30));
        assert!(matches!(breaker.call(|| op.call()), Err(CallError::Guard(_))));
    }

    #[test]
    fn test_success_in_closed_resets_count() {
        let (breaker, _clock) = breaker(3, 60);
        trip(&breaker, 2);
        let _ = breaker.call(|| Ok::<_, &str>(()));
        trip(&breaker, 2);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_non_matching_errors_leave_state_alone() {
        let (breaker, _clock) = breaker(1, 60);
        let op = ScriptedOperation::always_permanent();

        let result = breaker.call_if(|| op.call(), ScriptedError::is_transient);
        assert_eq!(result, Err(CallError::Operation(ScriptedError::Permanent(1))));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().failure_count, 0);
    }

    #[test]
    fn test_state_does_not_transition() {
        let (breaker, clock) = breaker(1, 10);
        trip(&breaker, 1);
        clock.advance(Duration::from_secs(11));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_manual_recording_and_reset() {
        let (breaker, _clock) = breaker(2, 60);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.metrics().last_failure_time.is_some());

        breaker.reset();
        let metrics = breaker.metrics();
        assert_eq!(metrics.state, CircuitState::Closed);
        assert_eq!(metrics.failure_count, 0);
        assert!(metrics.last_failure_time.is_none());
    }

    #[tokio::test]
    async fn test_execute_async() {
        let (breaker, _clock) = breaker(1, 60);

        let ok = breaker.execute(|| async { Ok::<_, String>("ready") }).await;
        assert_eq!(ok, Ok("ready"));

        let err = breaker.execute(|| async { Err::<(), _>("down".to_string()) }).await;
        assert_eq!(err.unwrap_err().into_operation(), Some("down".to_string()));
        assert_eq!(breaker.state(), CircuitState::Open);

        let rejected = breaker.execute(|| async { Ok::<_, String>("never") }).await;
        assert!(rejected.unwrap_err().is_guard());
        assert_eq!(breaker.metrics().total_calls, 2);
    }

    #[test]
    fn test_config_validation() {
        assert!(CircuitBreakerConfig::builder().failure_threshold(0).build().is_err());
        assert!(CircuitBreakerConfig::default().validate().is_ok());
    }
}
