//! Concurrent request slots
//!
//! Tracks which requests are in flight and since when. Acquisition is a single
//! check-and-insert under one lock, so the slot count never exceeds
//! `max_concurrent_requests`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use floodgate_common::{duration_millis, Clock, ConfigError, ConfigResult, SystemClock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{GuardError, GuardResult};

/// Slot limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Requests allowed in flight at once
    pub max_concurrent_requests: usize,
    /// Longest a request may run before duration checks fail
    #[serde(rename = "max_request_duration_ms", with = "duration_millis")]
    pub max_request_duration: Duration,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self { max_concurrent_requests: 100, max_request_duration: Duration::from_secs(300) }
    }
}

impl ResourceConfig {
    /// Create a config with the given limits
    pub fn new(max_concurrent_requests: usize, max_request_duration: Duration) -> Self {
        Self { max_concurrent_requests, max_request_duration }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::invalid("max_concurrent_requests", "must be greater than 0"));
        }
        if self.max_request_duration.is_zero() {
            return Err(ConfigError::invalid("max_request_duration_ms", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Slot usage snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceStats {
    /// Requests currently holding a slot
    pub active_requests: usize,
    /// Configured slot count
    pub max_concurrent_requests: usize,
    /// `active / max * 100`
    pub utilization: f64,
}

/// In-flight request tracker
pub struct ResourceManager<C: Clock = SystemClock> {
    config: ResourceConfig,
    active: Mutex<HashMap<String, Instant>>,
    clock: Arc<C>,
}

impl<C: Clock> std::fmt::Debug for ResourceManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("config", &self.config)
            .field("active_requests", &self.active.lock().len())
            .finish()
    }
}

impl ResourceManager<SystemClock> {
    /// Create a manager on the system clock
    pub fn new(config: ResourceConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> ResourceManager<C> {
    /// Create a manager with a custom clock
    pub fn with_clock(config: ResourceConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { config, active: Mutex::new(HashMap::new()), clock: Arc::new(clock) })
    }

    /// Claim a slot for `request_id`
    ///
    /// An id that already holds a slot is rejected with
    /// [`GuardError::DuplicateRequest`]. A rejection leaves the slot table
    /// untouched.
    pub fn acquire_request_slot(&self, request_id: &str) -> GuardResult<()> {
        let mut active = self.active.lock();
        if active.contains_key(request_id) {
            warn!(request_id, "request_slot_duplicate");
            return Err(GuardError::DuplicateRequest { request_id: request_id.to_string() });
        }

        let limit = self.config.max_concurrent_requests;
        if active.len() >= limit {
            warn!(request_id, current = active.len(), limit, "request_slot_rejected");
            return Err(GuardError::resource_exhausted(
                "concurrent_requests",
                active.len() as f64,
                limit as f64,
            ));
        }

        active.insert(request_id.to_string(), self.clock.now());
        debug!(request_id, active = active.len(), "request_slot_acquired");
        Ok(())
    }

    /// Release the slot held by `request_id`; releasing twice is a no-op
    pub fn release_request_slot(&self, request_id: &str) -> bool {
        let released = self.active.lock().remove(request_id).is_some();
        if released {
            debug!(request_id, "request_slot_released");
        }
        released
    }

    /// Fail if `request_id` has run longer than the configured maximum
    ///
    /// Unknown ids pass. The error reports elapsed and limit in seconds.
    pub fn check_request_duration(&self, request_id: &str) -> GuardResult<()> {
        let Some(started) = self.active.lock().get(request_id).copied() else {
            return Ok(());
        };

        let elapsed = self.clock.now().saturating_duration_since(started);
        let limit = self.config.max_request_duration;
        if elapsed > limit {
            warn!(
                request_id,
                elapsed_ms = elapsed.as_millis() as u64,
                limit_ms = limit.as_millis() as u64,
                "request_duration_exceeded"
            );
            return Err(GuardError::resource_exhausted(
                "request_duration",
                elapsed.as_secs_f64(),
                limit.as_secs_f64(),
            ));
        }
        Ok(())
    }

    /// Claim a slot that is released when the returned guard drops
    pub fn acquire(self: &Arc<Self>, request_id: &str) -> GuardResult<SlotGuard<C>> {
        self.acquire_request_slot(request_id)?;
        Ok(SlotGuard { manager: Arc::clone(self), request_id: request_id.to_string() })
    }

    /// Current slot usage
    pub fn stats(&self) -> ResourceStats {
        let active_requests = self.active.lock().len();
        let max = self.config.max_concurrent_requests;
        ResourceStats {
            active_requests,
            max_concurrent_requests: max,
            utilization: active_requests as f64 / max as f64 * 100.0,
        }
    }

    /// In-flight requests with their elapsed time
    pub fn active_requests(&self) -> Vec<(String, Duration)> {
        let now = self.clock.now();
        self.active
            .lock()
            .iter()
            .map(|(id, started)| (id.clone(), now.saturating_duration_since(*started)))
            .collect()
    }

    /// Active configuration
    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }
}

/// Scoped request slot
///
/// Dropping the guard releases the slot, including on early return, panic
/// unwind, and cancellation of the future that owns it.
#[must_use = "the slot is released as soon as the guard is dropped"]
pub struct SlotGuard<C: Clock = SystemClock> {
    manager: Arc<ResourceManager<C>>,
    request_id: String,
}

impl<C: Clock> SlotGuard<C> {
    /// Id the slot was claimed for
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Check this request against the duration limit
    pub fn check_duration(&self) -> GuardResult<()> {
        self.manager.check_request_duration(&self.request_id)
    }
}

impl<C: Clock> std::fmt::Debug for SlotGuard<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotGuard").field("request_id", &self.request_id).finish()
    }
}

impl<C: Clock> Drop for SlotGuard<C> {
    fn drop(&mut self) {
        self.manager.release_request_slot(&self.request_id);
    }
}
