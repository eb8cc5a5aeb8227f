//! Admission control façade
//!
//! [`AdmissionControl`] owns one instance of every manager and a registry of
//! named circuit breakers. It is constructed explicitly and shared with
//! request handlers, typically behind an `Arc`.
//!
//! Admission runs rate limit, then request slot, then quota. The first failing
//! check rejects the request; a slot claimed before a quota rejection is
//! released immediately. A rate token taken before a later rejection is not
//! refunded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use floodgate_common::{Clock, ConfigResult, SystemClock};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheManager, Cached, CleanupHandle};
use crate::config::FloodgateConfig;
use crate::error::{GuardError, GuardResult};
use crate::rate_limit::RateLimiter;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, Retry};
use crate::resources::{QuotaManager, ResourceManager, SlotGuard};

/// Owner of all admission and resilience state for one service
pub struct AdmissionControl<C: Clock + Clone = SystemClock> {
    config: FloodgateConfig,
    rate_limiter: Arc<RateLimiter<C>>,
    resources: Arc<ResourceManager<C>>,
    quotas: Arc<QuotaManager<C>>,
    cache: Arc<CacheManager<C>>,
    breakers: DashMap<String, Arc<CircuitBreaker<C>>>,
    cleanup: Mutex<Option<CleanupHandle>>,
    clock: Arc<C>,
}

impl<C: Clock + Clone> std::fmt::Debug for AdmissionControl<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionControl")
            .field("tracked_clients", &self.rate_limiter.tracked_clients())
            .field("active_requests", &self.resources.stats().active_requests)
            .field("breakers", &self.breakers.len())
            .finish_non_exhaustive()
    }
}

impl AdmissionControl<SystemClock> {
    /// Build every component from `config` on the system clock
    pub fn new(config: FloodgateConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock + Clone> AdmissionControl<C> {
    /// Build every component from `config`, all sharing `clock`
    pub fn with_clock(config: FloodgateConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;

        let rate_limiter = RateLimiter::with_clock(config.rate_limit.clone(), clock.clone())?;
        let resources = ResourceManager::with_clock(config.resources.clone(), clock.clone())?;
        let quotas = QuotaManager::with_clock(config.quota.clone(), clock.clone())?;
        let cache = CacheManager::with_clock(&config.cache, clock.clone())?;

        info!(
            default_rate = config.rate_limit.default_rate,
            default_burst = config.rate_limit.default_burst,
            max_concurrent_requests = config.resources.max_concurrent_requests,
            cache_categories = config.cache.categories.len(),
            "admission_control_created"
        );

        Ok(Self {
            config,
            rate_limiter: Arc::new(rate_limiter),
            resources: Arc::new(resources),
            quotas: Arc::new(quotas),
            cache: Arc::new(cache),
            breakers: DashMap::new(),
            cleanup: Mutex::new(None),
            clock: Arc::new(clock),
        })
    }

    /// Run the admission checks for one unit of work
    ///
    /// The returned permit holds the request slot until it is dropped.
    #[instrument(skip(self))]
    pub fn admit(
        &self,
        client_id: &str,
        request_id: &str,
        resource_type: &str,
    ) -> GuardResult<AdmissionPermit<C>> {
        self.rate_limiter.check_rate_limit(client_id, 1)?;
        let slot = self.resources.acquire(request_id)?;
        if let Err(err) = self.quotas.consume(client_id, resource_type, 1) {
            debug!(kind = err.kind(), "admission_rejected_after_slot");
            return Err(err);
        }

        debug!("admission_granted");
        Ok(AdmissionPermit {
            slot,
            client_id: client_id.to_string(),
            resource_type: resource_type.to_string(),
            admitted_at: self.clock.now(),
            clock: Arc::clone(&self.clock),
        })
    }

    /// Breaker protecting `name`, created with the default breaker config on
    /// first use
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker<C>> {
        if let Some(existing) = self.breakers.get(name) {
            return Arc::clone(existing.value());
        }
        let entry = self.breakers.entry(name.to_string()).or_insert_with(|| {
            debug!(breaker = name, "circuit_breaker_registered");
            Arc::new(CircuitBreaker::from_validated(
                name,
                self.config.circuit_breaker.clone(),
                Arc::clone(&self.clock),
            ))
        });
        Arc::clone(entry.value())
    }

    /// Register `name` with its own breaker config, replacing any existing
    /// breaker of that name
    pub fn register_breaker(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
    ) -> ConfigResult<Arc<CircuitBreaker<C>>> {
        let breaker =
            Arc::new(CircuitBreaker::with_shared_clock(name, config, Arc::clone(&self.clock))?);
        if self.breakers.insert(name.to_string(), Arc::clone(&breaker)).is_some() {
            warn!(breaker = name, "circuit_breaker_replaced");
        }
        Ok(breaker)
    }

    /// Names of all registered breakers, sorted
    pub fn breaker_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Retry policy built from the configured defaults
    pub fn retry_policy<E>(&self) -> ConfigResult<Retry<E>> {
        Retry::new(self.config.retry.clone())
    }

    /// Read-through cache policy for `category`
    pub fn cached(&self, category: &str) -> Cached<C> {
        Cached::new(Arc::clone(&self.cache), category)
    }

    /// Rate limiter
    pub fn rate_limiter(&self) -> &Arc<RateLimiter<C>> {
        &self.rate_limiter
    }

    /// Request slot manager
    pub fn resources(&self) -> &Arc<ResourceManager<C>> {
        &self.resources
    }

    /// Quota manager
    pub fn quotas(&self) -> &Arc<QuotaManager<C>> {
        &self.quotas
    }

    /// Result caches
    pub fn cache(&self) -> &Arc<CacheManager<C>> {
        &self.cache
    }

    /// Active configuration
    pub fn config(&self) -> &FloodgateConfig {
        &self.config
    }

    /// Start the background cache sweep at the configured interval
    ///
    /// Starting again replaces (and aborts) the previous sweep. Fails outside
    /// a tokio runtime.
    pub fn start_cache_cleanup(&self) -> Result<(), tokio::runtime::TryCurrentError> {
        let handle = self.cache.spawn_cleanup(self.config.cache.cleanup_interval)?;
        *self.cleanup.lock() = Some(handle);
        Ok(())
    }

    /// Whether a background cache sweep is running
    pub fn cache_cleanup_running(&self) -> bool {
        self.cleanup.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stop background work
    ///
    /// Admission keeps working afterwards; only the cache sweep stops.
    pub async fn shutdown(&self) {
        let handle = self.cleanup.lock().take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
        info!("admission_control_shutdown");
    }
}

/// Proof of admission for one request
///
/// Holds the request slot; dropping the permit releases it on every exit
/// path.
#[must_use = "the request slot is released as soon as the permit is dropped"]
pub struct AdmissionPermit<C: Clock = SystemClock> {
    slot: SlotGuard<C>,
    client_id: String,
    resource_type: String,
    admitted_at: Instant,
    clock: Arc<C>,
}

impl<C: Clock> AdmissionPermit<C> {
    /// Admitted request id
    pub fn request_id(&self) -> &str {
        self.slot.request_id()
    }

    /// Client the request was admitted for
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Resource type charged against the client's quota
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Time since admission
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.admitted_at)
    }

    /// Fail once the request has exceeded the configured duration limit
    pub fn check_duration(&self) -> Result<(), GuardError> {
        self.slot.check_duration()
    }
}

impl<C: Clock> std::fmt::Debug for AdmissionPermit<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionPermit")
            .field("request_id", &self.request_id())
            .field("client_id", &self.client_id)
            .field("resource_type", &self.resource_type)
            .finish()
    }
}
