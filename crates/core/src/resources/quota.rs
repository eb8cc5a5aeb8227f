//! Per-client quotas
//!
//! Usage is tracked per `(client_id, resource_type)` and resets once more
//! than `reset_interval` has passed since the record's window started. Pairs
//! without a configured limit are unlimited, but their usage is still counted.
//!
//! Records of limited pairs are kept for as long as the limit exists. Only
//! unlimited pairs live in the bounded LRU, so tracking them never drops an
//! open quota window.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use floodgate_common::{duration_millis, Clock, ConfigError, ConfigResult, SystemClock};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{GuardError, GuardResult};

/// Quota settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Length of a usage window
    #[serde(rename = "reset_interval_ms", with = "duration_millis")]
    pub reset_interval: Duration,
    /// Upper bound on usage records held at once
    pub max_tracked_records: usize,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self { reset_interval: Duration::from_secs(3600), max_tracked_records: 100_000 }
    }
}

impl QuotaConfig {
    /// Create a config with the given window length
    pub fn new(reset_interval: Duration) -> Self {
        Self { reset_interval, ..Self::default() }
    }

    /// Set the usage map bound
    pub fn with_max_tracked_records(mut self, max: usize) -> Self {
        self.max_tracked_records = max;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.reset_interval.is_zero() {
            return Err(ConfigError::invalid("reset_interval_ms", "must be greater than 0"));
        }
        if self.max_tracked_records == 0 {
            return Err(ConfigError::invalid("max_tracked_records", "must be greater than 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QuotaKey {
    client_id: String,
    resource_type: String,
}

impl QuotaKey {
    fn new(client_id: &str, resource_type: &str) -> Self {
        Self { client_id: client_id.to_string(), resource_type: resource_type.to_string() }
    }
}

#[derive(Debug, Clone, Copy)]
struct UsageRecord {
    used: u64,
    window_start: Instant,
}

impl UsageRecord {
    /// Start a new window if the current one has run out
    fn roll(&mut self, now: Instant, interval: Duration) {
        if now.saturating_duration_since(self.window_start) > interval {
            self.used = 0;
            self.window_start = now;
        }
    }
}

/// Usage records split by whether the pair has a limit
struct UsageTables {
    limited: HashMap<QuotaKey, UsageRecord>,
    unlimited: lru::LruCache<QuotaKey, UsageRecord>,
}

impl UsageTables {
    fn get_mut(&mut self, key: &QuotaKey) -> Option<&mut UsageRecord> {
        match self.limited.get_mut(key) {
            Some(record) => Some(record),
            None => self.unlimited.get_mut(key),
        }
    }

    fn remove(&mut self, key: &QuotaKey) -> Option<UsageRecord> {
        self.limited.remove(key).or_else(|| self.unlimited.pop(key))
    }

    fn len(&self) -> usize {
        self.limited.len() + self.unlimited.len()
    }
}

/// Per-client, per-resource usage against periodically resetting limits
pub struct QuotaManager<C: Clock = SystemClock> {
    config: QuotaConfig,
    limits: RwLock<HashMap<QuotaKey, u64>>,
    usage: Mutex<UsageTables>,
    clock: Arc<C>,
}

impl<C: Clock> std::fmt::Debug for QuotaManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaManager")
            .field("config", &self.config)
            .field("limits", &self.limits.read().len())
            .field("tracked_records", &self.usage.lock().len())
            .finish()
    }
}

impl QuotaManager<SystemClock> {
    /// Create a manager on the system clock
    pub fn new(config: QuotaConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> QuotaManager<C> {
    /// Create a manager with a custom clock
    pub fn with_clock(config: QuotaConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        let cap = NonZeroUsize::new(config.max_tracked_records).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            config,
            limits: RwLock::new(HashMap::new()),
            usage: Mutex::new(UsageTables {
                limited: HashMap::new(),
                unlimited: lru::LruCache::new(cap),
            }),
            clock: Arc::new(clock),
        })
    }

    /// Set the allowance for one client and resource type
    pub fn set_quota(&self, client_id: &str, resource_type: &str, limit: u64) {
        let key = QuotaKey::new(client_id, resource_type);
        let mut limits = self.limits.write();
        limits.insert(key.clone(), limit);

        let mut usage = self.usage.lock();
        if let Some(record) = usage.unlimited.pop(&key) {
            usage.limited.insert(key, record);
        }
        debug!(client_id, resource_type, limit, "quota_set");
    }

    /// Remove an allowance, making the pair unlimited
    pub fn remove_quota(&self, client_id: &str, resource_type: &str) -> bool {
        let key = QuotaKey::new(client_id, resource_type);
        let mut limits = self.limits.write();
        let removed = limits.remove(&key).is_some();

        let mut usage = self.usage.lock();
        if let Some(record) = usage.limited.remove(&key) {
            usage.unlimited.push(key, record);
        }
        removed
    }

    /// Record `amount` units of use, or reject without recording any
    pub fn consume(&self, client_id: &str, resource_type: &str, amount: u64) -> GuardResult<()> {
        let key = QuotaKey::new(client_id, resource_type);
        // Held until the record lands so `set_quota` cannot move it mid-update.
        let limits = self.limits.read();
        let limit = limits.get(&key).copied();
        let now = self.clock.now();
        let interval = self.config.reset_interval;

        let mut usage = self.usage.lock();
        let used = match usage.get_mut(&key) {
            Some(record) => {
                record.roll(now, interval);
                record.used
            }
            None => 0,
        };

        if let Some(limit) = limit {
            if used.saturating_add(amount) > limit {
                warn!(client_id, resource_type, used, amount, limit, "quota_exceeded");
                return Err(GuardError::resource_exhausted(
                    format!("quota_{resource_type}"),
                    used as f64,
                    limit as f64,
                ));
            }
        }

        let fresh = UsageRecord { used: amount, window_start: now };
        match usage.get_mut(&key) {
            Some(record) => record.used = record.used.saturating_add(amount),
            None if limit.is_some() => {
                usage.limited.insert(key, fresh);
            }
            None => {
                if let Some((evicted, _)) = usage.unlimited.push(key, fresh) {
                    debug!(
                        client_id = %evicted.client_id,
                        resource_type = %evicted.resource_type,
                        "quota_record_evicted"
                    );
                }
            }
        }
        Ok(())
    }

    fn current_usage(&self, key: &QuotaKey) -> u64 {
        let now = self.clock.now();
        let mut usage = self.usage.lock();
        match usage.get_mut(key) {
            Some(record) => {
                record.roll(now, self.config.reset_interval);
                record.used
            }
            None => 0,
        }
    }

    /// Units used in the current window
    pub fn get_usage(&self, client_id: &str, resource_type: &str) -> u64 {
        self.current_usage(&QuotaKey::new(client_id, resource_type))
    }

    /// Units left in the current window, `None` if the pair is unlimited
    pub fn get_remaining(&self, client_id: &str, resource_type: &str) -> Option<u64> {
        let key = QuotaKey::new(client_id, resource_type);
        let limit = self.limits.read().get(&key).copied()?;
        Some(limit.saturating_sub(self.current_usage(&key)))
    }

    /// Forget all usage recorded for a client; returns the records dropped
    pub fn reset_usage(&self, client_id: &str) -> usize {
        let mut usage = self.usage.lock();
        let keys: Vec<QuotaKey> = usage
            .limited
            .keys()
            .chain(usage.unlimited.iter().map(|(k, _)| k))
            .filter(|k| k.client_id == client_id)
            .cloned()
            .collect();
        for key in &keys {
            usage.remove(key);
        }
        debug!(client_id, records = keys.len(), "quota_usage_reset");
        keys.len()
    }

    /// Number of usage records held
    pub fn tracked_records(&self) -> usize {
        self.usage.lock().len()
    }

    /// Active configuration
    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }
}
