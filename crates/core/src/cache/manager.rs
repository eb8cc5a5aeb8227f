//! Named result caches
//!
//! One [`LruCache`] per result category (inference, search, embeddings, ...),
//! each with its own size bound and default ttl. Values are type-erased so one
//! manager can hold results of different operations; typed reads that find a
//! value of another type count as a miss for the caller.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use floodgate_common::{Clock, ConfigResult, SystemClock};
use parking_lot::RwLock;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::{CacheConfig, CacheManagerConfig};
use super::lru::LruCache;
use super::stats::CacheStats;

/// Type-erased cached value
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// Cache of type-erased values keyed by string
pub type CategoryCache<C> = LruCache<String, CacheValue, C>;

/// Collection of per-category caches
pub struct CacheManager<C: Clock = SystemClock> {
    caches: RwLock<BTreeMap<String, Arc<CategoryCache<C>>>>,
    cleanup_interval: Duration,
    clock: Arc<C>,
}

impl<C: Clock> std::fmt::Debug for CacheManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("categories", &self.categories())
            .field("cleanup_interval", &self.cleanup_interval)
            .finish()
    }
}

impl CacheManager<SystemClock> {
    /// Create a manager on the system clock
    pub fn new(config: &CacheManagerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> CacheManager<C> {
    /// Create a manager with a custom clock
    pub fn with_clock(config: &CacheManagerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        let clock = Arc::new(clock);

        let mut caches = BTreeMap::new();
        for (name, cache_config) in &config.categories {
            let cache = LruCache::with_shared_clock(cache_config.clone(), Arc::clone(&clock))?;
            caches.insert(name.clone(), Arc::new(cache));
        }

        Ok(Self { caches: RwLock::new(caches), cleanup_interval: config.cleanup_interval, clock })
    }

    /// Add a category, replacing any existing cache of that name
    pub fn register(&self, name: &str, config: CacheConfig) -> ConfigResult<()> {
        let cache = LruCache::with_shared_clock(config, Arc::clone(&self.clock))?;
        let replaced = self.caches.write().insert(name.to_string(), Arc::new(cache)).is_some();
        debug!(category = name, replaced, "cache_category_registered");
        Ok(())
    }

    /// The cache for `category`
    pub fn cache(&self, category: &str) -> Option<Arc<CategoryCache<C>>> {
        self.caches.read().get(category).map(Arc::clone)
    }

    /// Registered category names, sorted
    pub fn categories(&self) -> Vec<String> {
        self.caches.read().keys().cloned().collect()
    }

    /// Typed lookup
    ///
    /// Unknown categories and values of a different type read as `None`. A
    /// value of a different type is counted as a miss.
    pub fn get<T>(&self, category: &str, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let cache = self.cache(category)?;
        let mut mismatched = false;
        let value = cache.get_if(&key.to_string(), |value| {
            mismatched = !value.is::<T>();
            !mismatched
        });
        if mismatched {
            warn!(category, key, "cache_value_type_mismatch");
        }
        value?.downcast_ref::<T>().cloned()
    }

    /// Store a value; returns `false` if the category is unknown
    pub fn set<T>(&self, category: &str, key: &str, value: T, ttl: Option<Duration>) -> bool
    where
        T: Send + Sync + 'static,
    {
        match self.cache(category) {
            Some(cache) => {
                cache.set(key.to_string(), Arc::new(value), ttl);
                true
            }
            None => {
                debug!(category, "cache_category_unknown");
                false
            }
        }
    }

    /// Remove one key from a category
    pub fn delete(&self, category: &str, key: &str) -> bool {
        self.cache(category).is_some_and(|cache| cache.delete(&key.to_string()))
    }

    /// Empty every cache
    pub fn clear_all(&self) {
        for cache in self.caches.read().values() {
            cache.clear();
        }
    }

    /// Sweep expired entries from every cache, returning the total removed
    pub fn cleanup_expired(&self) -> usize {
        let caches: Vec<_> = self.caches.read().values().map(Arc::clone).collect();
        caches.iter().map(|cache| cache.cleanup_expired()).sum()
    }

    /// Per-category counters
    pub fn stats(&self) -> BTreeMap<String, CacheStats> {
        self.caches
            .read()
            .iter()
            .map(|(name, cache)| (name.clone(), cache.get_stats()))
            .collect()
    }

    /// Counters summed across categories
    pub fn total_stats(&self) -> CacheStats {
        let stats = self.stats();
        CacheStats::combine(stats.values())
    }

    /// Configured sweep period
    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    /// Start a background task that sweeps expired entries every `interval`
    ///
    /// The task holds only a weak reference and ends once the manager is
    /// dropped. Fails if called outside a tokio runtime.
    pub fn spawn_cleanup(
        self: &Arc<Self>,
        interval: Duration,
    ) -> Result<CleanupHandle, tokio::runtime::TryCurrentError> {
        let runtime = tokio::runtime::Handle::try_current()?;
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let manager: Weak<Self> = Arc::downgrade(self);

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else { break };
                        let removed = manager.cleanup_expired();
                        if removed > 0 {
                            debug!(removed, "cache_cleanup_sweep");
                        }
                    }
                }
            }
            debug!("cache_cleanup_stopped");
        });

        info!(interval_ms = interval.as_millis() as u64, "cache_cleanup_started");
        Ok(CleanupHandle { stop: Some(stop_tx), task: Some(task) })
    }
}

/// Handle to the background sweep; dropping it aborts the task
#[derive(Debug)]
pub struct CleanupHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CleanupHandle {
    /// Stop the sweep and wait for the task to finish
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "cache_cleanup_task_failed");
            }
        }
    }

    /// Whether the sweep task has ended
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use floodgate_common::MockClock;

    use super::*;
    use crate::cache::config::{EMBEDDINGS, INFERENCE, SEARCH};

    fn manager() -> (CacheManager<MockClock>, MockClock) {
        let clock = MockClock::new();
        let manager = CacheManager::with_clock(&CacheManagerConfig::default(), clock.clone())
            .expect("valid config");
        (manager, clock)
    }

    #[test]
    fn test_default_categories_exist() {
        let (manager, _clock) = manager();
        assert_eq!(manager.categories(), vec![EMBEDDINGS, INFERENCE, SEARCH]);
    }

    #[test]
    fn test_typed_roundtrip() {
        let (manager, _clock) = manager();
        assert!(manager.set(SEARCH, "q:rust", vec!["doc1".to_string()], None));
        assert_eq!(manager.get::<Vec<String>>(SEARCH, "q:rust"), Some(vec!["doc1".to_string()]));
        assert_eq!(manager.get::<Vec<String>>(INFERENCE, "q:rust"), None);
    }

    #[test]
    fn test_type_mismatch_reads_as_none() {
        let (manager, _clock) = manager();
        manager.set(INFERENCE, "k", 42_u32, None);
        assert_eq!(manager.get::<String>(INFERENCE, "k"), None);
        assert_eq!(manager.get::<u32>(INFERENCE, "k"), Some(42));

        let stats = manager.stats();
        let inference = &stats[INFERENCE];
        assert_eq!((inference.hits, inference.misses), (1, 1), "mismatch counted as a miss");
        let entry = manager.cache(INFERENCE).and_then(|c| c.peek_entry(&"k".to_string()));
        assert_eq!(entry.map(|e| e.hit_count), Some(1));
    }

    #[test]
    fn test_unknown_category() {
        let (manager, _clock) = manager();
        assert!(!manager.set("nope", "k", 1_u8, None));
        assert_eq!(manager.get::<u8>("nope", "k"), None);
        assert!(!manager.delete("nope", "k"));
    }

    #[test]
    fn test_categories_have_independent_ttls() {
        let clock = MockClock::new();
        let config = CacheManagerConfig::empty()
            .with_category("fast", CacheConfig::new(10, Duration::from_secs(1)))
            .with_category("slow", CacheConfig::new(10, Duration::from_secs(100)));
        let manager = CacheManager::with_clock(&config, clock.clone()).expect("valid config");

        manager.set("fast", "k", 1_u8, None);
        manager.set("slow", "k", 2_u8, None);
        clock.advance(Duration::from_secs(2));

        assert_eq!(manager.cleanup_expired(), 1);
        assert_eq!(manager.get::<u8>("slow", "k"), Some(2));
    }

    #[test]
    fn test_register_replaces_category() {
        let (manager, _clock) = manager();
        manager.set(SEARCH, "k", 1_u8, None);
        manager.register(SEARCH, CacheConfig::new(5, Duration::from_secs(5))).expect("valid");

        assert_eq!(manager.get::<u8>(SEARCH, "k"), None);
        assert_eq!(manager.stats()[SEARCH].max_size, 5);
        assert!(manager.register("bad", CacheConfig::new(0, Duration::from_secs(1))).is_err());
    }

    #[test]
    fn test_total_stats() {
        let (manager, _clock) = manager();
        manager.set(SEARCH, "a", 1_u8, None);
        manager.set(EMBEDDINGS, "b", 2_u8, None);
        manager.get::<u8>(SEARCH, "a");
        manager.get::<u8>(EMBEDDINGS, "missing");

        let total = manager.total_stats();
        assert_eq!(total.size, 2);
        assert_eq!(total.hits, 1);
        assert_eq!(total.misses, 1);

        manager.clear_all();
        assert_eq!(manager.total_stats().size, 0);
    }
}
