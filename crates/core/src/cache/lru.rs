//! Expiring LRU cache
//!
//! Entries carry their own expiry. Reads treat an expired entry as a miss and
//! remove it; [`LruCache::cleanup_expired`] sweeps the rest. Inserting a new
//! key into a full cache evicts exactly one least recently used entry.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use floodgate_common::{Clock, ConfigResult, SystemClock};
use parking_lot::Mutex;
use tracing::trace;

use super::config::CacheConfig;
use super::stats::CacheStats;

/// A stored value and its bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Stored value
    pub value: V,
    /// When the value was stored
    pub created_at: Instant,
    /// After this instant the entry is a miss
    pub expires_at: Instant,
    /// Successful reads of this entry
    pub hit_count: u64,
    /// Last successful read, or `created_at`
    pub last_accessed: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, now: Instant, ttl: Duration) -> Self {
        let expires_at = now.checked_add(ttl).unwrap_or(now + Duration::from_secs(86_400 * 365));
        Self { value, created_at: now, expires_at, hit_count: 0, last_accessed: now }
    }

    /// Whether the entry has expired at `now`
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

struct Inner<K: Hash + Eq, V> {
    entries: lru::LruCache<K, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Thread-safe expiring LRU cache
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use floodgate_core::cache::{CacheConfig, LruCache};
///
/// # fn example() -> Result<(), floodgate_common::ConfigError> {
/// let cache = LruCache::new(CacheConfig::new(2, Duration::from_secs(60)))?;
/// cache.set("a", 1, None);
/// assert_eq!(cache.get(&"a"), Some(1));
/// # Ok(())
/// # }
/// ```
pub struct LruCache<K: Hash + Eq, V, C: Clock = SystemClock> {
    config: CacheConfig,
    inner: Mutex<Inner<K, V>>,
    clock: Arc<C>,
}

impl<K: Hash + Eq, V, C: Clock> std::fmt::Debug for LruCache<K, V, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("config", &self.config)
            .field("size", &self.inner.lock().entries.len())
            .finish()
    }
}

impl<K, V> LruCache<K, V, SystemClock>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a cache on the system clock
    pub fn new(config: CacheConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<K, V, C> LruCache<K, V, C>
where
    K: Hash + Eq + Clone,
    V: Clone,
    C: Clock,
{
    /// Create a cache with a custom clock
    pub fn with_clock(config: CacheConfig, clock: C) -> ConfigResult<Self> {
        Self::with_shared_clock(config, Arc::new(clock))
    }

    pub(crate) fn with_shared_clock(config: CacheConfig, clock: Arc<C>) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            inner: Mutex::new(Inner {
                entries: lru::LruCache::unbounded(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            clock,
        })
    }

    /// Look up a live entry, marking it most recently used
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_if(key, |_| true)
    }

    /// Look up `key`, counting a hit only if `accept` takes the value
    ///
    /// A rejected value stays cached but the lookup is recorded as a miss.
    pub fn get_if<F>(&self, key: &K, accept: F) -> Option<V>
    where
        F: FnOnce(&V) -> bool,
    {
        let now = self.clock.now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => {
                if accept(&entry.value) {
                    entry.hit_count += 1;
                    entry.last_accessed = now;
                    let value = entry.value.clone();
                    inner.hits += 1;
                    return Some(value);
                }
                false
            }
            None => false,
        };

        if expired {
            inner.entries.pop(key);
            trace!("cache_entry_expired_on_read");
        }
        inner.misses += 1;
        None
    }

    /// Insert or replace `key`
    ///
    /// `ttl` of `None` or zero uses the configured default.
    pub fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let ttl = ttl.filter(|ttl| !ttl.is_zero()).unwrap_or(self.config.default_ttl);
        let entry = CacheEntry::new(value, self.clock.now(), ttl);
        let mut inner = self.inner.lock();

        let is_new = !inner.entries.contains(&key);
        inner.entries.put(key, entry);

        if is_new
            && inner.entries.len() > self.config.max_size
            && inner.entries.pop_lru().is_some()
        {
            inner.evictions += 1;
            trace!("cache_entry_evicted");
        }
    }

    /// Remove `key`, returning whether it was present
    pub fn delete(&self, key: &K) -> bool {
        self.inner.lock().entries.pop(key).is_some()
    }

    /// Remove every entry; counters are kept
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Remove all expired entries, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let expired: Vec<K> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.entries.pop(key);
        }
        expired.len()
    }

    /// Bookkeeping for `key` without counting a lookup or changing LRU order
    pub fn peek_entry(&self, key: &K) -> Option<CacheEntry<V>> {
        self.inner.lock().entries.peek(key).cloned()
    }

    /// Current counters
    pub fn get_stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats::new(
            inner.entries.len(),
            self.config.max_size,
            inner.hits,
            inner.misses,
            inner.evictions,
        )
    }

    /// Number of entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Active configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use floodgate_common::MockClock;

    use super::*;

    type TestCache = LruCache<&'static str, u32, MockClock>;

    fn cache(max_size: usize, ttl_secs: u64) -> (TestCache, MockClock) {
        let clock = MockClock::new();
        let cache = LruCache::with_clock(
            CacheConfig::new(max_size, Duration::from_secs(ttl_secs)),
            clock.clone(),
        )
        .expect("valid config");
        (cache, clock)
    }

    #[test]
    fn test_evicts_exactly_the_lru_entry() {
        let (cache, _clock) = cache(3, 60);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("c", 3, None);

        // Touch "a" so "b" becomes least recently used.
        assert_eq!(cache.get(&"a"), Some(1));
        cache.set("d", 4, None);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), Some(3));
        assert_eq!(cache.get(&"d"), Some(4));
        assert_eq!(cache.get_stats().evictions, 1);
    }

    #[test]
    fn test_updating_existing_key_does_not_evict() {
        let (cache, _clock) = cache(2, 60);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("a", 10, None);

        assert_eq!(cache.get_stats().evictions, 0);
        assert_eq!(cache.get(&"a"), Some(10));
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn test_expired_read_misses_and_removes() {
        let (cache, clock) = cache(10, 60);
        cache.set("a", 1, Some(Duration::from_secs(5)));

        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.get(&"a"), Some(1), "still live at the expiry instant");

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_ttl_uses_default() {
        let (cache, clock) = cache(10, 60);
        cache.set("a", 1, Some(Duration::ZERO));

        clock.advance(Duration::from_secs(30));
        assert_eq!(cache.get(&"a"), Some(1));

        clock.advance(Duration::from_secs(31));
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn test_hit_rate() {
        let (cache, _clock) = cache(10, 60);
        cache.set("a", 1, None);

        cache.get(&"a");
        cache.get(&"a");
        cache.get(&"a");
        cache.get(&"missing");

        let stats = cache.get_stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_entry_bookkeeping() {
        let (cache, clock) = cache(10, 60);
        cache.set("a", 1, None);
        let created = cache.peek_entry(&"a").expect("present").created_at;

        clock.advance(Duration::from_secs(2));
        cache.get(&"a");
        cache.get(&"a");

        let entry = cache.peek_entry(&"a").expect("present");
        assert_eq!(entry.hit_count, 2);
        assert_eq!(entry.last_accessed.duration_since(created), Duration::from_secs(2));
        assert_eq!(entry.expires_at.duration_since(created), Duration::from_secs(60));
    }

    #[test]
    fn test_cleanup_expired() {
        let (cache, clock) = cache(10, 60);
        cache.set("short", 1, Some(Duration::from_secs(1)));
        cache.set("long", 2, None);

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.cleanup_expired(), 0);
    }

    #[test]
    fn test_delete_and_clear() {
        let (cache, _clock) = cache(10, 60);
        cache.set("a", 1, None);
        cache.set("b", 2, None);

        assert!(cache.delete(&"a"));
        assert!(!cache.delete(&"a"));
        cache.clear();
        assert!(cache.is_empty());
    }
}
