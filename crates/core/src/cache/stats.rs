//! Cache statistics

use serde::Serialize;

/// Counters for one cache
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Current number of entries
    pub size: usize,

    /// Entry bound
    pub max_size: usize,

    /// Lookups that returned a live entry
    pub hits: u64,

    /// Lookups that found nothing or an expired entry
    pub misses: u64,

    /// `hits / (hits + misses) * 100`, zero before any lookup
    pub hit_rate: f64,

    /// Entries dropped to make room for new keys
    pub evictions: u64,
}

impl CacheStats {
    pub(crate) fn new(
        size: usize,
        max_size: usize,
        hits: u64,
        misses: u64,
        evictions: u64,
    ) -> Self {
        let total = hits + misses;
        let hit_rate = if total == 0 { 0.0 } else { hits as f64 / total as f64 * 100.0 };
        Self { size, max_size, hits, misses, hit_rate, evictions }
    }

    /// Total lookups
    pub fn total_accesses(&self) -> u64 {
        self.hits + self.misses
    }

    /// Sum counters across caches, recomputing the hit rate
    pub fn combine<'a>(stats: impl IntoIterator<Item = &'a CacheStats>) -> Self {
        let mut total = Self::new(0, 0, 0, 0, 0);
        for s in stats {
            total.size += s.size;
            total.max_size += s.max_size;
            total.hits += s.hits;
            total.misses += s.misses;
            total.evictions += s.evictions;
        }
        Self::new(total.size, total.max_size, total.hits, total.misses, total.evictions)
    }
}
