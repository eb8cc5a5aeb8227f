//! Expiring LRU caches for downstream results
//!
//! - [`LruCache`]: bounded cache with per-entry expiry
//! - [`CacheManager`]: named caches per result category
//! - [`Cached`]: read-through policy keyed by operation and arguments

pub mod cached;
pub mod config;
pub mod lru;
pub mod manager;
pub mod stats;

pub use cached::{cache_key, Cached, MAX_KEY_LEN};
pub use config::{CacheConfig, CacheManagerConfig, EMBEDDINGS, INFERENCE, SEARCH};
pub use lru::{CacheEntry, LruCache};
pub use manager::{CacheManager, CacheValue, CategoryCache, CleanupHandle};
pub use stats::CacheStats;
