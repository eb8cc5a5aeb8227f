//! Cache configuration

use std::collections::BTreeMap;
use std::time::Duration;

use floodgate_common::{duration_millis, ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};

/// Category for model inference results
pub const INFERENCE: &str = "inference";
/// Category for search results
pub const SEARCH: &str = "search";
/// Category for embedding vectors
pub const EMBEDDINGS: &str = "embeddings";

/// Settings for one cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry bound
    pub max_size: usize,
    /// Time to live for entries stored without an explicit ttl
    #[serde(rename = "default_ttl_ms", with = "duration_millis")]
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_size: 1000, default_ttl: Duration::from_secs(3600) }
    }
}

impl CacheConfig {
    /// Create a config with the given bound and default ttl
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self { max_size, default_ttl }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_size == 0 {
            return Err(ConfigError::invalid("max_size", "must be greater than 0"));
        }
        if self.default_ttl.is_zero() {
            return Err(ConfigError::invalid("default_ttl_ms", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Settings for the cache manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheManagerConfig {
    /// Caches to create, by category name
    pub categories: BTreeMap<String, CacheConfig>,
    /// Period of the background expiry sweep
    #[serde(rename = "cleanup_interval_ms", with = "duration_millis")]
    pub cleanup_interval: Duration,
}

impl Default for CacheManagerConfig {
    fn default() -> Self {
        let categories = BTreeMap::from([
            (INFERENCE.to_string(), CacheConfig::new(1000, Duration::from_secs(3600))),
            (SEARCH.to_string(), CacheConfig::new(500, Duration::from_secs(1800))),
            (EMBEDDINGS.to_string(), CacheConfig::new(2000, Duration::from_secs(7200))),
        ]);
        Self { categories, cleanup_interval: Duration::from_secs(60) }
    }
}

impl CacheManagerConfig {
    /// A manager config with no categories
    pub fn empty() -> Self {
        Self { categories: BTreeMap::new(), ..Self::default() }
    }

    /// Add or replace a category
    pub fn with_category(mut self, name: impl Into<String>, config: CacheConfig) -> Self {
        self.categories.insert(name.into(), config);
        self
    }

    /// Validate every category and the sweep interval
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, config) in &self.categories {
            config.validate().map_err(|err| match err {
                ConfigError::Invalid { field, message } => {
                    ConfigError::invalid(format!("cache.categories.{name}.{field}"), message)
                }
                other => other,
            })?;
        }
        if self.cleanup_interval.is_zero() {
            return Err(ConfigError::invalid("cleanup_interval_ms", "must be greater than 0"));
        }
        Ok(())
    }
}
