//! Aggregate configuration
//!
//! [`FloodgateConfig`] bundles every component's settings so a host can embed
//! one `[floodgate]` table in its own settings file. Values are layered:
//!
//! 1. Built-in defaults
//! 2. A TOML fragment via [`FloodgateConfig::from_toml_str`]
//! 3. Environment overrides via [`FloodgateConfig::apply_env`]
//!
//! ## Environment Variables
//! - `FLOODGATE_DEFAULT_RATE`: requests per minute for unconfigured clients
//! - `FLOODGATE_DEFAULT_BURST`: bucket capacity for unconfigured clients
//! - `FLOODGATE_MAX_CONCURRENT_REQUESTS`: in-flight request slots
//! - `FLOODGATE_MAX_REQUEST_DURATION_MS`: per-request duration limit
//! - `FLOODGATE_FAILURE_THRESHOLD`: failures that open a breaker
//! - `FLOODGATE_RECOVERY_TIMEOUT_MS`: breaker cooldown

use std::str::FromStr;
use std::time::Duration;

use floodgate_common::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::CacheManagerConfig;
use crate::rate_limit::RateLimitConfig;
use crate::resilience::{CircuitBreakerConfig, RetryConfig};
use crate::resources::{QuotaConfig, ResourceConfig};

/// Settings for every admission and resilience component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloodgateConfig {
    /// Per-client token buckets
    pub rate_limit: RateLimitConfig,
    /// In-flight request slots
    pub resources: ResourceConfig,
    /// Per-client quotas
    pub quota: QuotaConfig,
    /// Defaults for breakers created by name
    pub circuit_breaker: CircuitBreakerConfig,
    /// Default retry policy
    pub retry: RetryConfig,
    /// Result caches
    pub cache: CacheManagerConfig,
}

impl FloodgateConfig {
    /// Parse a TOML fragment; missing sections and keys keep their defaults
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|err| ConfigError::parse("toml", err.to_string()))?;
        config.validate()?;
        debug!("floodgate_config_parsed");
        Ok(config)
    }

    /// Overlay `FLOODGATE_*` variables from the process environment
    pub fn apply_env(self) -> ConfigResult<Self> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Overlay `FLOODGATE_*` variables read through `lookup`
    pub fn apply_env_from<L>(mut self, lookup: L) -> ConfigResult<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut applied = 0usize;
        let mut overlay = |name: &str| -> Option<String> {
            let value = lookup(name)?;
            applied += 1;
            Some(value)
        };

        if let Some(rate) = parse_var(&mut overlay, "FLOODGATE_DEFAULT_RATE")? {
            self.rate_limit.default_rate = rate;
        }
        if let Some(burst) = parse_var(&mut overlay, "FLOODGATE_DEFAULT_BURST")? {
            self.rate_limit.default_burst = burst;
        }
        if let Some(max) = parse_var(&mut overlay, "FLOODGATE_MAX_CONCURRENT_REQUESTS")? {
            self.resources.max_concurrent_requests = max;
        }
        if let Some(ms) = parse_var(&mut overlay, "FLOODGATE_MAX_REQUEST_DURATION_MS")? {
            self.resources.max_request_duration = Duration::from_millis(ms);
        }
        if let Some(threshold) = parse_var(&mut overlay, "FLOODGATE_FAILURE_THRESHOLD")? {
            self.circuit_breaker.failure_threshold = threshold;
        }
        if let Some(ms) = parse_var(&mut overlay, "FLOODGATE_RECOVERY_TIMEOUT_MS")? {
            self.circuit_breaker.recovery_timeout = Duration::from_millis(ms);
        }

        self.validate()?;
        if applied > 0 {
            info!(overrides = applied, "floodgate_config_env_applied");
        }
        Ok(self)
    }

    /// Validate every section
    pub fn validate(&self) -> ConfigResult<()> {
        self.rate_limit.validate()?;
        self.resources.validate()?;
        self.quota.validate()?;
        self.circuit_breaker.validate()?;
        self.retry.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

fn parse_var<T, L>(lookup: &mut L, name: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    L: FnMut(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    raw.trim().parse().map(Some).map_err(|_| ConfigError::environment(name, raw))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::cache::{INFERENCE, SEARCH};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = FloodgateConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rate_limit.default_rate, 60);
        assert_eq!(config.rate_limit.default_burst, 10);
        assert_eq!(config.resources.max_concurrent_requests, 100);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = FloodgateConfig::from_toml_str("").expect("empty document parses");
        assert_eq!(config, FloodgateConfig::default());
    }

    #[test]
    fn test_toml_overrides_selected_keys() {
        let config = FloodgateConfig::from_toml_str(
            r#"
            [rate_limit]
            default_rate = 120

            [resources]
            max_request_duration_ms = 5000

            [retry]
            delay_ms = 250
            max_delay_ms = 2000

            [cache]
            cleanup_interval_ms = 1000

            [cache.categories.search]
            max_size = 5
            default_ttl_ms = 10
            "#,
        )
        .expect("valid document");

        assert_eq!(config.rate_limit.default_rate, 120);
        assert_eq!(config.rate_limit.default_burst, 10);
        assert_eq!(config.resources.max_request_duration, Duration::from_secs(5));
        assert_eq!(config.retry.delay, Duration::from_millis(250));
        assert_eq!(config.retry.max_delay, Some(Duration::from_secs(2)));
        assert_eq!(config.cache.cleanup_interval, Duration::from_secs(1));
        assert_eq!(config.cache.categories[SEARCH].max_size, 5);
        // An explicit categories table replaces the default set.
        assert!(!config.cache.categories.contains_key(INFERENCE));
    }

    #[test]
    fn test_toml_syntax_error() {
        let err = FloodgateConfig::from_toml_str("[rate_limit").expect_err("malformed");
        assert!(matches!(err, ConfigError::Parse { ref format, .. } if format == "toml"));
    }

    #[test]
    fn test_toml_invalid_value_rejected() {
        let err = FloodgateConfig::from_toml_str("[rate_limit]\ndefault_burst = 0")
            .expect_err("zero burst");
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_env_overlay() {
        let config = FloodgateConfig::default()
            .apply_env_from(env(&[
                ("FLOODGATE_DEFAULT_RATE", "600"),
                ("FLOODGATE_DEFAULT_BURST", " 50 "),
                ("FLOODGATE_MAX_CONCURRENT_REQUESTS", "8"),
                ("FLOODGATE_MAX_REQUEST_DURATION_MS", "1500"),
                ("FLOODGATE_FAILURE_THRESHOLD", "2"),
                ("FLOODGATE_RECOVERY_TIMEOUT_MS", "30000"),
            ]))
            .expect("valid overrides");

        assert_eq!(config.rate_limit.default_rate, 600);
        assert_eq!(config.rate_limit.default_burst, 50);
        assert_eq!(config.resources.max_concurrent_requests, 8);
        assert_eq!(config.resources.max_request_duration, Duration::from_millis(1500));
        assert_eq!(config.circuit_breaker.failure_threshold, 2);
        assert_eq!(config.circuit_breaker.recovery_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_env_overlay_without_variables_is_identity() {
        let config = FloodgateConfig::default().apply_env_from(env(&[])).expect("no overrides");
        assert_eq!(config, FloodgateConfig::default());
    }

    #[test]
    fn test_env_unparseable_value() {
        let err = FloodgateConfig::default()
            .apply_env_from(env(&[("FLOODGATE_DEFAULT_RATE", "fast")]))
            .expect_err("not a number");
        assert_eq!(err, ConfigError::environment("FLOODGATE_DEFAULT_RATE", "fast"));
    }

    #[test]
    fn test_env_value_failing_validation() {
        let err = FloodgateConfig::default()
            .apply_env_from(env(&[("FLOODGATE_MAX_CONCURRENT_REQUESTS", "0")]))
            .expect_err("zero slots");
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
