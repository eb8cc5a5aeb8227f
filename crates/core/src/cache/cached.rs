//! Read-through caching of operation results
//!
//! Keys are `"<operation>:<arguments as JSON>"`. Keys longer than
//! [`MAX_KEY_LEN`] bytes are replaced by `"<operation>:<blake3 hex of key>"`
//! so large argument payloads do not bloat the cache.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use floodgate_common::{Clock, SystemClock};
use serde::Serialize;
use tracing::{debug, warn};

use super::manager::CacheManager;

/// Longest key stored verbatim
pub const MAX_KEY_LEN: usize = 200;

/// Deterministic cache key for an operation and its arguments
pub fn cache_key<A>(operation: &str, args: &A) -> Result<String, serde_json::Error>
where
    A: Serialize + ?Sized,
{
    let key = format!("{operation}:{}", serde_json::to_string(args)?);
    if key.len() > MAX_KEY_LEN {
        return Ok(format!("{operation}:{}", blake3::hash(key.as_bytes()).to_hex()));
    }
    Ok(key)
}

/// Read-through cache policy bound to one category
///
/// Only successful results are stored. If the arguments cannot be serialized
/// or the category does not exist, the operation runs uncached.
pub struct Cached<C: Clock = SystemClock> {
    manager: Arc<CacheManager<C>>,
    category: String,
    ttl: Option<Duration>,
}

impl<C: Clock> std::fmt::Debug for Cached<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cached")
            .field("category", &self.category)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<C: Clock> Cached<C> {
    /// Policy storing into `category` with the category's default ttl
    pub fn new(manager: Arc<CacheManager<C>>, category: impl Into<String>) -> Self {
        Self { manager, category: category.into(), ttl: None }
    }

    /// Override the ttl for stored results
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn key_for<A: Serialize + ?Sized>(&self, operation: &str, args: &A) -> Option<String> {
        match cache_key(operation, args) {
            Ok(key) => Some(key),
            Err(err) => {
                warn!(operation, error = %err, "cache_key_serialization_failed");
                None
            }
        }
    }

    fn lookup<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let hit = self.manager.get::<T>(&self.category, key);
        debug!(category = %self.category, key, hit = hit.is_some(), "cache_lookup");
        hit
    }

    /// Return the cached result or run `operation` and store its success
    pub async fn execute<A, T, E, F, Fut>(&self, operation: &str, args: &A, f: F) -> Result<T, E>
    where
        A: Serialize + ?Sized,
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(key) = self.key_for(operation, args) else {
            return f().await;
        };
        if let Some(hit) = self.lookup::<T>(&key) {
            return Ok(hit);
        }

        let value = f().await?;
        self.manager.set(&self.category, &key, value.clone(), self.ttl);
        Ok(value)
    }

    /// Blocking form of [`execute`](Self::execute)
    pub fn call<A, T, E, F>(&self, operation: &str, args: &A, f: F) -> Result<T, E>
    where
        A: Serialize + ?Sized,
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Result<T, E>,
    {
        let Some(key) = self.key_for(operation, args) else {
            return f();
        };
        if let Some(hit) = self.lookup::<T>(&key) {
            return Ok(hit);
        }

        let value = f()?;
        self.manager.set(&self.category, &key, value.clone(), self.ttl);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use floodgate_common::testing::ScriptedOperation;
    use floodgate_common::MockClock;

    use super::*;
    use crate::cache::config::{CacheManagerConfig, INFERENCE};

    fn policy() -> (Cached<MockClock>, Arc<CacheManager<MockClock>>, MockClock) {
        let clock = MockClock::new();
        let manager = Arc::new(
            CacheManager::with_clock(&CacheManagerConfig::default(), clock.clone())
                .expect("valid config"),
        );
        (Cached::new(Arc::clone(&manager), INFERENCE), manager, clock)
    }

    #[test]
    fn test_short_keys_are_verbatim() {
        let key = cache_key("embed", &("hello", 3)).expect("serializable");
        assert_eq!(key, r#"embed:["hello",3]"#);
    }

    #[test]
    fn test_long_keys_are_hashed() {
        let prompt = "x".repeat(500);
        let key = cache_key("generate", &prompt).expect("serializable");

        assert!(key.starts_with("generate:"));
        assert_eq!(key.len(), "generate:".len() + 64);
        assert_eq!(key, cache_key("generate", &prompt).expect("serializable"));
        assert_ne!(key, cache_key("generate", &"y".repeat(500)).expect("serializable"));
    }

    #[test]
    fn test_key_at_limit_is_verbatim() {
        // "op:" plus a quoted string of 195 chars is exactly 200 bytes.
        let arg = "a".repeat(195);
        let key = cache_key("op", &arg).expect("serializable");
        assert_eq!(key.len(), MAX_KEY_LEN);
        assert!(key.contains(&arg));
    }

    #[test]
    fn test_unserializable_args_are_an_error() {
        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys are not valid JSON object keys");
        assert!(cache_key("op", &bad).is_err());
    }

    #[test]
    fn test_call_caches_success_only() {
        let (policy, _manager, _clock) = policy();
        let failing = ScriptedOperation::failing_times(1);

        let first = policy.call("op", &1, || failing.call());
        assert!(first.is_err());

        let second = policy.call("op", &1, || failing.call());
        assert_eq!(second, Ok(2));

        let third = policy.call("op", &1, || failing.call());
        assert_eq!(third, Ok(2), "served from cache");
        assert_eq!(failing.calls(), 2);
    }

    #[test]
    fn test_ttl_override_expires() {
        let (policy, _manager, clock) = policy();
        let policy = policy.with_ttl(Duration::from_secs(1));
        let op = ScriptedOperation::succeeding();

        assert_eq!(policy.call("op", "arg", || op.call()), Ok(1));
        clock.advance(Duration::from_secs(2));
        assert_eq!(policy.call("op", "arg", || op.call()), Ok(2));
    }

    #[tokio::test]
    async fn test_execute_reads_through() {
        let (policy, manager, _clock) = policy();
        let op = ScriptedOperation::succeeding();

        let a = policy.execute("op", &["x"], || async { op.call() }).await;
        let b = policy.execute("op", &["x"], || async { op.call() }).await;

        assert_eq!(a, Ok(1));
        assert_eq!(b, Ok(1));
        assert_eq!(op.calls(), 1);
        assert_eq!(manager.stats()[INFERENCE].hits, 1);
    }
}
