//! Fallback on failure
//!
//! When the primary operation fails with a matching error, the fallback runs
//! with that error and its result is returned instead. Non-matching errors
//! propagate as they are.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

type Predicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Fallback policy for operations failing with `E`
pub struct Fallback<E> {
    should_fallback: Option<Predicate<E>>,
}

impl<E> Clone for Fallback<E> {
    fn clone(&self) -> Self {
        Self { should_fallback: self.should_fallback.clone() }
    }
}

impl<E> fmt::Debug for Fallback<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fallback").field("filtered", &self.should_fallback.is_some()).finish()
    }
}

impl<E> Default for Fallback<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Fallback<E> {
    /// Fall back on every error
    pub fn new() -> Self {
        Self { should_fallback: None }
    }

    /// Fall back only on errors matching `predicate`
    pub fn when<P>(predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self { should_fallback: Some(Arc::new(predicate)) }
    }

    fn matches(&self, err: &E) -> bool {
        let matched = self.should_fallback.as_ref().map_or(true, |predicate| predicate(err));
        if matched {
            warn!("primary_failed_using_fallback");
        } else {
            debug!("primary_error_not_handled_by_fallback");
        }
        matched
    }

    /// Run `primary`, and `fallback(err)` if it fails with a matching error
    pub async fn execute<T, P, PFut, F, FFut>(&self, primary: P, fallback: F) -> Result<T, E>
    where
        P: FnOnce() -> PFut,
        PFut: Future<Output = Result<T, E>>,
        F: FnOnce(E) -> FFut,
        FFut: Future<Output = Result<T, E>>,
    {
        match primary().await {
            Ok(value) => Ok(value),
            Err(err) if self.matches(&err) => fallback(err).await,
            Err(err) => Err(err),
        }
    }

    /// Blocking form of [`execute`](Self::execute)
    pub fn call<T, P, F>(&self, primary: P, fallback: F) -> Result<T, E>
    where
        P: FnOnce() -> Result<T, E>,
        F: FnOnce(E) -> Result<T, E>,
    {
        match primary() {
            Ok(value) => Ok(value),
            Err(err) if self.matches(&err) => fallback(err),
            Err(err) => Err(err),
        }
    }
}
