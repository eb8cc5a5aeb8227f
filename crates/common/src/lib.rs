//! Shared building blocks for the Floodgate crates.
//!
//! # Feature Tiers
//!
//! - `foundation`: clock abstraction, error classification, serde helpers
//! - `observability`: tracing subscriber setup
//! - `runtime`: everything above plus tokio-backed test helpers
//! - `test-utils`: exposes [`testing`] to downstream dev-dependencies

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod clock;
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod utils;

// Observability tier
// --------------------------------------------------------------
#[cfg(feature = "observability")]
pub mod observability;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "runtime", feature = "test-utils", test))]
pub mod testing;

#[cfg(feature = "foundation")]
pub use clock::{Clock, MockClock, SystemClock};
#[cfg(feature = "runtime")]
pub use clock::TokioClock;
#[cfg(feature = "foundation")]
pub use error::{ConfigError, ConfigResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "observability")]
pub use observability::{init_tracing, LogFormat, TracingConfig};
#[cfg(feature = "foundation")]
pub use utils::{duration_millis, option_duration_millis};
