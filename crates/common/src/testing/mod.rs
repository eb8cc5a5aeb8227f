//! Testing utilities and helpers
//!
//! - **[`assertions`]**: assertion macros and float/duration helpers
//! - **[`async_utils`]**: async polling and timeout helpers
//! - **[`operations`]**: scripted operations for exercising retry and
//!   breaker policies
//!
//! ## Usage
//!
//! ```rust
//! use floodgate_common::testing::ScriptedOperation;
//!
//! // Fails twice, then succeeds.
//! let op = ScriptedOperation::failing_times(2);
//! assert!(op.call().is_err());
//! assert!(op.call().is_err());
//! assert_eq!(op.call(), Ok(3));
//! assert_eq!(op.calls(), 3);
//! ```

pub mod assertions;
pub mod async_utils;
pub mod operations;

pub use crate::clock::{Clock, MockClock, SystemClock, TokioClock};
pub use assertions::{assert_approx_eq, assert_duration_in_range};
pub use async_utils::{poll_until, timeout_ok};
pub use operations::{CallCounter, ScriptedError, ScriptedOperation};
