//! Custom assertions for testing

#![allow(clippy::missing_panics_doc)]

use std::time::Duration;

/// Assert that an error's display output contains a substring
///
/// ```
/// let result: Result<(), String> = Err("Rate limit exceeded: 10 requests per 60s".to_string());
/// floodgate_common::assert_error_contains!(result, "Rate limit");
/// ```
#[macro_export]
macro_rules! assert_error_contains {
    ($result:expr, $substring:expr) => {
        match &$result {
            Ok(_) => panic!("Expected error but got Ok"),
            Err(e) => {
                let error_msg = format!("{}", e);
                assert!(
                    error_msg.contains($substring),
                    "Error message '{}' does not contain '{}'",
                    error_msg,
                    $substring
                );
            }
        }
    };
}

/// Assert that a call counter saw exactly the expected number of attempts
#[macro_export]
macro_rules! assert_attempts {
    ($actual:expr, $expected:expr) => {
        assert_eq!($actual, $expected, "Expected {} attempts but got {}", $expected, $actual);
    };
}

/// Assert that two floats are approximately equal
///
/// Token counts are fractional, so bucket tests compare with a tolerance.
///
/// ```
/// use floodgate_common::testing::assert_approx_eq;
///
/// assert_approx_eq(4.999_999, 5.0, 0.001);
/// ```
pub fn assert_approx_eq(actual: f64, expected: f64, epsilon: f64) {
    let diff = (actual - expected).abs();
    assert!(
        diff < epsilon,
        "Values not approximately equal: {} vs {} (diff: {})",
        actual,
        expected,
        diff
    );
}

/// Assert that a duration is within `tolerance` of `expected`
///
/// ```
/// use std::time::Duration;
///
/// use floodgate_common::testing::assert_duration_in_range;
///
/// assert_duration_in_range(
///     Duration::from_millis(105),
///     Duration::from_millis(100),
///     Duration::from_millis(10),
/// );
/// ```
pub fn assert_duration_in_range(actual: Duration, expected: Duration, tolerance: Duration) {
    let min = expected.saturating_sub(tolerance);
    let max = expected + tolerance;

    assert!(
        actual >= min && actual <= max,
        "Duration {:?} not in range [{:?}, {:?}]",
        actual,
        min,
        max
    );
}
