//! Shared test helpers for `floodgate-core` integration tests.
//!
//! Builds components on a shared [`MockClock`] so tests can move time
//! deterministically instead of sleeping.

#![allow(dead_code)]

use std::time::Duration;

use floodgate_common::MockClock;
use floodgate_core::{AdmissionControl, FloodgateConfig};

/// Configuration with small limits that tests can exhaust quickly
pub fn small_config() -> FloodgateConfig {
    let mut config = FloodgateConfig::default();
    config.rate_limit.default_rate = 60;
    config.rate_limit.default_burst = 10;
    config.resources.max_concurrent_requests = 3;
    config.resources.max_request_duration = Duration::from_secs(30);
    config.quota.reset_interval = Duration::from_secs(3600);
    config.circuit_breaker.failure_threshold = 3;
    config.circuit_breaker.recovery_timeout = Duration::from_secs(60);
    config
}

/// Admission control on a mock clock, returned with the clock handle
pub fn mock_control(config: FloodgateConfig) -> (AdmissionControl<MockClock>, MockClock) {
    let clock = MockClock::new();
    let control =
        AdmissionControl::with_clock(config, clock.clone()).expect("test config is valid");
    (control, clock)
}
