//! Tracing subscriber setup
//!
//! Library code only emits `tracing` events. Binaries, benches and tests that
//! want to see them call [`init_tracing`] once at startup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

/// Output format for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, one line per event
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Subscriber configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `floodgate_core=debug`
    pub level: String,
    /// Line format
    pub format: LogFormat,
    /// Emit an event when spans close (includes span timing)
    pub span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Pretty, span_events: false }
    }
}

/// Install a global subscriber built from `config`
///
/// `RUST_LOG` takes precedence over `config.level`. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let span_events = if config.span_events { FmtSpan::CLOSE } else { FmtSpan::NONE };

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_span_events(span_events))
            .try_init()?,
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_span_events(span_events))
            .try_init()?,
    }

    tracing::info!(level = %config.level, format = ?config.format, "tracing_initialized");
    Ok(())
}
