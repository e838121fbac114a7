//! # Telemetry
//!
//! Structured logging (`tracing` + `tracing-subscriber`) and Prometheus
//! metrics for this workspace's queues, transactions, and RPC transport
//! (§10.1, §10.5).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use telemetry::{TelemetryConfig, init_telemetry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::from_env();
//!     let _guard = init_telemetry(config).expect("failed to init telemetry");
//!     // application code; logs and metrics are now being collected
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `HATN_SERVICE_NAME` | `hatn-node` | Service name attached to log lines |
//! | `HATN_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `HATN_JSON_LOGS` | `false` (`true` under a container) | JSON log formatting |
//! | `HATN_METRICS_PORT` | `9100` | `/metrics` exposition port |

#![warn(missing_docs)]

mod config;
mod logging;
mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use logging::StructuredLogger;
pub use metrics::{
    encode_metrics, register_metrics, serve_metrics, MetricsHandle, CONNECTIONS_OPEN, QUEUE_DEPTH,
    RPC_LATENCY, SESSION_REFRESHES, TXN_COMMITS, TXN_RETRIES, TXN_ROLLBACKS,
};
pub use tracing_setup::TracingGuard;

use thiserror::Error;

/// Telemetry initialization errors.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The `tracing` subscriber failed to install.
    #[error("failed to initialize tracing subscriber: {0}")]
    TracerInit(String),

    /// Prometheus metric registration or encoding failed.
    #[error("failed to initialize prometheus metrics: {0}")]
    MetricsInit(String),

    /// The supplied `TelemetryConfig` was invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics registration.
///
/// Returns a guard that must be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics_handle = register_metrics()?;
    let tracing_guard = tracing_setup::init_tracing(&config)?;
    let _logging_guard = logging::init_logging(&config)?;

    Ok(TelemetryGuard { _tracing: tracing_guard, _metrics: metrics_handle })
}

/// Guard that keeps telemetry active. Drop to shut down.
pub struct TelemetryGuard {
    _tracing: TracingGuard,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("shutting down telemetry");
    }
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}

/// Convenience macro for recording a metric with a value.
#[macro_export]
macro_rules! metric_observe {
    ($metric:expr, $value:expr) => {
        $metric.observe($value)
    };
    ($metric:expr, $labels:expr, $value:expr) => {
        $metric.with_label_values($labels).observe($value)
    };
}
