//! `tracing-subscriber` setup: env-filter plus a console or JSON formatting
//! layer, matching `node-runtime`'s bootstrap.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Guard returned by [`init_tracing`]. Holding it keeps the subscriber
/// installed; nothing needs to run on drop since there is no exporter to
/// flush.
pub struct TracingGuard;

/// Install the global `tracing` subscriber.
pub fn init_tracing(config: &TelemetryConfig) -> Result<TracingGuard, TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::TracerInit(e.to_string()))?;

    if config.json_logs {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        let registry = tracing_subscriber::registry().with(env_filter);
        if config.console_output {
            registry
                .with(json_layer)
                .try_init()
                .map_err(|e| TelemetryError::TracerInit(e.to_string()))?;
        } else {
            registry.try_init().map_err(|e| TelemetryError::TracerInit(e.to_string()))?;
        }
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(true);

        let registry = tracing_subscriber::registry().with(env_filter);
        if config.console_output {
            registry
                .with(fmt_layer)
                .try_init()
                .map_err(|e| TelemetryError::TracerInit(e.to_string()))?;
        } else {
            registry.try_init().map_err(|e| TelemetryError::TracerInit(e.to_string()))?;
        }
    }

    tracing::info!(service = %config.service_name, "tracing initialized");
    Ok(TracingGuard)
}

#[cfg(test)]
mod tests {
    // Installing a global subscriber in-process conflicts across tests;
    // exercised in node-runtime's bootstrap integration test instead.
}
