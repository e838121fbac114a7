//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for structured logging and the metrics exposition endpoint.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line and span.
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error).
    pub log_level: String,

    /// Whether to enable human-readable console output (for development).
    pub console_output: bool,

    /// Whether to enable JSON formatted logs (for production ingestion).
    pub json_logs: bool,

    /// Port the `/metrics` exposition endpoint listens on.
    pub metrics_port: u16,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "hatn-node".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            metrics_port: 9100,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `HATN_SERVICE_NAME`: Service name (default: hatn-node)
    /// - `HATN_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `HATN_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `HATN_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    /// - `HATN_METRICS_PORT`: Prometheus metrics port (default: 9100)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("HATN_SERVICE_NAME").unwrap_or_else(|_| "hatn-node".to_string()),

            log_level: env::var("HATN_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("HATN_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            json_logs: env::var("HATN_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),

            metrics_port: env::var("HATN_METRICS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(9100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "hatn-node");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.metrics_port, 9100);
    }

    #[test]
    fn test_from_env_falls_back_to_defaults() {
        let config = TelemetryConfig::from_env();
        assert!(!config.service_name.is_empty());
    }
}
