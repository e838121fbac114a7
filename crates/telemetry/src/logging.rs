//! Structured logging helpers.
//!
//! Logs are plain `tracing` events; [`tracing_setup::init_tracing`] picks
//! between a human-readable console layer and a JSON layer suitable for
//! ingestion by a log shipper. These macros just standardize which fields
//! accompany events at the natural boundaries the rest of the workspace
//! instruments: transaction begin/commit/rollback, connection accept,
//! session refresh start/end, partition creation.

use crate::{TelemetryConfig, TelemetryError};

/// Structured logger handle. Exists so `init_telemetry` has something to
/// hold even though all the real work happens in `init_tracing`.
pub struct StructuredLogger {
    _initialized: bool,
}

/// Confirm structured logging is configured; the subscriber itself is
/// installed by [`crate::tracing_setup::init_tracing`].
pub fn init_logging(config: &TelemetryConfig) -> Result<StructuredLogger, TelemetryError> {
    tracing::debug!(json_logs = config.json_logs, "structured logging configured");
    Ok(StructuredLogger { _initialized: true })
}

/// Log an event tagged with the subsystem it originated from.
#[macro_export]
macro_rules! log_event {
    (info, $subsystem:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::info!(subsystem = $subsystem, $($($field)*,)? $msg)
    };
    (warn, $subsystem:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(subsystem = $subsystem, $($($field)*,)? $msg)
    };
    (error, $subsystem:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::error!(subsystem = $subsystem, $($($field)*,)? $msg)
    };
    (debug, $subsystem:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::debug!(subsystem = $subsystem, $($($field)*,)? $msg)
    };
}

/// Log a transaction lifecycle event (begin/commit/rollback) with the
/// partition and transaction id attached.
#[macro_export]
macro_rules! log_txn_event {
    ($level:ident, $msg:expr, $partition:expr, $txn_id:expr $(, $($field:tt)*)?) => {
        tracing::$level!(partition = %$partition, txn_id = $txn_id, $($($field)*,)? $msg)
    };
}

/// Log a session refresh start/end event.
#[macro_export]
macro_rules! log_session_event {
    ($level:ident, $msg:expr, $ctx_id:expr $(, $($field:tt)*)?) => {
        tracing::$level!(ctx_id = ?$ctx_id, $($($field)*,)? $msg)
    };
}

#[cfg(test)]
mod tests {
    // These macros expand to tracing calls; their formatting is exercised
    // wherever they're used (storage, rpc-transport), not here.
}
