//! Error taxonomy shared across the stack.
//!
//! Every async operation in this crate family completes with a value or a
//! [`CoreError`] carrying one of the [`ErrorKind`]s below plus an optional
//! chain of causes. Local recovery (session refresh on `AuthFailure`,
//! transaction retry on `Conflict`) inspects `kind`; everything else is
//! surfaced to the RPC boundary as a code and a message, never a stack trace.

use std::fmt;
use thiserror::Error;

/// Coarse failure category. Mirrors the taxonomy in the system design: kinds,
/// not concrete type names, so transport and storage can share one error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Retry at the transport or transaction level.
    TransientIo,
    /// Transaction write conflict; retried up to a bound.
    Conflict,
    /// Read returned nothing.
    NotFound,
    /// Read found a TTL-expired object.
    Expired,
    /// Unique index violated.
    UniqueViolation,
    /// Malformed unit, bad field type, bad query combination.
    InvalidInput,
    /// Session invalid or method-auth rejected.
    AuthFailure,
    /// Deadline exceeded.
    Timeout,
    /// Caller explicitly cancelled.
    Cancelled,
    /// Storage corruption or unreachable invariant.
    Fatal,
}

impl ErrorKind {
    /// JSON-RPC-style numeric code for this kind, stable across releases.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::TransientIo => -32000,
            ErrorKind::Conflict => -32001,
            ErrorKind::NotFound => -32002,
            ErrorKind::Expired => -32003,
            ErrorKind::UniqueViolation => -32004,
            ErrorKind::InvalidInput => -32602,
            ErrorKind::AuthFailure => -32010,
            ErrorKind::Timeout => -32006,
            ErrorKind::Cancelled => -32011,
            ErrorKind::Fatal => -32603,
        }
    }

    /// Whether the caller should retry without changing anything (transport
    /// level) as opposed to retrying inside a fresh transaction.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::TransientIo | ErrorKind::Conflict)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::TransientIo => "transient_io",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Expired => "expired",
            ErrorKind::UniqueViolation => "unique_violation",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::AuthFailure => "auth_failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// A typed error with an optional chain of causes.
///
/// `source` is boxed rather than `Arc`-shared: causes are attached once, at
/// the point an error crosses a layer boundary, and are not expected to be
/// cloned independently of the error that wraps them.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub cause: Option<Box<CoreError>>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn wrap(kind: ErrorKind, message: impl Into<String>, cause: CoreError) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn expired(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Expired, message)
    }

    pub fn unique_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UniqueViolation, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn auth_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthFailure, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    pub fn transient_io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientIo, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_transient()
    }

    /// Serialized form for the RPC boundary: a code plus a message, never a
    /// backtrace or the internal cause chain.
    pub fn to_wire(&self) -> (i32, String) {
        (self.kind.code(), self.message.clone())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form_hides_cause_chain() {
        let root = CoreError::transient_io("disk busy");
        let wrapped = CoreError::wrap(ErrorKind::Conflict, "commit failed", root);
        let (code, message) = wrapped.to_wire();
        assert_eq!(code, ErrorKind::Conflict.code());
        assert_eq!(message, "commit failed");
        assert!(wrapped.cause.is_some());
    }

    #[test]
    fn retryable_kinds() {
        assert!(CoreError::conflict("x").is_retryable());
        assert!(CoreError::transient_io("x").is_retryable());
        assert!(!CoreError::not_found("x").is_retryable());
    }
}
