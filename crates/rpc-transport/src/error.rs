//! Transport-local error enum, converted into the shared [`CoreError`]
//! taxonomy at every boundary that crosses into a dispatcher or RPC
//! response.

use core_types::{CoreError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("connection closed before a full frame arrived")]
    ConnectionClosed,
    #[error("frame exceeds the maximum accepted length ({0} bytes)")]
    FrameTooLarge(u32),
    #[error("malformed request unit: {0}")]
    MalformedUnit(String),
    #[error("no handler registered for {service}.{method}")]
    UnknownMethod { service: String, method: String },
    #[error("request was cancelled before completion")]
    Cancelled,
    #[error("request deadline exceeded")]
    TimedOut,
    #[error("session auth header unavailable: {0}")]
    AuthFailure(String),
    #[error(transparent)]
    Io(#[from] IoErrorShim),
}

/// `std::io::Error` is not `Clone`, so it is captured as a string the moment
/// it crosses into [`TransportError`]; the original error is logged at the
/// call site before the conversion.
#[derive(Debug, Clone)]
pub struct IoErrorShim(pub String);

impl std::fmt::Display for IoErrorShim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for IoErrorShim {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(IoErrorShim(e.to_string()))
    }
}

impl From<TransportError> for CoreError {
    fn from(e: TransportError) -> Self {
        let kind = match &e {
            TransportError::ConnectionClosed | TransportError::Io(_) => ErrorKind::TransientIo,
            TransportError::FrameTooLarge(_) | TransportError::MalformedUnit(_) => ErrorKind::InvalidInput,
            TransportError::UnknownMethod { .. } => ErrorKind::InvalidInput,
            TransportError::Cancelled => ErrorKind::Cancelled,
            TransportError::TimedOut => ErrorKind::Timeout,
            TransportError::AuthFailure(_) => ErrorKind::AuthFailure,
        };
        CoreError::new(kind, e.to_string())
    }
}
