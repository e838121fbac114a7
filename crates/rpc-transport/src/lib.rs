//! # RPC Transport
//!
//! Length-delimited, TLS-capable RPC transport (§4.4): a client request
//! state machine with a three-tier priority queue and session auth
//! coalescing, and a server-side per-connection dispatcher. Every frame on
//! the wire is `totalLen(u32 BE) ‖ requestUnit`; the request unit's
//! sections are laid out in the fixed order described in [`wire`].

pub mod client;
pub mod error;
pub mod framing;
pub mod server;
pub mod wire;

#[cfg(feature = "tls")]
pub mod tls;

pub use error::TransportError;
pub use wire::RequestUnit;
