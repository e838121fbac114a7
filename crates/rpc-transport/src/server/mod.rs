//! Server-side RPC transport: per-connection dispatch (§4.4.4).

pub mod connection;
pub mod dispatcher;

pub use connection::{Connection, ConnectionEnv};
pub use dispatcher::{Dispatcher, Handler, HandlerFuture};
