//! # Node Runtime
//!
//! The server binary: reads a [`config::NodeConfig`], opens a
//! [`kv_storage::StorageEngine`] per configured env, wires a
//! [`bridge::Bridge`] over it, and installs the bridge's handlers into an
//! [`rpc_transport::server::Dispatcher`] that an accept loop drives for
//! every incoming connection.

pub mod bridge;
pub mod config;
pub mod models;
pub mod secrets;
