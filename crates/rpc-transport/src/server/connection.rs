//! Per-connection read loop and dispatch (§4.4.4).
//!
//! Generic over `AsyncRead + AsyncWrite` so the same loop drives a plain
//! `TcpStream` or a `tokio_rustls`-wrapped TLS stream; the connection
//! itself has no opinion on transport security.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use core_types::{CoreError, ErrorKind};
use task_runtime::{ContextGuard, TaskContext};

use crate::error::TransportError;
use crate::framing::{read_frame, write_frame};
use crate::server::dispatcher::Dispatcher;
use crate::wire::RequestUnit;

/// Env name bound into the per-connection task context, reachable from
/// any handler via `ThreadLocalContext::<ConnectionEnv>::value()` while
/// the connection's `ContextGuard` is entered.
#[derive(Debug, Clone)]
pub struct ConnectionEnv(pub String);

pub struct Connection<S> {
    stream: S,
    dispatcher: Arc<Dispatcher>,
    ctx: TaskContext,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Connection<S> {
    pub fn new(stream: S, dispatcher: Arc<Dispatcher>, env: impl Into<String>) -> Self {
        let ctx = TaskContext::new().with(ConnectionEnv(env.into()));
        Self { stream, dispatcher, ctx }
    }

    /// Drains frames until the peer closes the connection or a transport
    /// error other than a clean close occurs. Backpressure is implicit:
    /// the next frame is not read until this iteration's response has been
    /// written.
    pub async fn run(mut self) -> Result<(), TransportError> {
        loop {
            let frame = match read_frame(&mut self.stream).await {
                Ok(frame) => frame,
                Err(TransportError::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(e),
            };
            let request = RequestUnit::decode(&frame)?;
            let response = self.dispatch(request).await;
            let sections = response.assemble();
            let refs: [&[u8]; 4] = [&sections[0], &sections[1], &sections[2], &sections[3]];
            write_frame(&mut self.stream, &refs).await?;
        }
    }

    async fn dispatch(&self, request: RequestUnit) -> RequestUnit {
        let _guard = ContextGuard::enter(&self.ctx);
        let id = request.id;
        let service = request.service.clone();
        let method = request.method.clone();
        let handler = self.dispatcher.lookup(&service, &method);
        let outcome = match handler {
            Some(handler) => {
                debug!(%service, %method, "dispatching request");
                handler(request).await
            }
            None => {
                warn!(%service, %method, "no handler registered");
                Err(CoreError::new(
                    ErrorKind::InvalidInput,
                    format!("no handler registered for {service}.{method}"),
                ))
            }
        };
        encode_response(id, service, method, outcome)
    }
}

/// Wraps a handler's outcome as a response unit: success payload verbatim
/// in `message`, or a one-byte error tag followed by the serialized
/// `(code, message)` pair. Never includes a cause chain or backtrace
/// (§7: "servers must never leak stack traces").
fn encode_response(id: core_types::ObjectId, service: String, method: String, outcome: CoreResult_<Vec<u8>>) -> RequestUnit {
    let message = match outcome {
        Ok(payload) => {
            let mut buf = Vec::with_capacity(1 + payload.len());
            buf.push(0);
            buf.extend_from_slice(&payload);
            buf
        }
        Err(err) => {
            let (code, msg) = err.to_wire();
            let envelope = serde_json::json!({ "code": code, "message": msg });
            let mut buf = vec![1u8];
            buf.extend_from_slice(envelope.to_string().as_bytes());
            buf
        }
    };
    RequestUnit {
        id,
        service,
        method,
        topic: String::new(),
        tenancy: String::new(),
        session_id: None,
        message,
        auth_header: None,
        method_auth_header: None,
    }
}

type CoreResult_<T> = core_types::CoreResult<T>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{send_queued, Request};
    use core_types::ObjectId;
    use task_runtime::Thread;

    fn request_unit() -> RequestUnit {
        RequestUnit {
            id: ObjectId::new(),
            service: "items".into(),
            method: "echo".into(),
            topic: "t1".into(),
            tenancy: "acme".into(),
            session_id: None,
            message: b"hello".to_vec(),
            auth_header: None,
            method_auth_header: None,
        }
    }

    #[tokio::test]
    async fn round_trip_through_connection_dispatches_and_responds() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("items", "echo", |u| async move { Ok(u.message) });

        let (client_stream, server_stream) = tokio::io::duplex(4096);
        let connection = Connection::new(server_stream, Arc::new(dispatcher), "default");
        let server = tokio::spawn(connection.run());

        let thread = Thread::new("client-cb").unwrap();
        thread.start().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let request = Request::new(request_unit(), thread.clone(), move |r| {
            let _ = tx.send(r);
        });

        let (mut write_half, mut read_half) = tokio::io::split(client_stream);
        send_queued(&mut write_half, &request).await.unwrap();
        let frame = read_frame(&mut read_half).await.unwrap();
        let response = RequestUnit::decode(&frame).unwrap();
        assert_eq!(response.message[0], 0);
        assert_eq!(&response.message[1..], b"hello");

        request.complete(response);
        let result = rx.await.unwrap();
        assert!(result.is_ok());

        drop(write_half);
        let _ = server.await;
        thread.stop();
    }

    #[tokio::test]
    async fn unregistered_method_produces_an_error_envelope() {
        let dispatcher = Dispatcher::new();
        let (client_stream, server_stream) = tokio::io::duplex(4096);
        let connection = Connection::new(server_stream, Arc::new(dispatcher), "default");
        let server = tokio::spawn(connection.run());

        let (mut write_half, mut read_half) = tokio::io::split(client_stream);
        let unit = request_unit();
        let sections = unit.assemble();
        let refs: [&[u8]; 4] = [&sections[0], &sections[1], &sections[2], &sections[3]];
        write_frame(&mut write_half, &refs).await.unwrap();

        let frame = read_frame(&mut read_half).await.unwrap();
        let response = RequestUnit::decode(&frame).unwrap();
        assert_eq!(response.message[0], 1);

        drop(write_half);
        let _ = server.await;
    }
}
