//! In-process `(service, method)` dispatcher presenting a JSON request/
//! response surface (§4.5): a service/method pair maps to a handler
//! closure in a real registry rather than a hand-written `match`, since
//! the set of registered services grows with the models wired into a
//! given deployment instead of being fixed at compile time.
//!
//! The transport-level [`rpc_transport::server::Dispatcher`] already routes
//! `(service, method)` to a handler that speaks raw bytes; this bridge sits
//! one layer above it, translating to and from JSON and resolving which
//! tenant env a call runs against before invoking the handler.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use core_types::{CoreError, CoreResult, ErrorKind};
use kv_storage::StorageEngine;
use task_runtime::{ContextGuard, TaskContext};

/// One tenant's storage engine. Bound into the task context under the
/// resolved env's name so handlers can reach it without an explicit
/// parameter.
pub struct BridgeEnv {
    pub name: String,
    pub storage: Arc<StorageEngine>,
}

impl BridgeEnv {
    pub fn new(name: impl Into<String>, storage: Arc<StorageEngine>) -> Self {
        Self { name: name.into(), storage }
    }
}

pub type BridgeHandlerFuture = Pin<Box<dyn Future<Output = CoreResult<Value>> + Send>>;
pub type BridgeHandler = Arc<dyn Fn(Arc<BridgeEnv>, Value) -> BridgeHandlerFuture + Send + Sync>;
pub type MessageBuilder = Arc<dyn Fn(&[u8]) -> CoreResult<Value> + Send + Sync>;

/// Errors the bridge itself raises, before a registered handler ever runs.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no handler registered for service '{service}' method '{method}'")]
    UnknownBridgeService { service: String, method: String },

    #[error("no message builder registered for message type '{0}'")]
    UnknownBridgeMessage(String),
}

impl From<BridgeError> for CoreError {
    fn from(err: BridgeError) -> Self {
        CoreError::new(ErrorKind::InvalidInput, err.to_string())
    }
}

/// Owns the service/method handler table, the message-type builder table,
/// and the named-env map. Missing env names silently fall back to
/// `default_env` (§4.5); missing services, methods, or message types do
/// not.
pub struct Bridge {
    handlers: HashMap<(String, String), BridgeHandler>,
    message_builders: HashMap<String, MessageBuilder>,
    envs: HashMap<String, Arc<BridgeEnv>>,
    default_env: Arc<BridgeEnv>,
}

impl Bridge {
    pub fn new(default_env: Arc<BridgeEnv>) -> Self {
        Self {
            handlers: HashMap::new(),
            message_builders: HashMap::new(),
            envs: HashMap::new(),
            default_env,
        }
    }

    pub fn register_env(&mut self, env: Arc<BridgeEnv>) {
        self.envs.insert(env.name.clone(), env);
    }

    pub fn register_handler<F, Fut>(&mut self, service: impl Into<String>, method: impl Into<String>, handler: F)
    where
        F: Fn(Arc<BridgeEnv>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CoreResult<Value>> + Send + 'static,
    {
        self.handlers
            .insert((service.into(), method.into()), Arc::new(move |env, req| Box::pin(handler(env, req))));
    }

    pub fn register_message<F>(&mut self, message_type: impl Into<String>, builder: F)
    where
        F: Fn(&[u8]) -> CoreResult<Value> + Send + Sync + 'static,
    {
        self.message_builders.insert(message_type.into(), Arc::new(builder));
    }

    fn resolve_env(&self, env_name: Option<&str>) -> Arc<BridgeEnv> {
        match env_name.and_then(|name| self.envs.get(name)) {
            Some(env) => env.clone(),
            None => self.default_env.clone(),
        }
    }

    /// Builds the task context a handler runs under: the resolved env
    /// bound in by value, reachable from any callee via
    /// `ThreadLocalContext::<Arc<BridgeEnv>>::value()` for the lifetime of
    /// the `ContextGuard` entered around the handler call.
    fn build_context(&self, env_name: Option<&str>) -> (Arc<BridgeEnv>, TaskContext) {
        let env = self.resolve_env(env_name);
        let ctx = TaskContext::new().with(env.clone());
        (env, ctx)
    }

    /// Decodes `payload` through the message builder registered for
    /// `message_type`. With no message type given, falls back to decoding
    /// the payload as JSON directly.
    pub fn decode_message(&self, message_type: Option<&str>, payload: &[u8]) -> CoreResult<Value> {
        match message_type {
            None => serde_json::from_slice(payload).map_err(|e| CoreError::invalid_input(e.to_string())),
            Some(message_type) => {
                let builder = self
                    .message_builders
                    .get(message_type)
                    .ok_or_else(|| BridgeError::UnknownBridgeMessage(message_type.to_string()))?;
                builder(payload)
            }
        }
    }

    async fn exec_direct(&self, service: &str, method: &str, env_name: Option<&str>, request: Value) -> CoreResult<Value> {
        let handler = self.handlers.get(&(service.to_string(), method.to_string())).cloned();
        match handler {
            Some(handler) => {
                let (env, ctx) = self.build_context(env_name);
                let _guard = ContextGuard::enter(&ctx);
                handler(env, request).await
            }
            None => Err(BridgeError::UnknownBridgeService {
                service: service.to_string(),
                method: method.to_string(),
            }
            .into()),
        }
    }

    /// `exec(service, method, request, callback)` (§4.5): looks
    /// synchronous from the caller's side, but the handler runs to
    /// completion before `callback` fires — the bridge has no queue of its
    /// own, unlike `task_runtime::Thread`'s posted work.
    pub async fn exec<C>(&self, service: &str, method: &str, env_name: Option<&str>, request: Value, callback: C)
    where
        C: FnOnce(CoreResult<Value>) + Send + 'static,
    {
        let outcome = self.exec_direct(service, method, env_name, request).await;
        callback(outcome);
    }

    /// Registers every known `(service, method)` pair into a
    /// transport-level dispatcher, translating a [`rpc_transport::RequestUnit`]'s
    /// raw payload to and from JSON and resolving the env from the unit's
    /// `tenancy` field.
    pub fn install(self: &Arc<Self>, dispatcher: &mut rpc_transport::server::Dispatcher) {
        for (service, method) in self.handlers.keys().cloned().collect::<Vec<_>>() {
            let bridge = self.clone();
            dispatcher.register(service.clone(), method.clone(), move |unit: rpc_transport::RequestUnit| {
                let bridge = bridge.clone();
                let service = service.clone();
                let method = method.clone();
                async move {
                    let env_name = (!unit.tenancy.is_empty()).then_some(unit.tenancy.as_str());
                    let request = bridge.decode_message(None, &unit.message)?;
                    let response = bridge.exec_direct(&service, &method, env_name, request).await?;
                    serde_json::to_vec(&response).map_err(|e| CoreError::invalid_input(e.to_string()))
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_storage::EngineConfig;
    use serde_json::json;
    use tempfile::TempDir;

    /// Leaks the `TempDir` so the engine's column families outlive the
    /// helper call; fine for short-lived tests, not a pattern to use
    /// outside them.
    fn test_env(name: &str) -> Arc<BridgeEnv> {
        let dir = TempDir::new().unwrap();
        let storage = StorageEngine::open(EngineConfig::for_testing(dir.path().to_string_lossy().to_string())).unwrap();
        std::mem::forget(dir);
        Arc::new(BridgeEnv::new(name, Arc::new(storage)))
    }

    #[tokio::test]
    async fn exec_routes_to_registered_handler() {
        let mut bridge = Bridge::new(test_env("default"));
        bridge.register_handler("echo", "ping", |_env, req| async move { Ok(req) });
        let bridge = Arc::new(bridge);

        let (tx, rx) = tokio::sync::oneshot::channel();
        bridge
            .exec("echo", "ping", None, json!({"x": 1}), move |result| {
                let _ = tx.send(result);
            })
            .await;
        let result = rx.await.unwrap().unwrap();
        assert_eq!(result, json!({"x": 1}));
    }

    #[tokio::test]
    async fn exec_reports_unknown_service() {
        let bridge = Arc::new(Bridge::new(test_env("default")));
        let (tx, rx) = tokio::sync::oneshot::channel();
        bridge
            .exec("missing", "method", None, json!(null), move |result| {
                let _ = tx.send(result);
            })
            .await;
        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn unknown_env_falls_back_to_default() {
        let mut bridge = Bridge::new(test_env("default"));
        bridge.register_handler("envs", "whoami", |env, _req| {
            let name = env.name.clone();
            async move { Ok(json!(name)) }
        });
        let bridge = Arc::new(bridge);

        let (tx, rx) = tokio::sync::oneshot::channel();
        bridge
            .exec("envs", "whoami", Some("nonexistent-tenant"), json!(null), move |result| {
                let _ = tx.send(result);
            })
            .await;
        assert_eq!(rx.await.unwrap().unwrap(), json!("default"));
    }

    #[tokio::test]
    async fn named_env_is_used_when_registered() {
        let mut bridge = Bridge::new(test_env("default"));
        bridge.register_env(test_env("tenant-a"));
        bridge.register_handler("envs", "whoami", |env, _req| {
            let name = env.name.clone();
            async move { Ok(json!(name)) }
        });
        let bridge = Arc::new(bridge);

        let (tx, rx) = tokio::sync::oneshot::channel();
        bridge
            .exec("envs", "whoami", Some("tenant-a"), json!(null), move |result| {
                let _ = tx.send(result);
            })
            .await;
        assert_eq!(rx.await.unwrap().unwrap(), json!("tenant-a"));
    }

    #[test]
    fn decode_message_rejects_unknown_message_type() {
        let bridge = Bridge::new(test_env("default"));
        let err = bridge.decode_message(Some("no-such-type"), b"{}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }
}
