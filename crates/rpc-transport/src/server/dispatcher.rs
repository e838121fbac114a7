//! Routes `(service, method)` to a registered handler (§4.4.4).
//!
//! This is the transport-level router: it knows nothing about env
//! lookup, message-type builders, or multi-tenancy, all of which live one
//! layer up in the bridge dispatcher. A handler here takes the raw
//! payload bytes off an already-decoded [`RequestUnit`] and returns the
//! raw response payload bytes.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use core_types::CoreResult;

use crate::wire::RequestUnit;

pub type HandlerFuture = Pin<Box<dyn Future<Output = CoreResult<Vec<u8>>> + Send>>;
pub type Handler = Arc<dyn Fn(RequestUnit) -> HandlerFuture + Send + Sync>;

#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<(String, String), Handler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, service: impl Into<String>, method: impl Into<String>, handler: F)
    where
        F: Fn(RequestUnit) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CoreResult<Vec<u8>>> + Send + 'static,
    {
        self.handlers
            .insert((service.into(), method.into()), Arc::new(move |unit| Box::pin(handler(unit))));
    }

    pub fn lookup(&self, service: &str, method: &str) -> Option<Handler> {
        self.handlers.get(&(service.to_string(), method.to_string())).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::ObjectId;

    fn unit() -> RequestUnit {
        RequestUnit {
            id: ObjectId::new(),
            service: "items".into(),
            method: "create".into(),
            topic: "t1".into(),
            tenancy: "acme".into(),
            session_id: None,
            message: b"{}".to_vec(),
            auth_header: None,
            method_auth_header: None,
        }
    }

    #[tokio::test]
    async fn registered_handler_is_routed_to() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("items", "create", |u| async move { Ok(u.message) });
        let handler = dispatcher.lookup("items", "create").unwrap();
        let result = handler(unit()).await.unwrap();
        assert_eq!(result, b"{}".to_vec());
    }

    #[test]
    fn unregistered_method_is_not_found() {
        let dispatcher = Dispatcher::new();
        assert!(dispatcher.lookup("items", "delete").is_none());
    }
}
