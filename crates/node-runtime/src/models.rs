//! Example collection wired into the bridge: demonstrates the full
//! RPC → bridge → storage path a real deployment's own models follow.
//!
//! `Account` is deliberately small. It exists to exercise
//! [`kv_storage::Model`] end to end through the bridge, not to model a
//! real account system.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use core_types::{CoreError, ErrorKind, ObjectId};
use kv_storage::{FieldValue, IndexSpec, Model, Query};

use crate::bridge::{Bridge, BridgeEnv};

pub const ACCOUNTS_TOPIC: &str = "accounts";
const BY_EMAIL: IndexSpec = IndexSpec::new(1, "by_email", &["email"], true);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    pub display_name: String,
}

impl Model for Account {
    const MODEL_ID: u64 = 1;
    const COLLECTION: &'static str = "accounts";
    const INDEXES: &'static [IndexSpec] = &[BY_EMAIL];
}

/// Registers the `accounts.create` and `accounts.get` handlers into
/// `bridge`. Call before [`Bridge::install`] so the transport dispatcher
/// picks up these routes too.
pub fn register(bridge: &mut Bridge) {
    bridge.register_handler("accounts", "create", |env: Arc<BridgeEnv>, req: Value| async move {
        let account: Account = serde_json::from_value(req).map_err(|e| CoreError::invalid_input(e.to_string()))?;
        let id = env.storage.create(ACCOUNTS_TOPIC, &account)?;
        Ok(json!({ "id": id.to_string() }))
    });

    bridge.register_handler("accounts", "get", |env: Arc<BridgeEnv>, req: Value| async move {
        let id_str = req
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::invalid_input("request missing 'id' field"))?;
        let id = ObjectId::from_hex(id_str).ok_or_else(|| CoreError::invalid_input("malformed object id"))?;
        match env.storage.get::<Account>(ACCOUNTS_TOPIC, &id)? {
            Some(account) => Ok(serde_json::to_value(account).expect("account serializes to json")),
            None => Err(CoreError::new(ErrorKind::NotFound, format!("no account with id {id_str}"))),
        }
    });

    bridge.register_handler("accounts", "find_by_email", |env: Arc<BridgeEnv>, req: Value| async move {
        let email = req
            .get("email")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::invalid_input("request missing 'email' field"))?;
        let query = Query::new(BY_EMAIL).eq(0, FieldValue::Str(email.to_string())).topic(ACCOUNTS_TOPIC);
        let matches = env.storage.find::<Account>(ACCOUNTS_TOPIC, &query)?;
        Ok(serde_json::to_value(matches).expect("accounts serialize to json"))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_storage::{EngineConfig, StorageEngine};
    use tempfile::TempDir;

    fn bridge() -> (TempDir, Bridge) {
        let dir = TempDir::new().unwrap();
        let storage = StorageEngine::open(EngineConfig::for_testing(dir.path().to_string_lossy().to_string())).unwrap();
        let env = Arc::new(BridgeEnv::new("default", Arc::new(storage)));
        let mut bridge = Bridge::new(env);
        register(&mut bridge);
        (dir, bridge)
    }

    #[tokio::test]
    async fn create_then_get_round_trips_through_the_bridge() {
        let (_dir, bridge) = bridge();
        let bridge = Arc::new(bridge);

        let (tx, rx) = tokio::sync::oneshot::channel();
        bridge
            .exec(
                "accounts",
                "create",
                None,
                json!({"email": "a@example.com", "display_name": "A"}),
                move |r| {
                    let _ = tx.send(r);
                },
            )
            .await;
        let created = rx.await.unwrap().unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        let (tx, rx) = tokio::sync::oneshot::channel();
        bridge
            .exec("accounts", "get", None, json!({"id": id}), move |r| {
                let _ = tx.send(r);
            })
            .await;
        let fetched = rx.await.unwrap().unwrap();
        assert_eq!(fetched["email"], "a@example.com");
    }

    #[tokio::test]
    async fn get_reports_not_found() {
        let (_dir, bridge) = bridge();
        let bridge = Arc::new(bridge);
        let stray_id = ObjectId::new().to_string();

        let (tx, rx) = tokio::sync::oneshot::channel();
        bridge
            .exec("accounts", "get", None, json!({"id": stray_id}), move |r| {
                let _ = tx.send(r);
            })
            .await;
        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
