//! End-to-end test of the data-plane path: an RPC request is framed,
//! written to an in-memory duplex stream, dispatched by the transport
//! `Connection`, routed through the bridge, and answered by the storage
//! engine.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use core_types::ObjectId;
use kv_storage::{EngineConfig, StorageEngine};
use rpc_transport::framing::read_frame;
use rpc_transport::server::{Connection, Dispatcher};
use rpc_transport::wire::RequestUnit;

use node_runtime::bridge::{Bridge, BridgeEnv};
use node_runtime::models;

fn request_unit(service: &str, method: &str, message: Vec<u8>) -> RequestUnit {
    RequestUnit {
        id: ObjectId::new(),
        service: service.into(),
        method: method.into(),
        topic: "t1".into(),
        tenancy: String::new(),
        session_id: None,
        message,
        auth_header: None,
        method_auth_header: None,
    }
}

#[tokio::test]
async fn create_then_get_round_trips_over_the_wire() {
    let dir = TempDir::new().unwrap();
    let storage = StorageEngine::open(EngineConfig::for_testing(dir.path().to_string_lossy().to_string())).unwrap();
    let env = Arc::new(BridgeEnv::new("default", Arc::new(storage)));
    let mut bridge = Bridge::new(env);
    models::register(&mut bridge);
    let bridge = Arc::new(bridge);

    let mut dispatcher = Dispatcher::new();
    bridge.install(&mut dispatcher);

    let (client_stream, server_stream) = tokio::io::duplex(8192);
    let connection = Connection::new(server_stream, Arc::new(dispatcher), "default");
    let server = tokio::spawn(connection.run());

    let (mut write_half, mut read_half) = tokio::io::split(client_stream);

    let create = request_unit(
        "accounts",
        "create",
        serde_json::to_vec(&json!({"email": "a@example.com", "display_name": "A"})).unwrap(),
    );
    let sections = create.assemble();
    let refs: [&[u8]; 4] = [&sections[0], &sections[1], &sections[2], &sections[3]];
    rpc_transport::framing::write_frame(&mut write_half, &refs).await.unwrap();

    let frame = read_frame(&mut read_half).await.unwrap();
    let response = RequestUnit::decode(&frame).unwrap();
    assert_eq!(response.message[0], 0, "create should succeed");
    let created: serde_json::Value = serde_json::from_slice(&response.message[1..]).unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let get = request_unit("accounts", "get", serde_json::to_vec(&json!({"id": id})).unwrap());
    let sections = get.assemble();
    let refs: [&[u8]; 4] = [&sections[0], &sections[1], &sections[2], &sections[3]];
    rpc_transport::framing::write_frame(&mut write_half, &refs).await.unwrap();

    let frame = read_frame(&mut read_half).await.unwrap();
    let response = RequestUnit::decode(&frame).unwrap();
    assert_eq!(response.message[0], 0, "get should succeed");
    let fetched: serde_json::Value = serde_json::from_slice(&response.message[1..]).unwrap();
    assert_eq!(fetched["email"], "a@example.com");

    drop(write_half);
    let _ = server.await;
}

#[tokio::test]
async fn unregistered_service_produces_an_error_envelope() {
    let dir = TempDir::new().unwrap();
    let storage = StorageEngine::open(EngineConfig::for_testing(dir.path().to_string_lossy().to_string())).unwrap();
    let env = Arc::new(BridgeEnv::new("default", Arc::new(storage)));
    let mut bridge = Bridge::new(env);
    models::register(&mut bridge);
    let bridge = Arc::new(bridge);

    let mut dispatcher = Dispatcher::new();
    bridge.install(&mut dispatcher);

    let (client_stream, server_stream) = tokio::io::duplex(8192);
    let connection = Connection::new(server_stream, Arc::new(dispatcher), "default");
    let server = tokio::spawn(connection.run());

    let (mut write_half, mut read_half) = tokio::io::split(client_stream);
    let request = request_unit("nonexistent", "nope", b"{}".to_vec());
    let sections = request.assemble();
    let refs: [&[u8]; 4] = [&sections[0], &sections[1], &sections[2], &sections[3]];
    rpc_transport::framing::write_frame(&mut write_half, &refs).await.unwrap();

    let frame = read_frame(&mut read_half).await.unwrap();
    let response = RequestUnit::decode(&frame).unwrap();
    assert_eq!(response.message[0], 1, "unregistered service should error");

    drop(write_half);
    let _ = server.await;
}
