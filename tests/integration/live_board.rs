//! Live board tests
//!
//! These tests verify that:
//! - A board pass without subscribers never touches storage or sessions
//! - Status payloads reach service, server and global channels
//! - The resource board reports pooled sessions and their stats

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use heartbeat::actors::{ResourceBoard, StatusBoard};
use heartbeat::broadcast::{ChannelId, Hub, QueueSubscriber};
use heartbeat::model::{Beat, ServiceId};
use heartbeat::ssh::SessionPool;
use heartbeat::storage::{MemoryBackend, StorageBackend};

use super::helpers::*;

fn beat(service_id: ServiceId, active: bool) -> Beat {
    Beat {
        service_id,
        active,
        latency: None,
        connectivity: true,
        timestamp: Utc::now(),
    }
}

#[tokio::test]
async fn test_status_board_skips_without_subscribers() {
    let storage = Arc::new(CountingStorage::default());
    seed_process_service(storage.as_ref(), "nginx", 60.0).await;
    let before = storage.calls();

    let board = StatusBoard::new(
        storage.clone(),
        Arc::new(Hub::new("services")),
        Duration::from_secs(10),
        50,
    );

    assert_eq!(board.publish().await, 0);
    assert_eq!(storage.calls(), before);
}

#[tokio::test]
async fn test_status_board_payload_shapes() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let (server, service) = seed_process_service(storage.as_ref(), "nginx", 60.0).await;
    let service_id = service.service.id;
    for active in [true, false, true] {
        storage.insert_beat(beat(service_id, active)).await.unwrap();
    }

    let hub = Arc::new(Hub::new("services"));
    let (global, mut global_rx) = QueueSubscriber::channel(4);
    let (by_server, mut server_rx) = QueueSubscriber::channel(4);
    let (by_service, mut service_rx) = QueueSubscriber::channel(4);
    hub.connect(Arc::new(global), ChannelId::GLOBAL).await;
    hub.connect(Arc::new(by_server), ChannelId::server(server.id)).await;
    hub.connect(Arc::new(by_service), ChannelId::service(service_id)).await;

    let board = StatusBoard::new(storage, hub, Duration::from_secs(10), 2);
    assert_eq!(board.publish().await, 3);

    let single = service_rx.recv().await.unwrap();
    assert_eq!(single["id"], service_id);
    assert_eq!(single["name"], "nginx");
    assert_eq!(single["config"]["type"], "process_status");
    let beats = single["beats"].as_array().unwrap();
    assert_eq!(beats.len(), 2);
    // newest first
    assert_eq!(beats[0]["active"], true);
    assert_eq!(beats[1]["active"], false);

    let listed = server_rx.recv().await.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], service_id);

    let all = global_rx.recv().await.unwrap();
    assert_eq!(all[server.id.to_string()][0]["name"], "nginx");
}

#[tokio::test]
async fn test_resource_board_skips_without_subscribers() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let server = storage.create_server(new_server("web-1")).await.unwrap();
    let connector = Arc::new(ScriptedConnector::healthy());
    let pool = Arc::new(SessionPool::new(storage, connector.clone()));
    pool.get(server.id).await.unwrap();

    let board = ResourceBoard::new(pool, Arc::new(Hub::new("servers")), Duration::from_secs(1));

    assert_eq!(board.publish().await, 0);
    assert!(connector.commands().is_empty());
}

#[tokio::test]
async fn test_resource_board_payloads() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let up = storage.create_server(new_server("web-1")).await.unwrap();
    let down = storage.create_server(new_server("web-2")).await.unwrap();
    let connector = Arc::new(ScriptedConnector::healthy());
    let pool = Arc::new(SessionPool::new(storage, connector.clone()));
    pool.get(up.id).await.unwrap();
    pool.get(down.id).await.unwrap();

    // kill only the second session
    connector.kill_sessions();
    pool.renew(up.id).await.unwrap();

    let hub = Arc::new(Hub::new("servers"));
    let (global, mut global_rx) = QueueSubscriber::channel(4);
    let (single, mut single_rx) = QueueSubscriber::channel(4);
    hub.connect(Arc::new(global), ChannelId::GLOBAL).await;
    hub.connect(Arc::new(single), ChannelId::host(up.id)).await;

    let board = ResourceBoard::new(pool, hub, Duration::from_secs(1));
    assert_eq!(board.publish().await, 2);

    let entry = single_rx.recv().await.unwrap();
    assert_eq!(entry["active"], true);
    assert_eq!(entry["status"]["total_memory_in_kb"], 8041256);
    assert_eq!(entry["status"]["cpu_usage_percentage"], 12.0);

    let all = global_rx.recv().await.unwrap();
    assert_eq!(all[up.id.to_string()]["active"], true);
    assert_eq!(all[down.id.to_string()]["active"], false);
    assert!(all[down.id.to_string()]["status"].is_null());
}
