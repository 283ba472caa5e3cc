//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - The health endpoint answers
//! - Beat history returns 404 for unknown services and 400 for bad ranges
//! - Beat history is ordered oldest first and honours `limit`
//! - The API server binds and serves over TCP

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use heartbeat::api::{ApiConfig, ApiState, router, spawn_api_server};
use heartbeat::model::Beat;
use heartbeat::monitor::{Monitor, MonitorSettings};
use heartbeat::storage::{MemoryBackend, StorageBackend};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower::ServiceExt;

use super::helpers::*;

fn test_monitor(storage: Arc<dyn StorageBackend>) -> Arc<Monitor> {
    Arc::new(Monitor::new(
        storage,
        Arc::new(ScriptedConnector::healthy()),
        MonitorSettings::default(),
    ))
}

async fn get_json(monitor: Arc<Monitor>, uri: &str) -> (StatusCode, Value) {
    let response = router(ApiState::new(monitor))
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health_endpoint() {
    let monitor = test_monitor(Arc::new(MemoryBackend::new()));

    let (status, body) = get_json(monitor, "/api/v1/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_beats_of_unknown_service() {
    let monitor = test_monitor(Arc::new(MemoryBackend::new()));

    let (status, body) = get_json(monitor, "/api/v1/services/99/beats").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("99"));
}

#[tokio::test]
async fn test_beats_history() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let (_, service) = seed_process_service(storage.as_ref(), "nginx", 60.0).await;
    let id = service.service.id;

    let base = Utc::now() - Duration::minutes(10);
    for minute in 0..5 {
        storage
            .insert_beat(Beat {
                service_id: id,
                active: minute != 2,
                latency: None,
                connectivity: true,
                timestamp: base + Duration::minutes(minute),
            })
            .await
            .unwrap();
    }
    let monitor = test_monitor(storage);

    let (status, body) = get_json(monitor.clone(), &format!("/api/v1/services/{id}/beats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service_id"], id);
    assert_eq!(body["count"], 5);
    assert_eq!(body["beats"][2]["active"], false);

    let (status, body) =
        get_json(monitor, &format!("/api/v1/services/{id}/beats?limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["beats"][0]["active"], true);
    assert_eq!(body["beats"][1]["active"], true);
}

#[tokio::test]
async fn test_beats_with_inverted_range() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let (_, service) = seed_process_service(storage.as_ref(), "nginx", 60.0).await;
    let monitor = test_monitor(storage);

    let uri = format!(
        "/api/v1/services/{}/beats?start=2024-06-02T00:00:00Z&end=2024-06-01T00:00:00Z",
        service.service.id
    );
    let (status, _) = get_json(monitor, &uri).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_server_serves_over_tcp() {
    let monitor = test_monitor(Arc::new(MemoryBackend::new()));
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        enable_cors: true,
    };

    let addr = spawn_api_server(config, ApiState::new(monitor)).await.unwrap();

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /api/v1/health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("\"status\":\"ok\""));
}
