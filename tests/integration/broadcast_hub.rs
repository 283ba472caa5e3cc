//! Broadcast hub routing tests
//!
//! These tests verify that:
//! - Service and server channels with the same magnitude stay apart
//! - Retargeted subscribers only see their new channel
//! - One failing subscriber does not affect the others
//! - Monitor subscriptions land on the right board and follow retargets
//! - A slow channel never holds up membership changes elsewhere

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use heartbeat::broadcast::{ChannelId, Hub, QueueSubscriber, Subscriber};
use heartbeat::monitor::{Monitor, MonitorSettings};
use heartbeat::storage::MemoryBackend;
use serde_json::{Value, json};
use tokio::time::Instant;

use super::helpers::*;

/// A subscriber whose every delivery fails
#[derive(Default)]
struct BrokenSubscriber {
    attempts: AtomicUsize,
}

#[async_trait]
impl Subscriber for BrokenSubscriber {
    async fn send(&self, _payload: &Value) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("socket closed")
    }
}

/// A subscriber that takes a minute to accept each payload
struct SlowSubscriber;

#[async_trait]
impl Subscriber for SlowSubscriber {
    async fn send(&self, _payload: &Value) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

#[tokio::test]
async fn test_server_and_service_channels_are_distinct() {
    let hub = Hub::new("services");
    let (server_sub, mut server_rx) = QueueSubscriber::channel(8);
    let (service_sub, mut service_rx) = QueueSubscriber::channel(8);

    hub.connect(Arc::new(server_sub), ChannelId::server(5)).await;
    hub.connect(Arc::new(service_sub), ChannelId::service(5)).await;

    assert_eq!(hub.broadcast(ChannelId(-5), &json!({"server": 5})).await, 1);
    assert_eq!(hub.broadcast(ChannelId(5), &json!({"service": 5})).await, 1);

    assert_eq!(server_rx.recv().await, Some(json!({"server": 5})));
    assert_eq!(service_rx.recv().await, Some(json!({"service": 5})));
    assert!(server_rx.try_recv().is_err());
    assert!(service_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_change_channel_then_disconnect() {
    let hub = Hub::new("services");
    let (subscriber, mut rx) = QueueSubscriber::channel(8);
    let id = hub.connect(Arc::new(subscriber), ChannelId::GLOBAL).await;

    assert!(hub.change_channel(id, ChannelId(7)).await);
    assert_eq!(hub.broadcast(ChannelId::GLOBAL, &json!("global")).await, 0);
    assert_eq!(hub.broadcast(ChannelId(7), &json!("seven")).await, 1);
    assert_eq!(rx.recv().await, Some(json!("seven")));

    hub.disconnect(id).await;
    assert!(!hub.has_subscribers().await);
    assert!(hub.active_channels().await.is_empty());
    assert_eq!(hub.broadcast(ChannelId(7), &json!("late")).await, 0);

    // a second disconnect is a no-op
    hub.disconnect(id).await;
    assert!(!hub.change_channel(id, ChannelId(8)).await);
}

#[tokio::test]
async fn test_failing_subscriber_is_isolated() {
    let hub = Hub::new("servers");
    let broken = Arc::new(BrokenSubscriber::default());
    let (healthy, mut rx) = QueueSubscriber::channel(8);

    hub.connect(broken.clone(), ChannelId::GLOBAL).await;
    hub.connect(Arc::new(healthy), ChannelId::GLOBAL).await;

    assert_eq!(hub.broadcast(ChannelId::GLOBAL, &json!({"1": {}})).await, 1);
    assert_eq!(hub.broadcast(ChannelId::GLOBAL, &json!({"2": {}})).await, 1);

    assert_eq!(rx.recv().await, Some(json!({"1": {}})));
    assert_eq!(rx.recv().await, Some(json!({"2": {}})));
    assert_eq!(broken.attempts.load(Ordering::SeqCst), 2);

    // failed deliveries do not unsubscribe
    assert_eq!(hub.subscriber_count().await, 2);
}

#[tokio::test]
async fn test_auto_broadcast_routes_each_payload() {
    let hub = Hub::new("services");
    let (global, mut global_rx) = QueueSubscriber::channel(8);
    let (single, mut single_rx) = QueueSubscriber::channel(8);

    hub.connect(Arc::new(global), ChannelId::GLOBAL).await;
    hub.connect(Arc::new(single), ChannelId(3)).await;

    let delivered = hub
        .auto_broadcast([
            (ChannelId::GLOBAL, json!("all")),
            (ChannelId(3), json!("three")),
            (ChannelId(4), json!("nobody")),
        ])
        .await;

    assert_eq!(delivered, 2);
    assert_eq!(global_rx.recv().await, Some(json!("all")));
    assert_eq!(single_rx.recv().await, Some(json!("three")));
}

#[tokio::test]
async fn test_monitor_routes_board_subscriptions() {
    let monitor = Monitor::new(
        Arc::new(MemoryBackend::new()),
        Arc::new(ScriptedConnector::healthy()),
        MonitorSettings::default(),
    );
    let (status_sub, mut status_rx) = QueueSubscriber::channel(8);
    let (resource_sub, _resource_rx) = QueueSubscriber::channel(8);

    let status_id = monitor
        .subscribe_services(Arc::new(status_sub), ChannelId::service(3))
        .await;
    let resource_id = monitor
        .subscribe_servers(Arc::new(resource_sub), ChannelId::GLOBAL)
        .await;
    assert_eq!(monitor.service_hub().channel_of(status_id).await, Some(ChannelId(3)));
    assert_eq!(monitor.service_hub().subscriber_count().await, 1);
    assert_eq!(monitor.server_hub().subscriber_count().await, 1);

    assert!(monitor.change_channel(status_id, ChannelId::server(1)).await);
    assert_eq!(monitor.service_hub().broadcast(ChannelId(3), &json!("old")).await, 0);
    assert_eq!(monitor.service_hub().broadcast(ChannelId(-1), &json!("server")).await, 1);
    assert_eq!(status_rx.recv().await, Some(json!("server")));

    assert!(monitor.change_server_channel(resource_id, ChannelId(2)).await);
    assert_eq!(monitor.server_hub().channel_of(resource_id).await, Some(ChannelId(2)));
    assert_eq!(monitor.service_hub().channel_of(status_id).await, Some(ChannelId(-1)));

    monitor.unsubscribe_services(status_id).await;
    assert!(!monitor.service_hub().has_subscribers().await);
    assert!(monitor.server_hub().has_subscribers().await);
    assert!(!monitor.change_channel(status_id, ChannelId(4)).await);

    monitor.unsubscribe_servers(resource_id).await;
    assert!(!monitor.server_hub().has_subscribers().await);
}

#[tokio::test(start_paused = true)]
async fn test_slow_channel_does_not_block_other_channels() {
    let hub = Arc::new(Hub::new("services"));
    hub.connect(Arc::new(SlowSubscriber), ChannelId(1)).await;

    let slow = {
        let hub = hub.clone();
        tokio::spawn(async move { hub.broadcast(ChannelId(1), &json!("slow")).await })
    };
    tokio::task::yield_now().await;

    let started = Instant::now();
    let (subscriber, mut rx) = QueueSubscriber::channel(8);
    let id = hub.connect(Arc::new(subscriber), ChannelId(2)).await;
    assert_eq!(hub.broadcast(ChannelId(2), &json!("fast")).await, 1);
    assert!(hub.change_channel(id, ChannelId(3)).await);
    hub.disconnect(id).await;
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(rx.recv().await, Some(json!("fast")));

    assert_eq!(slow.await.unwrap(), 1);
}
