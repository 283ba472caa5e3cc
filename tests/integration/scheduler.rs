//! Beat scheduler behaviour against a scripted host
//!
//! These tests run on a paused clock, so intervals and slow commands cost no
//! wall time:
//! - overrunning checks coalesce missed ticks
//! - schedulers stop once their service is deleted
//! - unreachable hosts, unsafe unit names and storage errors still produce beats
//! - the monitor's lifecycle hooks launch schedulers and manage sessions

use std::sync::Arc;
use std::time::Duration;

use heartbeat::actors::{BeaterHandle, SchedulerState};
use heartbeat::model::{BeatQuery, NewService};
use heartbeat::monitor::{Monitor, MonitorSettings};
use heartbeat::ssh::SessionPool;
use heartbeat::storage::{MemoryBackend, StorageBackend};
use tokio::time::Instant;

use super::helpers::*;

fn pool_with(storage: Arc<dyn StorageBackend>, connector: Arc<ScriptedConnector>) -> Arc<SessionPool> {
    Arc::new(SessionPool::new(storage, connector))
}

#[tokio::test(start_paused = true)]
async fn test_slow_check_coalesces_missed_ticks() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let (_, service) = seed_process_service(storage.as_ref(), "nginx", 10.0).await;
    let connector = Arc::new(ScriptedConnector::healthy().with_exec_time(Duration::from_secs(25)));
    let pool = pool_with(storage.clone(), connector.clone());

    let t0 = Instant::now();
    let handle = BeaterHandle::spawn(service.service.id, storage.clone(), pool);
    tokio::time::sleep(Duration::from_secs(65)).await;

    let offsets: Vec<u64> = connector
        .execs()
        .iter()
        .map(|record| (record.started - t0).as_secs_f64().round() as u64)
        .collect();
    // 25s checks on a 10s interval run at 0, 30, 60 and never back to back
    assert_eq!(offsets, vec![0, 30, 60]);

    let beats = storage
        .query_beats(service.service.id, BeatQuery::default())
        .await
        .unwrap();
    assert_eq!(beats.len(), 2);
    assert!(beats.iter().all(|beat| beat.active && beat.connectivity));

    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_stops_after_service_deletion() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let (_, service) = seed_process_service(storage.as_ref(), "nginx", 10.0).await;
    let connector = Arc::new(ScriptedConnector::healthy());
    let monitor = Monitor::new(storage.clone(), connector.clone(), MonitorSettings::default());

    let id = service.service.id;
    assert!(monitor.service_created(id).await);
    assert!(!monitor.service_created(id).await, "second launch must be refused");

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(monitor.scheduler_state(id).await, Some(SchedulerState::Running));
    assert_eq!(monitor.running_schedulers().await, 1);

    assert!(storage.delete_service(id).await.unwrap());
    tokio::time::timeout(Duration::from_secs(60), monitor.scheduler_stopped(id))
        .await
        .expect("scheduler should stop within one interval");

    assert_eq!(monitor.scheduler_state(id).await, Some(SchedulerState::Stopped));
    assert_eq!(monitor.running_schedulers().await, 0);

    let executed = connector.commands().len();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.commands().len(), executed);
}

#[tokio::test(start_paused = true)]
async fn test_beat_timestamps_are_monotonic() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let (_, service) = seed_process_service(storage.as_ref(), "nginx", 10.0).await;
    let connector = Arc::new(ScriptedConnector::healthy());
    let pool = pool_with(storage.clone(), connector);

    let handle = BeaterHandle::spawn(service.service.id, storage.clone(), pool);
    tokio::time::sleep(Duration::from_secs(55)).await;
    handle.abort();

    let beats = storage
        .query_beats(service.service.id, BeatQuery::default())
        .await
        .unwrap();
    assert_eq!(beats.len(), 6);
    assert!(
        beats
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
    );
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_host_records_failed_beats() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let (_, service) = seed_process_service(storage.as_ref(), "nginx", 10.0).await;
    let connector = Arc::new(ScriptedConnector::healthy());
    connector.set_reachable(false);
    let pool = pool_with(storage.clone(), connector.clone());

    let handle = BeaterHandle::spawn(service.service.id, storage.clone(), pool.clone());
    tokio::time::sleep(Duration::from_secs(25)).await;
    handle.abort();

    let beats = storage
        .query_beats(service.service.id, BeatQuery::default())
        .await
        .unwrap();
    assert_eq!(beats.len(), 3);
    for beat in &beats {
        assert!(!beat.active);
        assert!(!beat.connectivity);
        assert_eq!(beat.latency, None);
    }

    // failed connects are retried on every tick, never cached
    assert_eq!(connector.attempts(), 3);
    assert!(!pool.contains(service.service.server_id).await);
}

#[tokio::test(start_paused = true)]
async fn test_unsafe_unit_name_never_reaches_the_host() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let (_, service) = seed_process_service(storage.as_ref(), "nginx;reboot", 10.0).await;
    let connector = Arc::new(ScriptedConnector::healthy());
    let pool = pool_with(storage.clone(), connector.clone());

    let handle = BeaterHandle::spawn(service.service.id, storage.clone(), pool);
    tokio::time::sleep(Duration::from_secs(5)).await;
    handle.abort();

    let beats = storage
        .query_beats(service.service.id, BeatQuery::default())
        .await
        .unwrap();
    assert_eq!(beats.len(), 1);
    assert!(!beats[0].active);
    assert!(!beats[0].connectivity);

    assert_eq!(connector.attempts(), 0);
    assert!(connector.commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_config_edits_apply_on_next_tick() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let (_, service) = seed_process_service(storage.as_ref(), "nginx", 10.0).await;
    let connector = Arc::new(ScriptedConnector::healthy());
    let pool = pool_with(storage.clone(), connector.clone());

    let handle = BeaterHandle::spawn(service.service.id, storage.clone(), pool);
    tokio::time::sleep(Duration::from_secs(5)).await;
    storage
        .update_config(service.service.id, process_config(60.0))
        .await
        .unwrap();

    // tick at 10s still runs, then the loop waits the new 60s interval
    tokio::time::sleep(Duration::from_secs(60)).await;
    handle.abort();

    assert_eq!(connector.commands().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_storage_read_error_still_records_a_beat() {
    let storage = Arc::new(CountingStorage::default());
    let (_, service) = seed_process_service(storage.as_ref(), "nginx", 30.0).await;
    storage.fail_service_reads(1);
    let connector = Arc::new(ScriptedConnector::healthy());
    let pool = pool_with(storage.clone(), connector.clone());

    let handle = BeaterHandle::spawn(service.service.id, storage.clone(), pool);
    tokio::time::sleep(Duration::from_secs(15)).await;
    handle.abort();

    // the failed read is retried after 10s instead of the 30s interval
    let beats = storage
        .query_beats(service.service.id, BeatQuery::default())
        .await
        .unwrap();
    assert_eq!(beats.len(), 2);
    assert!(!beats[0].active);
    assert!(!beats[0].connectivity);
    assert!(beats[1].active);
    assert_eq!(connector.commands().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_launches_one_scheduler_per_service() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let (server, service) = seed_process_service(storage.as_ref(), "nginx", 10.0).await;
    let worker = storage
        .create_service(
            NewService {
                server_id: server.id,
                name: "worker".to_string(),
            },
            process_config(10.0),
        )
        .await
        .unwrap();
    let connector = Arc::new(ScriptedConnector::healthy());
    let monitor = Monitor::new(storage.clone(), connector.clone(), MonitorSettings::default());

    monitor.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(monitor.running_schedulers().await, 2);
    for id in [service.service.id, worker.service.id] {
        assert_eq!(monitor.scheduler_state(id).await, Some(SchedulerState::Running));
    }
    // the warm-up and both first ticks share one connect
    assert_eq!(connector.attempts(), 1);
    assert!(monitor.pool().contains(server.id).await);
    assert_eq!(connector.commands().len(), 2);

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_server_deletion_drops_session_and_stops_schedulers() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let (server, service) = seed_process_service(storage.as_ref(), "nginx", 10.0).await;
    let connector = Arc::new(ScriptedConnector::healthy());
    let monitor = Monitor::new(storage.clone(), connector.clone(), MonitorSettings::default());

    monitor.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(15)).await;
    let beats = storage
        .query_beats(service.service.id, BeatQuery::default())
        .await
        .unwrap();
    assert_eq!(beats.len(), 2);
    assert_eq!(connector.attempts(), 1);

    monitor.server_deleted(server.id).await;
    assert!(!monitor.pool().contains(server.id).await);
    assert_eq!(monitor.pool().slot_count().await, 0);

    // the server row still exists, so the next tick reconnects through storage
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(monitor.pool().contains(server.id).await);
    assert_eq!(connector.attempts(), 2);

    assert!(storage.delete_server(server.id).await.unwrap());
    monitor.server_deleted(server.id).await;
    tokio::time::timeout(
        Duration::from_secs(60),
        monitor.scheduler_stopped(service.service.id),
    )
    .await
    .expect("scheduler should stop once its server is gone");

    assert_eq!(monitor.running_schedulers().await, 0);
    // stopped schedulers are forgotten once counted
    assert_eq!(monitor.scheduler_state(service.service.id).await, None);
    assert!(!monitor.pool().contains(server.id).await);
    assert_eq!(connector.attempts(), 2);

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_server_update_renews_the_session() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let server = storage.create_server(new_server("web-1")).await.unwrap();
    let connector = Arc::new(ScriptedConnector::healthy());
    let monitor = Monitor::new(storage.clone(), connector.clone(), MonitorSettings::default());

    monitor.server_created(server.id);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(connector.attempts(), 1);
    let old = monitor.pool().get(server.id).await.unwrap();
    assert_eq!(connector.attempts(), 1);

    let mut moved = new_server("web-1");
    moved.host = "10.0.0.6".to_string();
    storage.update_server(server.id, moved).await.unwrap();
    monitor.server_updated(server.id);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let renewed = monitor.pool().get(server.id).await.unwrap();
    assert!(!Arc::ptr_eq(&old, &renewed));
    assert!(!old.is_active());
    assert!(renewed.is_active());
    assert_eq!(connector.attempts(), 2);

    monitor.shutdown().await;
}
