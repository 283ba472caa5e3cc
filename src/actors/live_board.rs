//! Live boards - fixed-rate aggregation loops feeding the broadcast hubs
//!
//! ## Status board (services hub)
//!
//! ```text
//! every 10s: any subscriber? ─no─► skip
//!                 │yes
//!                 ▼
//!   services_with_beats(N) ─► { service_id: svc, -server_id: [svc..], 0: {server_id: [svc..]} }
//!                 ─► auto_broadcast
//! ```
//!
//! ## Resource board (servers hub)
//!
//! ```text
//! every 1s: any subscriber? ─no─► skip
//!                 │yes
//!                 ▼
//!   pooled sessions ─► is_active + get_server_stats ─► { 0: {server_id: entry}, server_id: entry }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, instrument, trace};

use crate::broadcast::{ChannelId, Hub};
use crate::model::{ServerId, ServiceWithBeats};
use crate::ssh::SessionPool;
use crate::storage::StorageBackend;

pub const DEFAULT_STATUS_PERIOD: Duration = Duration::from_secs(10);
pub const DEFAULT_RESOURCE_PERIOD: Duration = Duration::from_secs(1);

/// Status board payloads for every channel convention
pub fn build_status_payloads(services: &[ServiceWithBeats]) -> HashMap<ChannelId, Value> {
    let mut payloads = HashMap::new();
    let mut by_server: BTreeMap<ServerId, Vec<Value>> = BTreeMap::new();

    for service in services {
        let value = match serde_json::to_value(service) {
            Ok(value) => value,
            Err(e) => {
                error!("failed to serialize service {}: {e}", service.service.id);
                continue;
            }
        };

        by_server
            .entry(service.service.server_id)
            .or_default()
            .push(value.clone());
        payloads.insert(ChannelId::service(service.service.id), value);
    }

    let mut global = serde_json::Map::new();
    for (server_id, services) in by_server {
        payloads.insert(ChannelId::server(server_id), Value::Array(services.clone()));
        global.insert(server_id.to_string(), Value::Array(services));
    }
    payloads.insert(ChannelId::GLOBAL, Value::Object(global));

    payloads
}

/// Service/server status board
pub struct StatusBoard {
    storage: Arc<dyn StorageBackend>,
    hub: Arc<Hub>,
    period: Duration,
    max_beats: usize,
}

impl StatusBoard {
    pub fn new(storage: Arc<dyn StorageBackend>, hub: Arc<Hub>, period: Duration, max_beats: usize) -> Self {
        Self {
            storage,
            hub,
            period,
            max_beats,
        }
    }

    #[instrument(skip(self), fields(period = ?self.period, max_beats = self.max_beats))]
    pub async fn run(self) {
        debug!("starting status board");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.publish().await;
        }
    }

    /// One board pass. Returns the number of deliveries.
    pub async fn publish(&self) -> usize {
        if !self.hub.has_subscribers().await {
            trace!("no subscribers, skipping status board");
            return 0;
        }

        let services = match self.storage.services_with_beats(self.max_beats).await {
            Ok(services) => services,
            Err(e) => {
                error!("failed to load services for status board: {e}");
                return 0;
            }
        };

        self.hub
            .auto_broadcast(build_status_payloads(&services))
            .await
    }
}

/// Host resource board
pub struct ResourceBoard {
    pool: Arc<SessionPool>,
    hub: Arc<Hub>,
    period: Duration,
}

impl ResourceBoard {
    pub fn new(pool: Arc<SessionPool>, hub: Arc<Hub>, period: Duration) -> Self {
        Self { pool, hub, period }
    }

    #[instrument(skip(self), fields(period = ?self.period))]
    pub async fn run(self) {
        debug!("starting resource board");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.publish().await;
        }
    }

    /// `{ "active": bool, "status": stats|null }` for every pooled session
    pub async fn collect(&self) -> BTreeMap<ServerId, Value> {
        let mut entries = BTreeMap::new();

        for session in self.pool.sessions().await {
            let active = self.pool.is_active(&session, 0).await;
            let stats = if active {
                self.pool.get_server_stats(&session, 0).await
            } else {
                None
            };
            entries.insert(
                session.server_id(),
                json!({ "active": active, "status": stats }),
            );
        }

        entries
    }

    /// One board pass. Returns the number of deliveries.
    pub async fn publish(&self) -> usize {
        if !self.hub.has_subscribers().await {
            trace!("no subscribers, skipping resource board");
            return 0;
        }

        let entries = self.collect().await;

        let mut payloads: Vec<(ChannelId, Value)> = entries
            .iter()
            .map(|(server_id, entry)| (ChannelId::host(*server_id), entry.clone()))
            .collect();
        let global = entries
            .into_iter()
            .map(|(server_id, entry)| (server_id.to_string(), entry))
            .collect::<serde_json::Map<_, _>>();
        payloads.push((ChannelId::GLOBAL, Value::Object(global)));

        self.hub.auto_broadcast(payloads).await
    }
}
