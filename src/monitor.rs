//! The process-scoped monitoring core
//!
//! [`Monitor`] owns the session pool, both hubs, the storage handle and the
//! running schedulers. It is built once at startup and shared by reference;
//! the registry/API side calls its lifecycle hooks after each change.
//!
//! | hook | effect |
//! |---|---|
//! | [`Monitor::start`] | one scheduler per stored service, warm sessions, both boards |
//! | [`Monitor::server_created`] | warm the session in the background |
//! | [`Monitor::server_updated`] | renew the session in the background |
//! | [`Monitor::server_deleted`] | drop the pooled session |
//! | [`Monitor::service_created`] | launch the service's scheduler |
//!
//! Service updates and deletions need no hook: schedulers re-read their
//! service on every tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::actors::{BeaterHandle, ResourceBoard, SchedulerState, StatusBoard};
use crate::actors::live_board::{DEFAULT_RESOURCE_PERIOD, DEFAULT_STATUS_PERIOD};
use crate::broadcast::{ChannelId, Hub, Subscriber, SubscriberId};
use crate::model::{Beat, BeatQuery, ServerId, ServiceId};
use crate::ssh::{SessionPool, SshConnector};
use crate::storage::{StorageBackend, StorageResult};

pub const DEFAULT_MAX_CHART_BARS: usize = 50;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub status_period: Duration,
    pub resource_period: Duration,
    /// Beats per service on the status board
    pub max_chart_bars: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            status_period: DEFAULT_STATUS_PERIOD,
            resource_period: DEFAULT_RESOURCE_PERIOD,
            max_chart_bars: DEFAULT_MAX_CHART_BARS,
        }
    }
}

pub struct Monitor {
    storage: Arc<dyn StorageBackend>,
    pool: Arc<SessionPool>,
    service_hub: Arc<Hub>,
    server_hub: Arc<Hub>,
    beaters: RwLock<HashMap<ServiceId, BeaterHandle>>,
    boards: Mutex<Vec<JoinHandle<()>>>,
    settings: MonitorSettings,
}

impl Monitor {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        connector: Arc<dyn SshConnector>,
        settings: MonitorSettings,
    ) -> Self {
        let pool = Arc::new(SessionPool::new(storage.clone(), connector));

        Self {
            storage,
            pool,
            service_hub: Arc::new(Hub::new("services")),
            server_hub: Arc::new(Hub::new("servers")),
            beaters: RwLock::new(HashMap::new()),
            boards: Mutex::new(Vec::new()),
            settings,
        }
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    pub fn service_hub(&self) -> &Arc<Hub> {
        &self.service_hub
    }

    pub fn server_hub(&self) -> &Arc<Hub> {
        &self.server_hub
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Launch schedulers for every stored service, warm a session per stored
    /// server in the background and start both boards
    #[instrument(skip(self))]
    pub async fn start(&self) -> StorageResult<()> {
        for server in self.storage.list_servers().await? {
            self.server_created(server.id);
        }

        let services = self.storage.list_services().await?;
        info!("starting schedulers for {} service(s)", services.len());
        for service in services {
            self.service_created(service.service.id).await;
        }

        let status = StatusBoard::new(
            self.storage.clone(),
            self.service_hub.clone(),
            self.settings.status_period,
            self.settings.max_chart_bars,
        );
        let resources = ResourceBoard::new(
            self.pool.clone(),
            self.server_hub.clone(),
            self.settings.resource_period,
        );

        let mut boards = self.boards.lock().await;
        boards.push(tokio::spawn(status.run()));
        boards.push(tokio::spawn(resources.run()));

        Ok(())
    }

    /// Open the new server's session without blocking the caller
    pub fn server_created(&self, server_id: ServerId) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if pool.get(server_id).await.is_none() {
                warn!("could not warm session for server {server_id}");
            }
        });
    }

    /// Reconnect with the server's updated host or credentials, in the background
    pub fn server_updated(&self, server_id: ServerId) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if pool.renew(server_id).await.is_none() {
                warn!("could not renew session for server {server_id}");
            }
        });
    }

    /// Drop the deleted server's session. Its services' schedulers stop on their next wake.
    pub async fn server_deleted(&self, server_id: ServerId) {
        self.pool.disconnect(server_id).await;
    }

    /// Launch the scheduler for a new service.
    ///
    /// Returns `false` if a scheduler for this id is already running.
    pub async fn service_created(&self, service_id: ServiceId) -> bool {
        let mut beaters = self.beaters.write().await;
        beaters.retain(|_, handle| !handle.is_stopped());

        if let Some(existing) = beaters.get(&service_id)
            && !existing.is_stopped()
        {
            debug!("scheduler for service {service_id} is already running");
            return false;
        }

        let handle = BeaterHandle::spawn(service_id, self.storage.clone(), self.pool.clone());
        beaters.insert(service_id, handle);
        true
    }

    pub async fn scheduler_state(&self, service_id: ServiceId) -> Option<SchedulerState> {
        self.beaters
            .read()
            .await
            .get(&service_id)
            .map(BeaterHandle::state)
    }

    /// Wait until the scheduler of `service_id` has stopped. Returns
    /// immediately if there is no such scheduler or it was already forgotten.
    pub async fn scheduler_stopped(&self, service_id: ServiceId) {
        let state_rx = {
            let beaters = self.beaters.read().await;
            beaters.get(&service_id).map(|handle| handle.stopped_signal())
        };
        if let Some(signal) = state_rx {
            signal.await;
        }
    }

    /// Number of schedulers that have not stopped. Stopped ones are forgotten.
    pub async fn running_schedulers(&self) -> usize {
        let mut beaters = self.beaters.write().await;
        beaters.retain(|_, handle| !handle.is_stopped());
        beaters.len()
    }

    /// Historical beats of a service, oldest first
    pub async fn service_beats(&self, service_id: ServiceId, query: BeatQuery) -> StorageResult<Vec<Beat>> {
        self.storage.query_beats(service_id, query).await
    }

    // ========================================================================
    // Hub pass-through
    // ========================================================================

    pub async fn subscribe_services(&self, subscriber: Arc<dyn Subscriber>, channel: ChannelId) -> SubscriberId {
        self.service_hub.connect(subscriber, channel).await
    }

    pub async fn subscribe_servers(&self, subscriber: Arc<dyn Subscriber>, channel: ChannelId) -> SubscriberId {
        self.server_hub.connect(subscriber, channel).await
    }

    pub async fn unsubscribe_services(&self, id: SubscriberId) {
        self.service_hub.disconnect(id).await;
    }

    pub async fn unsubscribe_servers(&self, id: SubscriberId) {
        self.server_hub.disconnect(id).await;
    }

    /// Retarget a status board subscriber
    pub async fn change_channel(&self, id: SubscriberId, channel: ChannelId) -> bool {
        self.service_hub.change_channel(id, channel).await
    }

    /// Retarget a resource board subscriber
    pub async fn change_server_channel(&self, id: SubscriberId, channel: ChannelId) -> bool {
        self.server_hub.change_channel(id, channel).await
    }

    /// Stop every task and close every session
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        for board in self.boards.lock().await.drain(..) {
            board.abort();
        }
        for (_, beater) in self.beaters.write().await.drain() {
            beater.abort();
        }
        self.pool.shutdown().await;
        info!("monitor stopped");
    }
}
