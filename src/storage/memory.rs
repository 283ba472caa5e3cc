//! In-memory storage backend (no persistence)
//!
//! Useful for:
//! - Testing without database dependencies
//! - Running without a storage section in the config file
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Unbounded beat log**: Beats are only dropped with their service

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::model::{
    Beat, BeatQuery, CheckConfig, NewServer, NewService, Server, ServerId, Service, ServiceId,
    ServiceWithConfig,
};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};

#[derive(Default)]
struct State {
    next_server_id: ServerId,
    next_service_id: ServiceId,
    servers: BTreeMap<ServerId, Server>,
    services: BTreeMap<ServiceId, ServiceWithConfig>,
    /// Beats per service in insertion order
    beats: HashMap<ServiceId, Vec<Beat>>,
}

impl State {
    fn server_name_taken(&self, name: &str, except: Option<ServerId>) -> bool {
        self.servers
            .values()
            .any(|server| server.name == name && Some(server.id) != except)
    }

    fn remove_service(&mut self, id: ServiceId) -> bool {
        self.beats.remove(&id);
        self.services.remove(&id).is_some()
    }
}

/// In-memory storage backend
///
/// All state lives behind a single `RwLock`, so every trait method is atomic.
#[derive(Default)]
pub struct MemoryBackend {
    state: RwLock<State>,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn create_server(&self, server: NewServer) -> StorageResult<Server> {
        let mut state = self.state.write().await;
        if state.server_name_taken(&server.name, None) {
            return Err(StorageError::Conflict(format!(
                "server name `{}` is taken",
                server.name
            )));
        }

        state.next_server_id += 1;
        let server = server.into_server(state.next_server_id);
        state.servers.insert(server.id, server.clone());
        debug!("created server {} ({})", server.id, server.name);
        Ok(server)
    }

    async fn get_server(&self, id: ServerId) -> StorageResult<Option<Server>> {
        Ok(self.state.read().await.servers.get(&id).cloned())
    }

    async fn list_servers(&self) -> StorageResult<Vec<Server>> {
        Ok(self.state.read().await.servers.values().cloned().collect())
    }

    async fn update_server(&self, id: ServerId, server: NewServer) -> StorageResult<Option<Server>> {
        let mut state = self.state.write().await;
        if !state.servers.contains_key(&id) {
            return Ok(None);
        }
        if state.server_name_taken(&server.name, Some(id)) {
            return Err(StorageError::Conflict(format!(
                "server name `{}` is taken",
                server.name
            )));
        }

        let server = server.into_server(id);
        state.servers.insert(id, server.clone());
        Ok(Some(server))
    }

    async fn delete_server(&self, id: ServerId) -> StorageResult<bool> {
        let mut state = self.state.write().await;
        if state.servers.remove(&id).is_none() {
            return Ok(false);
        }

        let dependent: Vec<ServiceId> = state
            .services
            .values()
            .filter(|service| service.service.server_id == id)
            .map(|service| service.service.id)
            .collect();
        for service_id in dependent {
            state.remove_service(service_id);
        }
        Ok(true)
    }

    async fn create_service(
        &self,
        service: NewService,
        config: CheckConfig,
    ) -> StorageResult<ServiceWithConfig> {
        config.validate()?;

        let mut state = self.state.write().await;
        if !state.servers.contains_key(&service.server_id) {
            return Err(StorageError::NotFound(format!(
                "server {} does not exist",
                service.server_id
            )));
        }
        if state
            .services
            .values()
            .any(|existing| existing.service.name == service.name)
        {
            return Err(StorageError::Conflict(format!(
                "service name `{}` is taken",
                service.name
            )));
        }

        state.next_service_id += 1;
        let created = ServiceWithConfig {
            service: Service {
                id: state.next_service_id,
                server_id: service.server_id,
                name: service.name,
                service_type: config.service_type(),
            },
            config,
        };
        state.services.insert(created.service.id, created.clone());
        state.beats.insert(created.service.id, Vec::new());
        debug!("created service {} ({})", created.service.id, created.service.name);
        Ok(created)
    }

    async fn get_service(&self, id: ServiceId) -> StorageResult<Option<ServiceWithConfig>> {
        Ok(self.state.read().await.services.get(&id).cloned())
    }

    async fn list_services(&self) -> StorageResult<Vec<ServiceWithConfig>> {
        Ok(self.state.read().await.services.values().cloned().collect())
    }

    async fn update_config(
        &self,
        id: ServiceId,
        config: CheckConfig,
    ) -> StorageResult<Option<ServiceWithConfig>> {
        config.validate()?;

        let mut state = self.state.write().await;
        let Some(existing) = state.services.get_mut(&id) else {
            return Ok(None);
        };
        if existing.service.service_type != config.service_type() {
            return Err(StorageError::InvalidConfig(format!(
                "service {id} is a {} service, got a {} config",
                existing.service.service_type,
                config.service_type()
            )));
        }

        existing.config = config;
        Ok(Some(existing.clone()))
    }

    async fn delete_service(&self, id: ServiceId) -> StorageResult<bool> {
        Ok(self.state.write().await.remove_service(id))
    }

    async fn insert_beat(&self, beat: Beat) -> StorageResult<()> {
        let mut state = self.state.write().await;
        match state.beats.get_mut(&beat.service_id) {
            Some(beats) => {
                beats.push(beat);
                Ok(())
            }
            None => Err(StorageError::NotFound(format!(
                "service {} does not exist",
                beat.service_id
            ))),
        }
    }

    async fn query_latest_beats(&self, service_id: ServiceId, limit: usize) -> StorageResult<Vec<Beat>> {
        let state = self.state.read().await;
        let beats = state
            .beats
            .get(&service_id)
            .map(|beats| beats.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default();
        Ok(beats)
    }

    async fn query_beats(&self, service_id: ServiceId, query: BeatQuery) -> StorageResult<Vec<Beat>> {
        let state = self.state.read().await;
        let Some(beats) = state.beats.get(&service_id) else {
            return Ok(Vec::new());
        };

        let matching: Vec<&Beat> = beats
            .iter()
            .filter(|beat| query.start.is_none_or(|start| beat.timestamp >= start))
            .filter(|beat| query.end.is_none_or(|end| beat.timestamp <= end))
            .collect();

        let skip = query
            .limit
            .map_or(0, |limit| matching.len().saturating_sub(limit));
        Ok(matching.into_iter().skip(skip).cloned().collect())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let state = self.state.read().await;
        let total_beats: usize = state.beats.values().map(Vec::len).sum();

        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("servers".to_string(), state.servers.len().to_string()),
                ("services".to_string(), state.services.len().to_string()),
                ("beats".to_string(), total_beats.to_string()),
            ]),
        })
    }
}
