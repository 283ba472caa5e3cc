//! Storage backend trait definition
//!
//! The backend is both the target registry (servers, services and their
//! configs) and the append-only beat log.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::model::{
    Beat, BeatQuery, CheckConfig, NewServer, NewService, Server, ServerId, ServiceId,
    ServiceWithBeats, ServiceWithConfig,
};

use super::error::StorageResult;

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for storage backends
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared by every
/// scheduler, both boards and the API.
///
/// ## Atomicity
///
/// Every method is a single atomic operation. Creating a service writes the
/// service and its config together; deleting a server or service cascades to
/// everything that depends on it.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    // ========================================================================
    // Servers
    // ========================================================================

    /// Register a server. Fails with `Conflict` if the name is taken.
    async fn create_server(&self, server: NewServer) -> StorageResult<Server>;

    async fn get_server(&self, id: ServerId) -> StorageResult<Option<Server>>;

    async fn list_servers(&self) -> StorageResult<Vec<Server>>;

    /// Replace a server's fields. Returns `None` for an unknown id.
    async fn update_server(&self, id: ServerId, server: NewServer) -> StorageResult<Option<Server>>;

    /// Delete a server with its services, configs and beats.
    /// Returns whether the server existed.
    async fn delete_server(&self, id: ServerId) -> StorageResult<bool>;

    // ========================================================================
    // Services
    // ========================================================================

    /// Register a service together with its config.
    ///
    /// The service type is taken from the config variant. Fails with
    /// `InvalidConfig` for an invalid config, `NotFound` for an unknown
    /// server and `Conflict` for a taken name.
    async fn create_service(
        &self,
        service: NewService,
        config: CheckConfig,
    ) -> StorageResult<ServiceWithConfig>;

    async fn get_service(&self, id: ServiceId) -> StorageResult<Option<ServiceWithConfig>>;

    /// All services, ordered by id
    async fn list_services(&self) -> StorageResult<Vec<ServiceWithConfig>>;

    /// Replace a service's config.
    ///
    /// The variant must match the service's type; a service never changes
    /// type. Returns `None` for an unknown id.
    async fn update_config(
        &self,
        id: ServiceId,
        config: CheckConfig,
    ) -> StorageResult<Option<ServiceWithConfig>>;

    /// Delete a service with its config and beats. Returns whether it existed.
    async fn delete_service(&self, id: ServiceId) -> StorageResult<bool>;

    // ========================================================================
    // Beats
    // ========================================================================

    /// Append one beat to its service's log
    async fn insert_beat(&self, beat: Beat) -> StorageResult<()>;

    /// The `limit` most recent beats of a service, newest first
    async fn query_latest_beats(&self, service_id: ServiceId, limit: usize)
    -> StorageResult<Vec<Beat>>;

    /// Beats of a service inside the query's time range, oldest first.
    /// With a limit only the newest `limit` matches are returned.
    async fn query_beats(&self, service_id: ServiceId, query: BeatQuery) -> StorageResult<Vec<Beat>>;

    /// Every service with its config and `limit` most recent beats
    async fn services_with_beats(&self, limit: usize) -> StorageResult<Vec<ServiceWithBeats>> {
        let services = self.list_services().await?;
        let mut result = Vec::with_capacity(services.len());

        for ServiceWithConfig { service, config } in services {
            let beats = self.query_latest_beats(service.id, limit).await?;
            result.push(ServiceWithBeats {
                service,
                config,
                beats,
            });
        }

        Ok(result)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend is operational.
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Release backend resources (connection pools, file handles)
    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
