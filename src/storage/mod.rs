//! Storage backends for the target registry and the beat log
//!
//! This module provides a trait-based abstraction over where servers,
//! services, configs and beats live.
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` trait allows swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio tasks
//! - **Atomic per call**: Every method is one transaction
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database with bundled migrations
//! - **In-Memory** (fallback): No persistence, for testing or ephemeral runs
//!
//! ## Usage
//!
//! ```no_run
//! use heartbeat::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./heartbeat.db").await?;
//!     let services = backend.list_services().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tracing::info;

use crate::config::StorageConfig;

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;

/// Build the backend selected in the config file (in-memory when absent)
pub async fn build_storage(config: Option<&StorageConfig>) -> StorageResult<Arc<dyn StorageBackend>> {
    match config {
        None | Some(StorageConfig::None) => {
            info!("using in-memory storage, nothing will be persisted");
            Ok(Arc::new(MemoryBackend::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        Some(StorageConfig::Sqlite { path }) => Ok(Arc::new(sqlite::SqliteBackend::new(path).await?)),
        #[cfg(not(feature = "storage-sqlite"))]
        Some(StorageConfig::Sqlite { .. }) => Err(StorageError::InvalidConfig(
            "sqlite storage requires the `storage-sqlite` feature".to_string(),
        )),
    }
}
