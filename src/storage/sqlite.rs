//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of the `StorageBackend` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Schedulers append beats while boards and the API read
//! - **Cascades**: Foreign keys drop configs and beats with their service
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! ## Schema
//!
//! ```text
//! servers 1──N services 1──1 configs
//!                       1──N beats
//! ```
//!
//! A config row stores its interval in a column (so the database enforces the
//! minimum) and the full tagged config as JSON.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use crate::model::{
    Beat, BeatQuery, CheckConfig, Credential, NewServer, NewService, Server, ServerId, Service,
    ServiceId, ServiceType, ServiceWithConfig,
};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};

const SERVICE_COLUMNS: &str = r#"
    SELECT services.id, services.server_id, services.name, services.service_type, configs.body
    FROM services
    JOIN configs ON configs.service_id = services.id
"#;

/// SQLite storage backend
///
/// Stores the registry and the beat log in a local SQLite database file.
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for WAL mode with foreign keys enforced
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use heartbeat::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./heartbeat.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }

    fn server_from_row(row: &SqliteRow) -> StorageResult<Server> {
        let id: ServerId = row.try_get("id")?;
        let password: Option<String> = row.try_get("password")?;
        let key_file: Option<String> = row.try_get("key_file")?;

        let credential = match (password, key_file) {
            (Some(password), None) => Credential::Password(password),
            (None, Some(path)) => Credential::KeyFile(PathBuf::from(path)),
            _ => {
                return Err(StorageError::InvalidConfig(format!(
                    "server {id} has no single credential"
                )));
            }
        };

        let port: i64 = row.try_get("port")?;
        Ok(Server {
            id,
            name: row.try_get("name")?,
            host: row.try_get("host")?,
            port: u16::try_from(port)
                .map_err(|_| StorageError::InvalidConfig(format!("server {id} has port {port}")))?,
            username: row.try_get("username")?,
            credential,
        })
    }

    fn service_from_row(row: &SqliteRow) -> StorageResult<ServiceWithConfig> {
        let service_type: String = row.try_get("service_type")?;
        let body: String = row.try_get("body")?;

        Ok(ServiceWithConfig {
            service: Service {
                id: row.try_get("id")?,
                server_id: row.try_get("server_id")?,
                name: row.try_get("name")?,
                service_type: service_type.parse::<ServiceType>()?,
            },
            config: serde_json::from_str(&body)?,
        })
    }

    fn beat_from_row(row: &SqliteRow) -> StorageResult<Beat> {
        Ok(Beat {
            service_id: row.try_get("service_id")?,
            active: row.try_get("active")?,
            latency: row.try_get("latency")?,
            connectivity: row.try_get("connectivity")?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?),
        })
    }

    fn credential_columns(credential: &Credential) -> (Option<String>, Option<String>) {
        match credential {
            Credential::Password(password) => (Some(password.clone()), None),
            Credential::KeyFile(path) => (None, Some(path.to_string_lossy().to_string())),
        }
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self, server), fields(name = %server.name))]
    async fn create_server(&self, server: NewServer) -> StorageResult<Server> {
        let (password, key_file) = Self::credential_columns(&server.credential);

        let result = sqlx::query(
            r#"
            INSERT INTO servers (name, host, port, username, password, key_file)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&server.name)
        .bind(&server.host)
        .bind(i64::from(server.port))
        .bind(&server.username)
        .bind(password)
        .bind(key_file)
        .execute(&self.pool)
        .await?;

        Ok(server.into_server(result.last_insert_rowid()))
    }

    async fn get_server(&self, id: ServerId) -> StorageResult<Option<Server>> {
        let row = sqlx::query("SELECT * FROM servers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::server_from_row).transpose()
    }

    async fn list_servers(&self) -> StorageResult<Vec<Server>> {
        let rows = sqlx::query("SELECT * FROM servers ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::server_from_row).collect()
    }

    #[instrument(skip(self, server))]
    async fn update_server(&self, id: ServerId, server: NewServer) -> StorageResult<Option<Server>> {
        let (password, key_file) = Self::credential_columns(&server.credential);

        let result = sqlx::query(
            r#"
            UPDATE servers
            SET name = ?, host = ?, port = ?, username = ?, password = ?, key_file = ?
            WHERE id = ?
            "#,
        )
        .bind(&server.name)
        .bind(&server.host)
        .bind(i64::from(server.port))
        .bind(&server.username)
        .bind(password)
        .bind(key_file)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(server.into_server(id)))
    }

    #[instrument(skip(self))]
    async fn delete_server(&self, id: ServerId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM servers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, service, config), fields(name = %service.name))]
    async fn create_service(
        &self,
        service: NewService,
        config: CheckConfig,
    ) -> StorageResult<ServiceWithConfig> {
        config.validate()?;
        let body = serde_json::to_string(&config)?;
        let service_type = config.service_type();

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("INSERT INTO services (server_id, name, service_type) VALUES (?, ?, ?)")
            .bind(service.server_id)
            .bind(&service.name)
            .bind(service_type.as_str())
            .execute(&mut *tx)
            .await?;
        let id = result.last_insert_rowid();

        sqlx::query("INSERT INTO configs (service_id, interval, body) VALUES (?, ?, ?)")
            .bind(id)
            .bind(config.interval())
            .bind(body)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(ServiceWithConfig {
            service: Service {
                id,
                server_id: service.server_id,
                name: service.name,
                service_type,
            },
            config,
        })
    }

    async fn get_service(&self, id: ServiceId) -> StorageResult<Option<ServiceWithConfig>> {
        let row = sqlx::query(&format!("{SERVICE_COLUMNS} WHERE services.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::service_from_row).transpose()
    }

    async fn list_services(&self) -> StorageResult<Vec<ServiceWithConfig>> {
        let rows = sqlx::query(&format!("{SERVICE_COLUMNS} ORDER BY services.id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::service_from_row).collect()
    }

    #[instrument(skip(self, config))]
    async fn update_config(
        &self,
        id: ServiceId,
        config: CheckConfig,
    ) -> StorageResult<Option<ServiceWithConfig>> {
        config.validate()?;

        let Some(mut existing) = self.get_service(id).await? else {
            return Ok(None);
        };
        if existing.service.service_type != config.service_type() {
            return Err(StorageError::InvalidConfig(format!(
                "service {id} is a {} service, got a {} config",
                existing.service.service_type,
                config.service_type()
            )));
        }

        sqlx::query("UPDATE configs SET interval = ?, body = ? WHERE service_id = ?")
            .bind(config.interval())
            .bind(serde_json::to_string(&config)?)
            .bind(id)
            .execute(&self.pool)
            .await?;

        existing.config = config;
        Ok(Some(existing))
    }

    #[instrument(skip(self))]
    async fn delete_service(&self, id: ServiceId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM services WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_beat(&self, beat: Beat) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO beats (service_id, active, latency, connectivity, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(beat.service_id)
        .bind(beat.active)
        .bind(beat.latency)
        .bind(beat.connectivity)
        .bind(Self::timestamp_to_millis(&beat.timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query_latest_beats(&self, service_id: ServiceId, limit: usize) -> StorageResult<Vec<Beat>> {
        let rows = sqlx::query(
            r#"
            SELECT service_id, active, latency, connectivity, timestamp
            FROM beats
            WHERE service_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(service_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::beat_from_row).collect()
    }

    #[instrument(skip(self, query))]
    async fn query_beats(&self, service_id: ServiceId, query: BeatQuery) -> StorageResult<Vec<Beat>> {
        let start = query
            .start
            .as_ref()
            .map_or(i64::MIN, Self::timestamp_to_millis);
        let end = query.end.as_ref().map_or(i64::MAX, Self::timestamp_to_millis);
        // a negative LIMIT means no limit in SQLite
        let limit = query
            .limit
            .map_or(-1, |limit| i64::try_from(limit).unwrap_or(i64::MAX));

        let rows = sqlx::query(
            r#"
            SELECT service_id, active, latency, connectivity, timestamp
            FROM beats
            WHERE service_id = ? AND timestamp >= ? AND timestamp <= ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(service_id)
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut beats = rows
            .iter()
            .map(Self::beat_from_row)
            .collect::<StorageResult<Vec<_>>>()?;
        beats.reverse();
        debug!("query returned {} beats", beats.len());
        Ok(beats)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
