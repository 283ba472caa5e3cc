use std::path::PathBuf;

use tracing::{info, trace, warn};

use crate::model::{CheckConfig, ConfigError, Credential, NewServer, NewService};
use crate::storage::{StorageBackend, StorageError};

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./heartbeat.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Storage configuration (optional - defaults to in-memory)
    pub storage: Option<StorageConfig>,

    /// HTTP/WebSocket adapter (optional - disabled when absent)
    pub api: Option<ApiSettings>,

    #[serde(default)]
    pub board: BoardConfig,

    /// Servers and services registered at startup when missing
    #[serde(default)]
    pub servers: Vec<SeedServer>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSettings {
    /// Bind address, `HEARTBEAT_ADDR` or 127.0.0.1 when absent
    pub bind: Option<String>,
    /// Port, `HEARTBEAT_PORT` or 8080 when absent
    pub port: Option<u16>,
    #[serde(default = "default_cors")]
    pub enable_cors: bool,
}

fn default_cors() -> bool {
    true
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BoardConfig {
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
    #[serde(default = "default_resource_interval")]
    pub resource_interval_secs: u64,
    /// Beats per service on the status board, `MAX_CHART_BARS` when absent
    pub max_chart_bars: Option<usize>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            status_interval_secs: default_status_interval(),
            resource_interval_secs: default_resource_interval(),
            max_chart_bars: None,
        }
    }
}

fn default_status_interval() -> u64 {
    10
}

fn default_resource_interval() -> u64 {
    1
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SeedServer {
    pub name: String,
    pub host: String,
    #[serde(default = "crate::util::get_default_ssh_port")]
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub key_file: Option<PathBuf>,
    #[serde(default)]
    pub services: Vec<SeedService>,
}

impl SeedServer {
    /// The single configured credential
    pub fn credential(&self) -> Result<Credential, ConfigError> {
        match (&self.password, &self.key_file) {
            (Some(password), None) => Ok(Credential::Password(password.clone())),
            (None, Some(path)) => Ok(Credential::KeyFile(path.clone())),
            _ => Err(ConfigError::AmbiguousCredential(self.name.clone())),
        }
    }

    pub fn to_new_server(&self) -> Result<NewServer, ConfigError> {
        Ok(NewServer {
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            credential: self.credential()?,
        })
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SeedService {
    pub name: String,
    #[serde(flatten)]
    pub config: CheckConfig,
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let config: Config = serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?;

    for server in &config.servers {
        server.credential()?;
        for service in &server.services {
            service
                .config
                .validate()
                .map_err(|e| anyhow::anyhow!("service `{}`: {e}", service.name))?;
        }
    }

    trace!("loaded config: {} seed server(s)", config.servers.len());
    Ok(config)
}

/// Register seed servers and services whose names are not taken yet.
///
/// Returns the number of records created.
pub async fn apply_seed(storage: &dyn StorageBackend, servers: &[SeedServer]) -> anyhow::Result<usize> {
    let mut created = 0;
    let existing_servers = storage.list_servers().await?;
    let existing_services = storage.list_services().await?;

    for seed in servers {
        let server = match existing_servers.iter().find(|server| server.name == seed.name) {
            Some(server) => server.clone(),
            None => {
                let server = storage.create_server(seed.to_new_server()?).await?;
                info!("registered server {} ({})", server.name, server.address());
                created += 1;
                server
            }
        };

        for service in &seed.services {
            if existing_services
                .iter()
                .any(|existing| existing.service.name == service.name)
            {
                continue;
            }

            let draft = NewService {
                server_id: server.id,
                name: service.name.clone(),
            };
            match storage.create_service(draft, service.config.clone()).await {
                Ok(service) => {
                    info!("registered {} service {}", service.service.service_type, service.service.name);
                    created += 1;
                }
                Err(StorageError::Conflict(msg)) => warn!("skipping seed service: {msg}"),
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(created)
}
