//! Monitored targets and the facts recorded about them
//!
//! A [`Server`] is an SSH-reachable host. Each [`Service`] belongs to exactly one
//! server and owns exactly one [`CheckConfig`]; the variant of that config fixes the
//! service's [`ServiceType`] for its whole lifetime. Every scheduler tick appends
//! one [`Beat`].

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checks::{CheckOutcome, Operator};

pub type ServerId = i64;
pub type ServiceId = i64;

/// Lower bound for every check interval, in seconds
pub const MIN_INTERVAL_SECS: f64 = 10.0;

/// Interval used when a config does not name one (30 minutes)
pub const DEFAULT_INTERVAL_SECS: f64 = 1800.0;

fn default_interval() -> f64 {
    DEFAULT_INTERVAL_SECS
}

// ============================================================================
// Servers
// ============================================================================

/// How the pool authenticates against a server. Exactly one is configured.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credential {
    Password(String),
    KeyFile(PathBuf),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(<redacted>)"),
            Credential::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: ServerId,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub credential: Credential,
}

impl Server {
    /// `host:port`, used in log lines
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Fields of a server before the registry assigns its id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewServer {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
}

impl NewServer {
    pub fn into_server(self, id: ServerId) -> Server {
        Server {
            id,
            name: self.name,
            host: self.host,
            port: self.port,
            username: self.username,
            credential: self.credential,
        }
    }
}

// ============================================================================
// Services and their check configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Online,
    ProcessStatus,
    LogTail,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Online => "online",
            ServiceType::ProcessStatus => "process_status",
            ServiceType::LogTail => "log_tail",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServiceType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(ServiceType::Online),
            "process_status" => Ok(ServiceType::ProcessStatus),
            "log_tail" => Ok(ServiceType::LogTail),
            other => Err(ConfigError::UnknownServiceType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// Which part of the probe response is compared against `desired_response`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    #[default]
    StatusCode,
    Content,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineConfig {
    #[serde(default)]
    pub method: HttpMethod,
    pub url: String,
    pub desired_response: String,
    #[serde(default = "Operator::default_online")]
    pub operator: Operator,
    #[serde(default)]
    pub target: Target,
    /// JSON request body, sent with POST only
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default = "default_interval")]
    pub interval: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStatusConfig {
    #[serde(default = "default_interval")]
    pub interval: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogTailConfig {
    pub desired_response: String,
    #[serde(default = "Operator::default_log_tail")]
    pub operator: Operator,
    #[serde(default = "default_interval")]
    pub interval: f64,
}

/// Type-specific check parameters, one variant per [`ServiceType`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckConfig {
    Online(OnlineConfig),
    ProcessStatus(ProcessStatusConfig),
    LogTail(LogTailConfig),
}

impl CheckConfig {
    pub fn service_type(&self) -> ServiceType {
        match self {
            CheckConfig::Online(_) => ServiceType::Online,
            CheckConfig::ProcessStatus(_) => ServiceType::ProcessStatus,
            CheckConfig::LogTail(_) => ServiceType::LogTail,
        }
    }

    /// Seconds between two ticks of the service's scheduler
    pub fn interval(&self) -> f64 {
        match self {
            CheckConfig::Online(config) => config.interval,
            CheckConfig::ProcessStatus(config) => config.interval,
            CheckConfig::LogTail(config) => config.interval,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let interval = self.interval();
        if !interval.is_finite() || interval < MIN_INTERVAL_SECS {
            return Err(ConfigError::IntervalTooShort(interval));
        }

        match self {
            CheckConfig::Online(config) => {
                if config.url.trim().is_empty() {
                    return Err(ConfigError::MissingField("url"));
                }
            }
            CheckConfig::ProcessStatus(_) => {}
            CheckConfig::LogTail(config) => {
                if !config.operator.is_containment() {
                    return Err(ConfigError::UnsupportedOperator {
                        service_type: ServiceType::LogTail,
                        operator: config.operator,
                    });
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub server_id: ServerId,
    pub name: String,
    pub service_type: ServiceType,
}

/// Fields of a service before the registry assigns its id.
///
/// The service type is not part of the draft: it is taken from the config the
/// service is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewService {
    pub server_id: ServerId,
    pub name: String,
}

/// A service together with its (single) config row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceWithConfig {
    #[serde(flatten)]
    pub service: Service,
    pub config: CheckConfig,
}

/// Status board view: a service, its config and its most recent beats (newest first)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceWithBeats {
    #[serde(flatten)]
    pub service: Service,
    pub config: CheckConfig,
    pub beats: Vec<Beat>,
}

// ============================================================================
// Beats
// ============================================================================

/// One recorded health-check result. Never mutated after it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    pub service_id: ServiceId,
    pub active: bool,
    /// Probe round-trip in seconds (online checks only)
    pub latency: Option<f64>,
    /// Whether the host could be reached and the check executed
    pub connectivity: bool,
    pub timestamp: DateTime<Utc>,
}

impl Beat {
    pub fn from_outcome(service_id: ServiceId, timestamp: DateTime<Utc>, outcome: CheckOutcome) -> Self {
        Self {
            service_id,
            active: outcome.active,
            latency: outcome.latency,
            connectivity: outcome.connectivity,
            timestamp,
        }
    }
}

/// Historical beat query. Matching beats are returned oldest first; with a
/// `limit`, only the newest `limit` matches are kept.
#[derive(Debug, Clone, Default)]
pub struct BeatQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

// ============================================================================
// Errors
// ============================================================================

/// Invalid server, service or check configuration
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    IntervalTooShort(f64),
    MissingField(&'static str),
    UnsupportedOperator {
        service_type: ServiceType,
        operator: Operator,
    },
    UnknownServiceType(String),
    /// A server must carry exactly one of password and key file
    AmbiguousCredential(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IntervalTooShort(interval) => write!(
                f,
                "interval must be at least {MIN_INTERVAL_SECS}s, got {interval}s"
            ),
            ConfigError::MissingField(field) => write!(f, "missing required field `{field}`"),
            ConfigError::UnsupportedOperator {
                service_type,
                operator,
            } => write!(f, "operator `{operator}` is not supported for {service_type} checks"),
            ConfigError::UnknownServiceType(kind) => write!(f, "unknown service type `{kind}`"),
            ConfigError::AmbiguousCredential(server) => write!(
                f,
                "server `{server}` needs exactly one of `password` and `key_file`"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
