//! Check strategies
//!
//! A strategy turns a service config into one remote command and turns that
//! command's output into a [`CheckOutcome`]. Strategies never fail past
//! [`CheckStrategy::check`]: every error becomes an inactive outcome.
//!
//! ```text
//! CheckConfig ──► strategy_for() ──► command() ──► SshSession::exec() ──► evaluate()
//!                                        │                  │                  │
//!                                   Validation         Connectivity          Parse
//!                                        └──────────────────┴──────────────────┘
//!                                                           ▼
//!                                                  CheckOutcome::failed()
//! ```

pub mod log_tail;
pub mod online;
pub mod operator;
pub mod process;

use std::fmt;

use async_trait::async_trait;
use tracing::{trace, warn};

use crate::model::{CheckConfig, ServiceWithConfig};
use crate::ssh::{SessionPool, SshSession};

pub use log_tail::LogTailCheck;
pub use online::OnlineCheck;
pub use operator::Operator;
pub use process::ProcessStatusCheck;

/// The result of one check, before it is stamped into a beat
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckOutcome {
    pub active: bool,
    pub latency: Option<f64>,
    pub connectivity: bool,
}

impl CheckOutcome {
    /// `(false, none, false)`, the outcome of any failed check
    pub fn failed() -> Self {
        Self {
            active: false,
            latency: None,
            connectivity: false,
        }
    }

    pub fn reached(active: bool, latency: Option<f64>) -> Self {
        Self {
            active,
            latency,
            connectivity: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckError {
    /// Host unreachable, authentication failed or the remote command errored
    Connectivity(String),
    /// Unsafe service name or unusable config, detected before any command is sent
    Validation(String),
    /// Remote output did not have the expected shape
    Parse(String),
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckError::Connectivity(msg) => write!(f, "connectivity error: {msg}"),
            CheckError::Validation(msg) => write!(f, "validation error: {msg}"),
            CheckError::Parse(msg) => write!(f, "unexpected check output: {msg}"),
        }
    }
}

impl std::error::Error for CheckError {}

#[async_trait]
pub trait CheckStrategy: Send + Sync {
    /// The remote command for this check. Validation happens here.
    fn command(&self) -> Result<String, CheckError>;

    /// Interpret the remote command's stdout
    fn evaluate(&self, output: &str) -> Result<CheckOutcome, CheckError>;

    async fn check(&self, session: &SshSession) -> CheckOutcome {
        let command = match self.command() {
            Ok(command) => command,
            Err(e) => {
                warn!("{e}");
                return CheckOutcome::failed();
            }
        };

        trace!("running check command: {command}");
        let output = match session.exec(&command).await {
            Ok(output) => output,
            Err(e) => {
                warn!("{}", CheckError::Connectivity(format!("{e:#}")));
                return CheckOutcome::failed();
            }
        };

        self.evaluate(&output).unwrap_or_else(|e| {
            warn!("{e}");
            CheckOutcome::failed()
        })
    }
}

/// Shell metacharacters refused in unit names
const DENYLIST: &[char] = &[
    '~', '!', '@', '#', '$', '%', '^', '&', '*', '(', ')', '+', '|', '}', '{', '<', '>', '?', '"',
    ':', '\'', '\\', '/', ',', ';', '`',
];

/// Reject unit names that could escape the composed shell command or be
/// read as a command line option
pub fn ensure_safe_unit_name(name: &str) -> Result<(), CheckError> {
    if name.is_empty() {
        return Err(CheckError::Validation("service name is empty".to_string()));
    }

    // systemctl and journalctl would parse it as an option
    if name.starts_with('-') {
        return Err(CheckError::Validation(format!(
            "service name {name:?} must not start with '-'"
        )));
    }

    if let Some(c) = name
        .chars()
        .find(|c| DENYLIST.contains(c) || c.is_whitespace() || c.is_control())
    {
        return Err(CheckError::Validation(format!(
            "service name {name:?} contains forbidden character {c:?}"
        )));
    }

    Ok(())
}

/// Pick the strategy matching the config variant
pub fn strategy_for(service: &ServiceWithConfig) -> Box<dyn CheckStrategy> {
    match &service.config {
        CheckConfig::Online(config) => Box::new(OnlineCheck::new(config.clone())),
        CheckConfig::ProcessStatus(_) => Box::new(ProcessStatusCheck::new(&service.service.name)),
        CheckConfig::LogTail(config) => {
            Box::new(LogTailCheck::new(&service.service.name, config.clone()))
        }
    }
}

/// Run one check for `service` against its server's pooled session.
///
/// Validation runs before the pool is asked for a session, so an unsafe
/// name never causes a connect or a remote command.
pub async fn run_check(pool: &SessionPool, service: &ServiceWithConfig) -> CheckOutcome {
    let strategy = strategy_for(service);

    if let Err(e) = strategy.command() {
        warn!(service = %service.service.name, "{e}");
        return CheckOutcome::failed();
    }

    let Some(session) = pool.get(service.service.server_id).await else {
        return CheckOutcome::failed();
    };

    strategy.check(&session).await
}
