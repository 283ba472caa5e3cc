//! A pooled SSH session and the transport traits it is built on

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::model::{Server, ServerId};

/// Command execution over an established transport
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run `command` to completion and return its stdout
    async fn exec(&self, command: &str) -> anyhow::Result<String>;

    /// Whether the underlying transport is still open
    fn is_active(&self) -> bool;

    /// Close the transport. Errors are swallowed.
    async fn close(&self);
}

/// Opens authenticated transports to servers
#[async_trait]
pub trait SshConnector: Send + Sync {
    async fn connect(&self, server: &Server) -> anyhow::Result<Box<dyn RemoteShell>>;
}

/// One live SSH session, owned by the pool and lent out per call.
///
/// Commands on the same session are serialized: a session's remote exec is
/// single-flight, so every [`SshSession::exec`] holds the session's exec lock
/// for the duration of the remote command.
pub struct SshSession {
    server_id: ServerId,
    shell: Box<dyn RemoteShell>,
    exec_lock: Mutex<()>,
    established_at: DateTime<Utc>,
}

impl SshSession {
    pub fn new(server_id: ServerId, shell: Box<dyn RemoteShell>) -> Self {
        Self {
            server_id,
            shell,
            exec_lock: Mutex::new(()),
            established_at: Utc::now(),
        }
    }

    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }

    pub async fn exec(&self, command: &str) -> anyhow::Result<String> {
        let _guard = self.exec_lock.lock().await;
        self.shell.exec(command).await
    }

    pub fn is_active(&self) -> bool {
        self.shell.is_active()
    }

    pub async fn close(&self) {
        let _guard = self.exec_lock.lock().await;
        self.shell.close().await;
    }
}

impl fmt::Debug for SshSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshSession")
            .field("server_id", &self.server_id)
            .field("active", &self.is_active())
            .field("established_at", &self.established_at)
            .finish()
    }
}
