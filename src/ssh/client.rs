//! Production SSH transport on top of `russh`

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key;
use tracing::{debug, instrument, trace, warn};

use crate::model::{Credential, Server};

use super::session::{RemoteShell, SshConnector};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepts every host key, like an auto-add missing host key policy
struct AcceptingHandler;

#[async_trait]
impl client::Handler for AcceptingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Connects with the server's password or private key file
#[derive(Clone)]
pub struct RusshConnector {
    config: Arc<client::Config>,
    connect_timeout: Duration,
}

impl RusshConnector {
    pub fn new() -> Self {
        Self {
            config: Arc::new(client::Config::default()),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    async fn open(&self, server: &Server) -> anyhow::Result<Handle<AcceptingHandler>> {
        let mut handle = client::connect(
            self.config.clone(),
            (server.host.as_str(), server.port),
            AcceptingHandler,
        )
        .await
        .with_context(|| format!("failed to connect to {}", server.address()))?;

        let authenticated = match &server.credential {
            Credential::Password(password) => handle
                .authenticate_password(server.username.clone(), password.clone())
                .await
                .context("password authentication failed")?,
            Credential::KeyFile(path) => {
                let key_pair = russh_keys::load_secret_key(path, None)
                    .with_context(|| format!("failed to load key file {}", path.display()))?;
                handle
                    .authenticate_publickey(server.username.clone(), Arc::new(key_pair))
                    .await
                    .context("public key authentication failed")?
            }
        };

        if !authenticated {
            bail!("{} rejected credentials for {}", server.address(), server.username);
        }

        Ok(handle)
    }
}

impl Default for RusshConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SshConnector for RusshConnector {
    #[instrument(skip(self, server), fields(server = %server.name, address = %server.address()))]
    async fn connect(&self, server: &Server) -> anyhow::Result<Box<dyn RemoteShell>> {
        debug!("opening ssh session");

        let handle = tokio::time::timeout(self.connect_timeout, self.open(server))
            .await
            .with_context(|| {
                format!(
                    "connecting to {} timed out after {:?}",
                    server.address(),
                    self.connect_timeout
                )
            })??;

        debug!("ssh session established");
        Ok(Box::new(RusshShell { handle }))
    }
}

pub struct RusshShell {
    handle: Handle<AcceptingHandler>,
}

#[async_trait]
impl RemoteShell for RusshShell {
    async fn exec(&self, command: &str) -> anyhow::Result<String> {
        trace!("exec: {command}");

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .context("failed to open session channel")?;
        channel
            .exec(true, command)
            .await
            .context("failed to start remote command")?;

        let mut stdout = Vec::new();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status } if exit_status != 0 => {
                    trace!("remote command exited with {exit_status}");
                }
                _ => {}
            }
        }

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    fn is_active(&self) -> bool {
        !self.handle.is_closed()
    }

    async fn close(&self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            warn!("error while closing ssh session: {e}");
        }
    }
}
