//! Server-keyed SSH session pool
//!
//! The pool owns at most one session per server. Each server id maps to a
//! slot guarded by its own mutex, so connect, renew and disconnect for one
//! server are serialized while other servers proceed independently. The outer
//! map lock is only held long enough to look up or insert a slot.
//!
//! ```text
//! get(id) ──► slots[id].lock() ──► cached & active? ──yes──► Arc<SshSession>
//!                                        │no
//!                                        ▼
//!                          storage.get_server(id) ──► connector.connect()
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::model::ServerId;
use crate::storage::StorageBackend;

use super::session::{SshConnector, SshSession};
use super::stats::{self, ServerStats};

type Slot = Arc<Mutex<Option<Arc<SshSession>>>>;

pub struct SessionPool {
    storage: Arc<dyn StorageBackend>,
    connector: Arc<dyn SshConnector>,
    slots: RwLock<HashMap<ServerId, Slot>>,
}

impl SessionPool {
    pub fn new(storage: Arc<dyn StorageBackend>, connector: Arc<dyn SshConnector>) -> Self {
        Self {
            storage,
            connector,
            slots: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, server_id: ServerId) -> Slot {
        if let Some(slot) = self.slots.read().await.get(&server_id) {
            return slot.clone();
        }
        self.slots
            .write()
            .await
            .entry(server_id)
            .or_default()
            .clone()
    }

    /// Return the live session for `server_id`, connecting if needed.
    ///
    /// Never fails past this point: an unknown server or a failed connect is
    /// logged and yields `None`. Failed connects are not cached.
    #[instrument(skip(self))]
    pub async fn get(&self, server_id: ServerId) -> Option<Arc<SshSession>> {
        let slot = self.slot(server_id).await;
        let mut cached = slot.lock().await;

        if let Some(session) = cached.as_ref() {
            if session.is_active() {
                trace!("reusing cached session");
                return Some(session.clone());
            }
            debug!("cached session is closed, reconnecting");
            *cached = None;
        }

        let session = self.connect(server_id).await?;
        *cached = Some(session.clone());
        Some(session)
    }

    async fn connect(&self, server_id: ServerId) -> Option<Arc<SshSession>> {
        let server = match self.storage.get_server(server_id).await {
            Ok(Some(server)) => server,
            Ok(None) => {
                warn!("server {server_id} does not exist");
                return None;
            }
            Err(e) => {
                error!("failed to load server {server_id}: {e}");
                return None;
            }
        };

        match self.connector.connect(&server).await {
            Ok(shell) => {
                info!("connected to {} ({})", server.name, server.address());
                Some(Arc::new(SshSession::new(server_id, shell)))
            }
            Err(e) => {
                warn!("could not connect to {} ({}): {e:#}", server.name, server.address());
                None
            }
        }
    }

    /// Liveness probe. A dead session is renewed up to `retries` times.
    pub async fn is_active(&self, session: &Arc<SshSession>, retries: u32) -> bool {
        let mut current = session.clone();
        let mut remaining = retries;

        loop {
            if current.is_active() {
                return true;
            }
            if remaining == 0 {
                return false;
            }
            remaining -= 1;

            debug!(server_id = current.server_id(), "session is dead, renewing");
            if let Some(renewed) = self.renew(current.server_id()).await {
                current = renewed;
            }
        }
    }

    /// Drop the current session for `server_id` and open a fresh one
    #[instrument(skip(self))]
    pub async fn renew(&self, server_id: ServerId) -> Option<Arc<SshSession>> {
        let slot = self.slot(server_id).await;
        let mut cached = slot.lock().await;

        if let Some(old) = cached.take() {
            close_detached(old);
        }

        let session = self.connect(server_id).await;
        *cached = session.clone();
        session
    }

    /// Remove the session for `server_id`, closing it in the background.
    /// Calling this for a server without a session is a no-op.
    ///
    /// The slot itself is dropped unless a concurrent caller still holds it.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, server_id: ServerId) {
        let slot = self.slots.read().await.get(&server_id).cloned();
        let Some(slot) = slot else {
            return;
        };

        if let Some(old) = slot.lock().await.take() {
            debug!("disconnecting");
            close_detached(old);
        }
        drop(slot);

        let mut slots = self.slots.write().await;
        // only the map holds an unused slot; any other reference is a caller
        // that is about to lock it
        let unused = slots.get(&server_id).is_some_and(|slot| {
            Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|cached| cached.is_none())
        });
        if unused {
            slots.remove(&server_id);
            trace!("dropped slot");
        }
    }

    /// Number of servers the pool currently keeps a slot for
    pub async fn slot_count(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Run the resource commands, retrying the whole bundle up to `retries` times
    pub async fn get_server_stats(
        &self,
        session: &SshSession,
        retries: u32,
    ) -> Option<ServerStats> {
        for attempt in 0..=retries {
            match stats::collect(session).await {
                Ok(stats) => return Some(stats),
                Err(e) => warn!(
                    server_id = session.server_id(),
                    "collecting server stats failed (attempt {}): {e:#}",
                    attempt + 1
                ),
            }
        }
        None
    }

    /// Snapshot of the cached sessions, live or not.
    ///
    /// Slots currently locked by a connect or renew are skipped.
    pub async fn sessions(&self) -> Vec<Arc<SshSession>> {
        let slots = self.slots.read().await;
        let mut sessions: Vec<_> = slots
            .values()
            .filter_map(|slot| slot.try_lock().ok().and_then(|cached| cached.clone()))
            .collect();
        sessions.sort_by_key(|session| session.server_id());
        sessions
    }

    /// Whether a session is currently cached for `server_id`
    pub async fn contains(&self, server_id: ServerId) -> bool {
        let slot = self.slots.read().await.get(&server_id).cloned();
        match slot {
            Some(slot) => slot.lock().await.is_some(),
            None => false,
        }
    }

    /// Close every cached session
    pub async fn shutdown(&self) {
        let slots: Vec<Slot> = self.slots.read().await.values().cloned().collect();
        for slot in slots {
            if let Some(session) = slot.lock().await.take() {
                session.close().await;
            }
        }
    }
}

fn close_detached(session: Arc<SshSession>) {
    tokio::spawn(async move {
        session.close().await;
    });
}
