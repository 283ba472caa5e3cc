//! Subscriber registry with per-channel fan-out

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, instrument, trace, warn};

use super::ChannelId;
use super::subscriber::Subscriber;

/// Handle returned by [`Hub::connect`], used to retarget or remove a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Default)]
struct Membership {
    channels: HashMap<ChannelId, HashMap<SubscriberId, Arc<dyn Subscriber>>>,
    /// Which channel each subscriber currently belongs to
    index: HashMap<SubscriberId, ChannelId>,
}

impl Membership {
    fn remove(&mut self, id: SubscriberId) -> Option<(ChannelId, Arc<dyn Subscriber>)> {
        let channel = self.index.remove(&id)?;
        let members = self.channels.get_mut(&channel)?;
        let subscriber = members.remove(&id)?;
        if members.is_empty() {
            self.channels.remove(&channel);
        }
        Some((channel, subscriber))
    }

    fn insert(&mut self, id: SubscriberId, channel: ChannelId, subscriber: Arc<dyn Subscriber>) {
        self.channels
            .entry(channel)
            .or_default()
            .insert(id, subscriber);
        self.index.insert(id, channel);
    }
}

/// Channel-keyed subscriber registry.
///
/// Every subscriber belongs to exactly one channel. Membership changes
/// happen under a single write lock rather than one lock per channel: a
/// retarget edits two channels and must never be observed half-done. The
/// lock only covers map edits and snapshots. Broadcasts snapshot the channel
/// and send without holding it, so a slow subscriber on one channel never
/// delays membership changes or deliveries on another.
pub struct Hub {
    name: &'static str,
    next_id: AtomicU64,
    members: RwLock<Membership>,
}

impl Hub {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            members: RwLock::new(Membership::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn connect(&self, subscriber: Arc<dyn Subscriber>, channel: ChannelId) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.members.write().await.insert(id, channel, subscriber);
        debug!(hub = self.name, "subscriber {id} joined channel {channel}");
        id
    }

    /// Remove a subscriber from whichever channel holds it. Unknown ids are ignored.
    pub async fn disconnect(&self, id: SubscriberId) {
        if let Some((channel, _)) = self.members.write().await.remove(id) {
            debug!(hub = self.name, "subscriber {id} left channel {channel}");
        }
    }

    /// Move a subscriber to `channel`. Returns `false` for an unknown subscriber.
    pub async fn change_channel(&self, id: SubscriberId, channel: ChannelId) -> bool {
        let mut members = self.members.write().await;
        let Some((previous, subscriber)) = members.remove(id) else {
            return false;
        };
        members.insert(id, channel, subscriber);
        debug!(hub = self.name, "subscriber {id} moved from channel {previous} to {channel}");
        true
    }

    /// Send `payload` to every subscriber of `channel`.
    ///
    /// Returns the number of successful deliveries. Failed sends are logged.
    #[instrument(skip(self, payload), fields(hub = self.name))]
    pub async fn broadcast(&self, channel: ChannelId, payload: &Value) -> usize {
        let targets: Vec<(SubscriberId, Arc<dyn Subscriber>)> = {
            let members = self.members.read().await;
            match members.channels.get(&channel) {
                Some(subscribers) => subscribers
                    .iter()
                    .map(|(id, subscriber)| (*id, subscriber.clone()))
                    .collect(),
                None => return 0,
            }
        };

        let results = join_all(targets.iter().map(|(id, subscriber)| async move {
            (*id, subscriber.send(payload).await)
        }))
        .await;

        let mut delivered = 0;
        for (id, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!("failed to deliver to subscriber {id}: {e:#}"),
            }
        }

        trace!("delivered to {delivered}/{} subscribers", targets.len());
        delivered
    }

    /// Broadcast each `(channel, payload)` pair
    pub async fn auto_broadcast(&self, payloads: impl IntoIterator<Item = (ChannelId, Value)>) -> usize {
        let mut delivered = 0;
        for (channel, payload) in payloads {
            delivered += self.broadcast(channel, &payload).await;
        }
        delivered
    }

    pub async fn has_subscribers(&self) -> bool {
        !self.members.read().await.index.is_empty()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.members.read().await.index.len()
    }

    pub async fn channel_of(&self, id: SubscriberId) -> Option<ChannelId> {
        self.members.read().await.index.get(&id).copied()
    }

    /// Channels that currently have at least one subscriber
    pub async fn active_channels(&self) -> Vec<ChannelId> {
        let mut channels: Vec<_> = self.members.read().await.channels.keys().copied().collect();
        channels.sort();
        channels
    }
}
