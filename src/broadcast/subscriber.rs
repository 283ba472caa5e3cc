//! Subscriber endpoints the hub delivers to

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn send(&self, payload: &Value) -> anyhow::Result<()>;
}

/// Subscriber backed by a bounded queue.
///
/// `send` never waits: a full or closed queue is reported as an error and the
/// payload is dropped for this subscriber only.
#[derive(Debug, Clone)]
pub struct QueueSubscriber {
    tx: mpsc::Sender<Value>,
}

impl QueueSubscriber {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Value>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Subscriber for QueueSubscriber {
    async fn send(&self, payload: &Value) -> anyhow::Result<()> {
        self.tx.try_send(payload.clone()).map_err(|e| match e {
            TrySendError::Full(_) => anyhow!("subscriber queue is full"),
            TrySendError::Closed(_) => anyhow!("subscriber is gone"),
        })
    }
}
