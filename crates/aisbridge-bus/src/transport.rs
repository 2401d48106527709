//! Bus transport abstraction over publish/subscribe messaging.
//!
//! The master-control service is only reachable through a broadcast bus, so
//! everything above this layer speaks `BusTransport`. Production runs on
//! Redis pub/sub; tests inject synthetic traffic through [`MemoryBus`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::error::{BusError, Result};

/// A live subscription to one bus channel.
///
/// Messages arrive as raw payload strings in bus delivery order. Closing (or
/// dropping) the subscription tears down the underlying channel listener;
/// `close` is idempotent and safe to call even if no message ever arrived.
pub struct BusSubscription {
    receiver: mpsc::UnboundedReceiver<String>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl BusSubscription {
    /// Receive the next raw payload, or `None` once the subscription closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Tear down the subscription. Idempotent.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.receiver.close();
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Publish/subscribe primitive the rest of the system is built on.
#[async_trait]
pub trait BusTransport: Send + Sync {
    /// Broadcast a payload on a channel. Fire-and-forget: there is no
    /// delivery acknowledgement.
    async fn publish(&self, channel: &str, payload: &str) -> Result<()>;

    /// Open a subscription to a channel.
    async fn subscribe(&self, channel: &str) -> Result<BusSubscription>;
}

/// Redis-backed bus transport.
///
/// Publishes go through a shared multiplexed connection; each subscription
/// holds its own pub/sub connection, mirroring how Redis requires dedicated
/// connections for subscriber mode.
pub struct RedisBus {
    client: redis::Client,
    conn: redis::aio::ConnectionManager,
}

impl RedisBus {
    /// Connect to the Redis instance at `url` (e.g. `redis://127.0.0.1/`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| BusError::Transport(e.to_string()))?;
        let conn = redis::aio::ConnectionManager::new(client.clone())
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;
        Ok(Self { client, conn })
    }

    /// Liveness probe used by the health endpoint.
    pub async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        matches!(
            redis::cmd("PING").query_async::<String>(&mut conn).await,
            Ok(reply) if reply == "PONG"
        )
    }
}

#[async_trait]
impl BusTransport for RedisBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::AsyncCommands::publish::<_, _, ()>(&mut conn, channel, payload)
            .await
            .map_err(|e| BusError::Transport(e.to_string()))
    }

    async fn subscribe(&self, channel: &str) -> Result<BusSubscription> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let channel_name = channel.to_string();
        let task = tokio::spawn(async move {
            let mut stream = pubsub.into_on_message();
            while let Some(msg) = stream.next().await {
                match msg.get_payload::<String>() {
                    Ok(raw) => {
                        if tx.send(raw).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(channel = %channel_name, error = %err, "dropping non-text bus message");
                    }
                }
            }
            debug!(channel = %channel_name, "bus subscription stream ended");
        });

        Ok(BusSubscription {
            receiver: rx,
            task: Some(task),
        })
    }
}

/// In-process bus used by tests and local development.
///
/// Every publish is fanned out synchronously to all current subscribers of
/// the channel; dead subscribers are pruned on the next publish.
#[derive(Default, Clone)]
pub struct MemoryBus {
    topics: Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<String>>>>>,
    fail_publish: Arc<AtomicBool>,
}

impl MemoryBus {
    /// Create an empty in-process bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail with a transport error. Used to
    /// exercise publish-failure paths in tests.
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BusTransport for MemoryBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BusError::Transport("memory bus publish disabled".into()));
        }
        let mut topics = self.topics.lock().await;
        if let Some(subscribers) = topics.get_mut(channel) {
            subscribers.retain(|tx| tx.send(payload.to_string()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BusSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.topics
            .lock()
            .await
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        Ok(BusSubscription {
            receiver: rx,
            task: None,
        })
    }
}
