//! Connected-client bookkeeping.
//!
//! Each WebSocket connection registers an outbox here and owns a mutable set
//! of stream subscriptions. Delivery is best-effort: a client whose outbox is
//! gone is pruned on the next broadcast and never stalls the relay.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::message::WsChannel;

/// Opaque id of one connected client.
pub type ClientId = u64;

struct ClientEntry {
    outbox: mpsc::UnboundedSender<String>,
    subscriptions: HashSet<WsChannel>,
}

/// Process-wide registry of connected real-time clients.
#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<ClientId, ClientEntry>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection. The caller drains the returned receiver
    /// into its socket; dropping the receiver marks the client dead.
    pub fn register(&self) -> (ClientId, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.insert(
            id,
            ClientEntry {
                outbox: tx,
                subscriptions: HashSet::new(),
            },
        );
        debug!(client = id, "client registered");
        (id, rx)
    }

    /// Remove a connection. Idempotent.
    pub fn deregister(&self, id: ClientId) {
        if self.clients.remove(&id).is_some() {
            debug!(client = id, "client deregistered");
        }
    }

    /// Opt `id` into an opt-in stream. Takes effect on the next broadcast.
    pub fn subscribe(&self, id: ClientId, channel: WsChannel) {
        if let Some(mut entry) = self.clients.get_mut(&id) {
            entry.subscriptions.insert(channel);
        }
    }

    /// Opt `id` out of a stream. Takes effect on the next broadcast.
    pub fn unsubscribe(&self, id: ClientId, channel: WsChannel) {
        if let Some(mut entry) = self.clients.get_mut(&id) {
            entry.subscriptions.remove(&channel);
        }
    }

    /// Whether `id` currently opts into `channel`.
    pub fn is_subscribed(&self, id: ClientId, channel: WsChannel) -> bool {
        self.clients
            .get(&id)
            .map(|entry| entry.subscriptions.contains(&channel))
            .unwrap_or(false)
    }

    /// Number of connected clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no client is connected.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Push a serialized message to one client. Returns false (and prunes
    /// the entry) when the client is gone.
    pub fn send_to(&self, id: ClientId, message: &str) -> bool {
        let delivered = self
            .clients
            .get(&id)
            .map(|entry| entry.outbox.send(message.to_string()).is_ok())
            .unwrap_or(false);
        if !delivered {
            self.deregister(id);
        }
        delivered
    }

    /// Fan a serialized message out to connected clients.
    ///
    /// `default_send` pushes to everyone; otherwise only to clients whose
    /// subscription set contains `channel`. Dead clients are pruned, never
    /// awaited. Returns the number of deliveries.
    pub fn broadcast(&self, channel: WsChannel, default_send: bool, message: &str) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();
        for entry in self.clients.iter() {
            let wants = default_send || entry.value().subscriptions.contains(&channel);
            if !wants {
                continue;
            }
            if entry.value().outbox.send(message.to_string()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.deregister(id);
        }
        delivered
    }
}
