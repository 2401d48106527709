//! Bus-to-client relay: one bus subscription per telemetry stream, a
//! stream-specific transform, and fan-out through the client registry.

use std::sync::{Arc, Mutex};

use aisbridge_bus::BusTransport;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};
use crate::message::{WsChannel, WsResponse};
use crate::registry::ClientRegistry;

/// Handle to one running relay. Closing tears down the bus subscription;
/// close is idempotent and safe during shutdown even if no frame ever
/// arrived.
pub struct RelayHandle {
    stream: WsChannel,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RelayHandle {
    /// Stop relaying. Idempotent.
    pub fn close(&self) {
        if let Ok(mut guard) = self.task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
                info!(stream = ?self.stream, "relay closed");
            }
        }
    }
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Registers relays and owns the shared client registry reference.
pub struct RelayManager {
    registry: Arc<ClientRegistry>,
}

impl RelayManager {
    /// A manager fanning out through `registry`.
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Relay `inbound_channel` from the bus to connected clients as
    /// `stream`.
    ///
    /// Every raw frame goes through `transform`; a failing transform is
    /// logged and dropped without stopping the relay. With `default_send`
    /// the stream reaches every client, otherwise only clients subscribed to
    /// `stream`.
    pub async fn register<F>(
        &self,
        transport: &dyn BusTransport,
        inbound_channel: &str,
        stream: WsChannel,
        default_send: bool,
        transform: F,
    ) -> Result<RelayHandle>
    where
        F: Fn(&str) -> Result<Value> + Send + Sync + 'static,
    {
        let mut subscription = transport
            .subscribe(inbound_channel)
            .await
            .map_err(RelayError::Bus)?;

        let registry = self.registry.clone();
        let channel_name = inbound_channel.to_string();
        let task = tokio::spawn(async move {
            while let Some(raw) = subscription.recv().await {
                let payload = match transform(&raw) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(channel = %channel_name, error = %err, "relay frame dropped");
                        continue;
                    }
                };
                let body = WsResponse::new(stream, payload);
                match serde_json::to_string(&body) {
                    Ok(message) => {
                        let delivered = registry.broadcast(stream, default_send, &message);
                        debug!(channel = %channel_name, stream = ?stream, delivered, "relayed frame");
                    }
                    Err(err) => {
                        warn!(channel = %channel_name, error = %err, "unserializable relay body");
                    }
                }
            }
            debug!(channel = %channel_name, "relay subscription ended");
        });

        info!(channel = %inbound_channel, stream = ?stream, default_send, "relay registered");
        Ok(RelayHandle {
            stream,
            task: Mutex::new(Some(task)),
        })
    }
}
