//! Request/response correlation over the fire-and-forget bus.
//!
//! The master-control service answers on one shared response channel, so a
//! single subscription serves every outstanding call and responses are
//! matched back to callers purely by correlation id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::envelope::{self, RequestEnvelope, ResponseEnvelope};
use crate::error::{BusError, Result};
use crate::transport::BusTransport;

/// Channel names and default deadline for the correlator.
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// Channel requests are published on; the master-control service
    /// subscribes here.
    pub request_channel: String,
    /// Shared channel responses arrive on.
    pub response_channel: String,
    /// Default per-call deadline in milliseconds.
    pub default_timeout_ms: u64,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            request_channel: "app.rpc.req".to_string(),
            response_channel: "app.rpc.res".to_string(),
            default_timeout_ms: 10_000,
        }
    }
}

type Waiters = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

/// RPC correlator: publishes requests and resolves callers when the matching
/// response id arrives, or fails them on timeout.
pub struct RpcClient {
    transport: Arc<dyn BusTransport>,
    config: RpcClientConfig,
    counter: AtomicU64,
    waiters: Waiters,
    reader: tokio::task::JoinHandle<()>,
}

impl RpcClient {
    /// Establish the single shared response subscription and start the
    /// background reader that dispatches responses to waiters.
    pub async fn start(transport: Arc<dyn BusTransport>, config: RpcClientConfig) -> Result<Self> {
        let mut subscription = transport.subscribe(&config.response_channel).await?;
        let waiters: Waiters = Arc::new(Mutex::new(HashMap::new()));

        let reader_waiters = waiters.clone();
        let channel = config.response_channel.clone();
        let reader = tokio::spawn(async move {
            while let Some(raw) = subscription.recv().await {
                let response: ResponseEnvelope = match envelope::decode(&raw) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        warn!(channel = %channel, error = %err, "undecodable rpc response dropped");
                        continue;
                    }
                };
                let waiter = reader_waiters.lock().await.remove(&response.id);
                let Some(tx) = waiter else {
                    // Timed out already, or a duplicate. Not ours to handle.
                    debug!(id = response.id, "rpc response without live waiter dropped");
                    continue;
                };
                let outcome = if response.is_ok() {
                    Ok(response.result)
                } else {
                    Err(BusError::Remote(response.error))
                };
                let _ = tx.send(outcome);
            }
            debug!(channel = %channel, "rpc response reader stopped");
        });

        Ok(Self {
            transport,
            config,
            counter: AtomicU64::new(0),
            waiters,
            reader,
        })
    }

    /// Composite correlation id: unix seconds scaled, plus a rolling
    /// counter. Unique within the in-flight window, which is all that
    /// correlation requires.
    fn next_id(&self) -> u64 {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        secs * 1000 + seq % 1000
    }

    async fn discard(&self, id: u64) {
        self.waiters.lock().await.remove(&id);
    }

    /// Issue one call and await its correlated response.
    ///
    /// Exactly one publish happens per call; nothing is retried here. The
    /// terminal outcomes are the result value, [`BusError::Remote`] when the
    /// response carried an error string, [`BusError::Transport`] when the
    /// publish itself failed, and [`BusError::Timeout`] when no response
    /// arrived in time. A response arriving after the timeout is dropped.
    pub async fn call(&self, method: &str, param: Value, timeout_ms: u64) -> Result<Value> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(id, tx);

        let request = RequestEnvelope {
            id,
            method: method.to_string(),
            param,
        };
        let payload = match envelope::encode(&request) {
            Ok(payload) => payload,
            Err(err) => {
                self.discard(id).await;
                return Err(err);
            }
        };

        debug!(id, method, channel = %self.config.request_channel, "publishing rpc request");
        if let Err(err) = self.transport.publish(&self.config.request_channel, &payload).await {
            self.discard(id).await;
            return Err(err);
        }

        match tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                self.discard(id).await;
                Err(BusError::Closed)
            }
            Err(_) => {
                self.discard(id).await;
                Err(BusError::Timeout {
                    method: method.to_string(),
                    timeout_ms,
                })
            }
        }
    }

    /// [`call`](Self::call) with the configured default deadline.
    pub async fn call_default(&self, method: &str, param: Value) -> Result<Value> {
        self.call(method, param, self.config.default_timeout_ms).await
    }

    /// Call and deserialize the result into the method's concrete shape.
    pub async fn call_typed<T: DeserializeOwned>(
        &self,
        method: &str,
        param: Value,
        timeout_ms: u64,
    ) -> Result<T> {
        let value = self.call(method, param, timeout_ms).await?;
        serde_json::from_value(value)
            .map_err(|e| BusError::Decode(format!("result for {method}: {e}")))
    }

    /// Number of calls currently awaiting a response.
    pub async fn in_flight(&self) -> usize {
        self.waiters.lock().await.len()
    }

    /// Stop the response reader and drop every registered waiter.
    /// Outstanding calls fail with [`BusError::Closed`].
    pub async fn shutdown(&self) {
        self.reader.abort();
        self.waiters.lock().await.clear();
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
