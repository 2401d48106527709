//! Shared handles the HTTP and WebSocket handlers operate on.

use std::sync::Arc;

use aisbridge_bus::{RedisBus, RpcClient};
use aisbridge_relay::streams::StatusCache;
use aisbridge_relay::{ClientRegistry, SessionHandler};
use aisbridge_store::ShardedStore;

/// Everything a request handler may need, cloned cheaply via `Arc`.
pub struct AppState {
    /// Control-plane correlator over the bus.
    pub rpc: Arc<RpcClient>,
    /// Redis handle kept for liveness probing.
    pub bus: Arc<RedisBus>,
    /// Day-sharded historical AIS store.
    pub store: Arc<ShardedStore>,
    /// Connected WebSocket clients.
    pub registry: Arc<ClientRegistry>,
    /// Per-connection request protocol dispatcher.
    pub session: SessionHandler,
    /// Last status update, replayed to late-joining readers.
    pub status: StatusCache,
}
