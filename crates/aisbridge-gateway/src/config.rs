//! Gateway configuration: bus endpoints, channel names and shard location.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Everything the gateway binary needs to wire itself up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Address the HTTP/WebSocket server listens on.
    pub bind_addr: SocketAddr,
    /// Redis endpoint carrying both RPC and telemetry traffic.
    pub redis_url: String,
    /// Channel control-plane requests are published on.
    pub request_channel: String,
    /// Channel the master-control service answers on.
    pub response_channel: String,
    /// Channel carrying AIS position broadcasts.
    pub ais_channel: String,
    /// Channel carrying run-log broadcasts.
    pub log_channel: String,
    /// Channel carrying terminal status updates.
    pub update_channel: String,
    /// Per-call deadline when a request does not name its own.
    pub default_timeout_ms: u64,
    /// Directory holding the day-sharded AIS databases.
    pub shard_dir: PathBuf,
    /// Shard filename prefix, e.g. `ais` for `ais-2025-04-21.db`.
    pub shard_prefix: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
            redis_url: String::from("redis://127.0.0.1:6379"),
            request_channel: String::from("app.rpc.req"),
            response_channel: String::from("app.rpc.res"),
            ais_channel: String::from("app.push.ais"),
            log_channel: String::from("app.push.log"),
            update_channel: String::from("app.push.update"),
            default_timeout_ms: 10_000,
            shard_dir: PathBuf::from("/var/lib/aisbridge/ais"),
            shard_prefix: String::from("ais"),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML or JSON file, selected by extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: GatewayConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: GatewayConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }
}
