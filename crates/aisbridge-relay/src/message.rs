//! WebSocket message shapes shared by the relay and the gateway endpoint.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound channels pushed to browser clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WsChannel {
    /// AIS position reports (opt-in).
    Ais,
    /// Master-control run log lines.
    Log,
    /// Terminal status updates.
    Update,
    /// Firmware upgrade progress.
    Upgrade,
    /// Heartbeat reply.
    Pong,
    /// Operator-facing notices and errors.
    Alert,
}

/// Inbound channel names clients may send on.
pub mod request_channel {
    /// Heartbeat/liveness check.
    pub const PING: &str = "ping";
    /// Privileged command; the action field selects the operation.
    pub const CMD: &str = "cmd";
    /// Opt into the AIS stream.
    pub const AIS_START: &str = "ais_start";
    /// Opt out of the AIS stream.
    pub const AIS_STOP: &str = "ais_stop";
}

/// Privileged actions on the `cmd` channel.
pub mod action {
    /// Reboot the terminal.
    pub const REBOOT: &str = "reboot";
    /// Factory reset.
    pub const RESET: &str = "reset";
}

/// One message from a connected client.
#[derive(Debug, Clone, Deserialize)]
pub struct WsRequest {
    /// Channel name; unknown names are answered with an alert.
    pub channel: String,
    /// Action selector for the `cmd` channel.
    #[serde(default)]
    pub action: Option<String>,
    /// Channel-specific payload.
    #[serde(default)]
    pub payload: Option<Value>,
}

/// One message pushed to a connected client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsResponse {
    /// Stream/channel the payload belongs to.
    pub channel: WsChannel,
    /// Send time, ISO8601 UTC.
    pub timestamp: String,
    /// Channel-specific payload.
    pub payload: Value,
    /// Error marker; empty on success and omitted from the wire.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    /// Echoed command action, when the push answers a `cmd`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl WsResponse {
    /// A successful push on `channel`.
    pub fn new(channel: WsChannel, payload: Value) -> Self {
        Self {
            channel,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            payload,
            error: String::new(),
            action: None,
        }
    }

    /// An alert carrying `message`, with `error` set to a status marker.
    pub fn alert(message: &str, error: &str) -> Self {
        let mut response = Self::new(WsChannel::Alert, serde_json::json!({ "message": message }));
        response.error = error.to_string();
        response
    }

    /// Attach a command action echo.
    pub fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }
}
