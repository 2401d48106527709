//! Wire envelopes exchanged with the master-control service.
//!
//! Both directions carry base64-encoded JSON so the payload survives
//! transports that are not binary-safe.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BusError, Result};

/// One outbound RPC request. The `id` is assigned by the correlator and is
/// unique within the in-flight window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Correlation id.
    pub id: u64,
    /// Remote method name, e.g. `getAisCfg`.
    pub method: String,
    /// Method-specific parameter object.
    pub param: Value,
}

/// One inbound RPC response. An empty `error` string means success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Correlation id echoed from the request.
    pub id: u64,
    /// Error message; empty on success.
    #[serde(default)]
    pub error: String,
    /// Method-specific result object.
    #[serde(default)]
    pub result: Value,
}

impl ResponseEnvelope {
    /// Whether the remote side reported success.
    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }
}

/// Serialize a value to JSON and base64-encode it for publishing.
pub fn encode<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value).map_err(|e| BusError::Decode(e.to_string()))?;
    Ok(BASE64.encode(json))
}

/// Decode a base64-of-JSON bus payload into a typed value.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let bytes = BASE64
        .decode(raw.trim())
        .map_err(|e| BusError::Decode(format!("base64: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| BusError::Decode(format!("json: {e}")))
}

/// Decode a base64 field into UTF-8 text. Telemetry frames embed free-form
/// text (NMEA sentences, log lines) this way.
pub fn decode_utf8(raw: &str) -> Result<String> {
    let bytes = BASE64
        .decode(raw.trim())
        .map_err(|e| BusError::Decode(format!("base64: {e}")))?;
    String::from_utf8(bytes).map_err(|e| BusError::Decode(format!("utf8: {e}")))
}
