//! Decoders for the telemetry frames the master-control service broadcasts.
//!
//! Each stream ships its own raw format over the bus; everything downstream
//! of these decoders works with structured payloads. Free-form text fields
//! (NMEA sentences, log lines) arrive base64-encoded inside the frame.

use std::sync::{Arc, RwLock};

use aisbridge_bus::envelope;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelayError, Result};

/// One decoded AIS position frame: `utc,ts,mmsi,msg,<base64 sentence>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AisFrame {
    /// Event time, epoch milliseconds UTC.
    pub utc: i64,
    /// Protocol-formatted event time.
    pub ts: String,
    /// Vessel MMSI.
    pub mmsi: i64,
    /// AIS message type.
    pub msg: i64,
    /// Decoded NMEA sentence.
    pub content: String,
}

/// Which log subsystem a frame belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogClass {
    /// Master-control run log; decoded and persisted.
    #[default]
    Running,
    /// Storage subsystem log; passed through as-is.
    Storage,
}

/// One decoded run-log frame: `utc,ts,tip,<base64 content>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogFrame {
    /// Event time, epoch milliseconds UTC.
    pub utc: i64,
    /// Protocol-formatted event time.
    pub ts: String,
    /// Short source marker.
    pub tip: String,
    /// Log line.
    pub content: String,
    /// Subsystem classification.
    #[serde(skip)]
    pub class: LogClass,
}

/// Marker prefix distinguishing storage-subsystem log frames.
const STORAGE_TIP_PREFIX: &str = "StorageSub_";

fn field<'a>(parts: &mut impl Iterator<Item = &'a str>, name: &str) -> Result<&'a str> {
    parts
        .next()
        .ok_or_else(|| RelayError::Transform(format!("missing field {name}")))
}

fn int_field(raw: &str, name: &str) -> Result<i64> {
    raw.trim()
        .parse()
        .map_err(|_| RelayError::Transform(format!("non-numeric field {name}: {raw:?}")))
}

/// Decode one raw AIS frame.
pub fn decode_ais_frame(raw: &str) -> Result<AisFrame> {
    let mut parts = raw.splitn(5, ',');
    let utc = int_field(field(&mut parts, "utc")?, "utc")?;
    let ts = field(&mut parts, "ts")?.to_string();
    let mmsi = int_field(field(&mut parts, "mmsi")?, "mmsi")?;
    let msg = int_field(field(&mut parts, "msg")?, "msg")?;
    let content = envelope::decode_utf8(field(&mut parts, "content")?)
        .map_err(|e| RelayError::Transform(e.to_string()))?;
    Ok(AisFrame {
        utc,
        ts,
        mmsi,
        msg,
        content,
    })
}

/// Decode one raw log frame. Storage-subsystem frames keep their content
/// untouched and are tagged so callers skip persistence; run-log content is
/// base64-decoded.
pub fn decode_log_frame(raw: &str) -> Result<LogFrame> {
    let mut parts = raw.splitn(4, ',');
    let utc = int_field(field(&mut parts, "utc")?, "utc")?;
    let ts = field(&mut parts, "ts")?.to_string();
    let tip = field(&mut parts, "tip")?;
    let content = field(&mut parts, "content")?;

    if let Some(storage_tip) = tip.strip_prefix(STORAGE_TIP_PREFIX) {
        return Ok(LogFrame {
            utc,
            ts,
            tip: storage_tip.to_string(),
            content: content.to_string(),
            class: LogClass::Storage,
        });
    }

    let content = envelope::decode_utf8(content).map_err(|e| RelayError::Transform(e.to_string()))?;
    Ok(LogFrame {
        utc,
        ts,
        tip: tip.to_string(),
        content,
        class: LogClass::Running,
    })
}

/// Decode one status-update frame (base64-of-JSON) and drop disabled remote
/// servers (`state == 0`) from the payload.
pub fn decode_update_frame(raw: &str) -> Result<Value> {
    let mut value: Value =
        envelope::decode(raw).map_err(|e| RelayError::Transform(e.to_string()))?;
    if let Some(remotes) = value
        .get_mut("remote_servers")
        .and_then(Value::as_array_mut)
    {
        remotes.retain(|remote| remote.get("state").and_then(Value::as_i64) != Some(0));
    }
    Ok(value)
}

/// Last status update seen, kept for late-joining clients.
#[derive(Debug, Clone, Default)]
pub struct StatusCache {
    inner: Arc<RwLock<Option<Value>>>,
}

impl StatusCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached payload.
    pub fn set(&self, value: Value) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = Some(value);
        }
    }

    /// The most recent payload, if any update arrived yet.
    pub fn latest(&self) -> Option<Value> {
        self.inner.read().ok().and_then(|guard| guard.clone())
    }
}
