#![warn(missing_docs)]

//! AisBridge gateway: the daemon tying the bus correlator, the telemetry
//! relay and the sharded AIS store together behind one HTTP/WebSocket
//! surface.

pub mod api;
pub mod config;
pub mod state;
pub mod ws;

pub use config::GatewayConfig;
pub use state::AppState;
