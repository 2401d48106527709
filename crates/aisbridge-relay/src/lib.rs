#![warn(missing_docs)]

//! AisBridge relay subsystem: turns bus telemetry broadcasts into per-client
//! WebSocket pushes, honoring per-connection subscription filters

pub mod error;
pub mod message;
pub mod registry;
pub mod relay;
pub mod session;
pub mod streams;

pub use error::{RelayError, Result};
pub use message::{WsChannel, WsRequest, WsResponse};
pub use registry::{ClientId, ClientRegistry};
pub use relay::{RelayHandle, RelayManager};
pub use session::{SessionHandler, SessionReply};
