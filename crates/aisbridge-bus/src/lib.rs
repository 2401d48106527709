#![warn(missing_docs)]

//! AisBridge bus subsystem: Redis pub/sub transport, wire envelope codec, RPC correlation

pub mod envelope;
pub mod error;
pub mod rpc;
pub mod transport;

pub use envelope::{RequestEnvelope, ResponseEnvelope};
pub use error::{BusError, Result};
pub use rpc::{RpcClient, RpcClientConfig};
pub use transport::{BusSubscription, BusTransport, MemoryBus, RedisBus};
