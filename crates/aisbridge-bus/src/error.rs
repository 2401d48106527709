use thiserror::Error;

/// Errors surfaced by the bus transport and the RPC correlation layer.
#[derive(Debug, Error)]
pub enum BusError {
    /// No correlated response arrived within the deadline.
    #[error("rpc {method} timed out after {timeout_ms}ms")]
    Timeout {
        /// Method name of the timed-out call.
        method: String,
        /// Deadline that expired, in milliseconds.
        timeout_ms: u64,
    },

    /// The response envelope carried a non-empty error string.
    #[error("remote error: {0}")]
    Remote(String),

    /// The publish/subscribe primitive itself failed.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A wire payload could not be decoded into an envelope.
    #[error("invalid envelope: {0}")]
    Decode(String),

    /// The correlator was torn down while a call was still in flight.
    #[error("correlator closed before a response arrived")]
    Closed,
}

/// Convenience alias used throughout the bus crate.
pub type Result<T> = std::result::Result<T, BusError>;
