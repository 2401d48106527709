use thiserror::Error;

/// Errors local to the relay layer.
///
/// Transform failures are contained: the offending frame is logged and
/// dropped, the relay keeps running. Only subscription setup can fail a
/// caller.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A raw telemetry frame could not be turned into its structured shape.
    #[error("malformed frame: {0}")]
    Transform(String),

    /// The underlying bus refused the subscription.
    #[error(transparent)]
    Bus(#[from] aisbridge_bus::BusError),
}

/// Convenience alias used throughout the relay crate.
pub type Result<T> = std::result::Result<T, RelayError>;
