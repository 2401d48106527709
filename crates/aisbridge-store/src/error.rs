use thiserror::Error;

/// Errors surfaced by the sharded store.
///
/// Read-path shard failures never reach callers; a shard that cannot be
/// opened or queried is treated as empty. Append failures do propagate.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record timestamp could not be mapped to a UTC calendar day.
    #[error("invalid record timestamp {0}ms")]
    InvalidTimestamp(i64),

    /// Underlying SQLite failure.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Shard directory could not be created or listed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the store crate.
pub type Result<T> = std::result::Result<T, StoreError>;
