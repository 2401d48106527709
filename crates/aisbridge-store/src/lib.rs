#![warn(missing_docs)]

//! AisBridge storage subsystem: one SQLite shard per UTC day, cross-shard
//! paginated range queries, earliest-record lookup

pub mod error;
pub mod shard;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{AisRecord, Page, QueryOrder, ShardedStore};
