//! Storage layer for the collection index.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation per index keyspace (ordered set, thumbnails, state)
//! - Order-preserving keys for range and neighbour queries
//! - Per-batch atomic writes via WriteBatch
//! - Streaming folds for aggregation over large keyspaces

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::{EntryWrite, IndexStore, Keyspace, ScanDirection, StorageStats, ThumbnailWrite};
pub use error::StorageError;
pub use keys::OrderKey;
