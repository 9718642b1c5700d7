//! Storage layer error types.

use catalog_types::CatalogError;
use rocksdb::ErrorKind;
use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// RocksDB operation failed
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Column family not found
    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    /// Key encoding/decoding error
    #[error("Key error: {0}")]
    Key(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Whether the failure means the store itself is unusable, as opposed to
    /// a problem with one value.
    pub fn is_connectivity(&self) -> bool {
        match self {
            StorageError::RocksDb(e) => matches!(
                e.kind(),
                ErrorKind::IOError
                    | ErrorKind::ShutdownInProgress
                    | ErrorKind::TimedOut
                    | ErrorKind::Busy
                    | ErrorKind::TryAgain
                    | ErrorKind::ColumnFamilyDropped
            ),
            StorageError::ColumnFamilyNotFound(_) => true,
            StorageError::Key(_) | StorageError::Serialization(_) => false,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<CatalogError> for StorageError {
    fn from(err: CatalogError) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
