//! Navigation error types.

use catalog_storage::StorageError;
use thiserror::Error;

/// Errors returned by [`crate::NavigationReader`]
#[derive(Error, Debug)]
pub enum NavigationError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Cursor string could not be decoded
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Invalid page size: {0}")]
    InvalidPageSize(usize),
}
