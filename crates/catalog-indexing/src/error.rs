//! Error types for the rebuild engine.
//!
//! Two tiers:
//! - [`RecordError`]: one record failed; logged, counted and listed in the
//!   run summary while the run continues.
//! - [`IndexingError`]: the run itself cannot proceed. Fatal variants that
//!   occur mid-run are wrapped in [`IndexingError::Aborted`] together with
//!   the statistics gathered so far.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use catalog_storage::StorageError;

use crate::rebuild::RebuildSummary;
use crate::source::{AssetError, SourceError};

/// Errors that stop a rebuild or verify run
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Storage operation failed on a value rather than the store itself
    #[error("Storage error: {0}")]
    Storage(StorageError),

    /// The index store cannot be reached or is shutting down
    #[error("Index store unavailable: {0}")]
    StoreUnavailable(String),

    /// The primary store cannot be reached
    #[error("Primary store unavailable: {0}")]
    PrimaryUnavailable(String),

    /// Mode/options/config rejected before any work started
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A fatal error interrupted a run; `partial` holds what completed
    #[error("Run aborted: {source}")]
    Aborted {
        source: Box<IndexingError>,
        partial: Box<RebuildSummary>,
    },
}

impl IndexingError {
    /// Classify a storage failure as fatal or value-level.
    pub fn from_store(err: StorageError) -> Self {
        if err.is_connectivity() {
            IndexingError::StoreUnavailable(err.to_string())
        } else {
            IndexingError::Storage(err)
        }
    }

    /// Whether the error must stop the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            IndexingError::Storage(_) | IndexingError::Serialization(_)
        )
    }

    /// Attach partial statistics. Already-aborted errors are returned as is.
    pub fn aborted(self, partial: RebuildSummary) -> Self {
        match self {
            IndexingError::Aborted { .. } => self,
            other => IndexingError::Aborted {
                source: Box::new(other),
                partial: Box::new(partial),
            },
        }
    }

    /// Statistics of the interrupted run, if any.
    pub fn partial(&self) -> Option<&RebuildSummary> {
        match self {
            IndexingError::Aborted { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

impl From<StorageError> for IndexingError {
    fn from(err: StorageError) -> Self {
        IndexingError::from_store(err)
    }
}

impl From<SourceError> for IndexingError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unavailable(msg) => IndexingError::PrimaryUnavailable(msg),
            SourceError::InvalidRecord { location, message } => {
                IndexingError::Serialization(format!("{}: {}", location, message))
            }
        }
    }
}

impl From<serde_json::Error> for IndexingError {
    fn from(err: serde_json::Error) -> Self {
        IndexingError::Serialization(err.to_string())
    }
}

/// Category of a per-record failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordErrorKind {
    AssetNotFound,
    AssetCorrupt,
    AssetIo,
    /// The primary store returned an undecodable record
    InvalidRecord,
    /// The record's index entries could not be written
    Write,
}

impl std::fmt::Display for RecordErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordErrorKind::AssetNotFound => write!(f, "asset_not_found"),
            RecordErrorKind::AssetCorrupt => write!(f, "asset_corrupt"),
            RecordErrorKind::AssetIo => write!(f, "asset_io"),
            RecordErrorKind::InvalidRecord => write!(f, "invalid_record"),
            RecordErrorKind::Write => write!(f, "write"),
        }
    }
}

/// A failure isolated to one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    /// Record id (or source location when the record could not be decoded)
    pub id: String,
    pub kind: RecordErrorKind,
    pub message: String,
}

impl RecordError {
    pub fn new(id: impl Into<String>, kind: RecordErrorKind, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            message: message.into(),
        }
    }

    /// Wrap an asset read failure.
    pub fn asset(id: impl Into<String>, err: &AssetError) -> Self {
        let kind = match err {
            AssetError::NotFound(_) => RecordErrorKind::AssetNotFound,
            AssetError::Corrupt(_) => RecordErrorKind::AssetCorrupt,
            AssetError::Io(_) => RecordErrorKind::AssetIo,
        };
        Self::new(id, kind, err.to_string())
    }

    /// Wrap a write failure.
    pub fn write(id: impl Into<String>, err: &dyn std::fmt::Display) -> Self {
        Self::new(id, RecordErrorKind::Write, err.to_string())
    }
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.id, self.kind, self.message)
    }
}
