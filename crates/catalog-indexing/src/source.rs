//! Collaborator interfaces consumed by the engine.
//!
//! The primary store and the asset byte source are owned by other systems;
//! the engine only sees these traits.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use catalog_types::{PreviewAsset, PrimaryRecord};

/// Primary store failures
#[derive(Debug, Error)]
pub enum SourceError {
    /// The store cannot be reached; fatal for the current run
    #[error("Primary store unavailable: {0}")]
    Unavailable(String),

    /// One entry could not be decoded; the rest of the stream is usable
    #[error("Invalid record at {location}: {message}")]
    InvalidRecord { location: String, message: String },
}

/// Read access to the authoritative collection store.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Stream every record without loading the corpus into memory.
    fn stream_all(&self) -> BoxStream<'_, Result<PrimaryRecord, SourceError>>;

    /// Fetch one record. Missing records return `Ok(None)`.
    async fn get_by_id(&self, id: &str) -> Result<Option<PrimaryRecord>, SourceError>;
}

/// Asset byte-source failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("asset corrupt: {0}")]
    Corrupt(String),

    #[error("asset I/O error: {0}")]
    Io(String),
}

/// Resolves preview asset references to raw bytes.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Append the asset's bytes to `buf`.
    ///
    /// `buf` is empty on entry and usually comes from the engine's buffer
    /// pool, so implementations should write into it rather than allocate.
    async fn read(&self, asset: &PreviewAsset, buf: &mut Vec<u8>) -> Result<(), AssetError>;
}
