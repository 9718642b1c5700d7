//! # catalog-types
//!
//! Shared domain types for the collection index.
//!
//! This crate defines the data structures exchanged between the storage layer,
//! the rebuild engine and the navigation reader:
//! - Records: read-only views of primary-store collections and their previews
//! - State: per-record bookkeeping used to decide whether re-indexing is needed
//! - Thumbnails: index-ready preview blobs kept in the thumbnail hash map
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use catalog_types::{CollectionIndexState, PrimaryRecord};
//! ```

pub mod config;
pub mod error;
pub mod hash;
pub mod record;
pub mod state;
pub mod thumbnail;

pub use config::{RebuildSettings, Settings, ThumbnailSettings};
pub use error::CatalogError;
pub use hash::fnv1a_64;
pub use record::{PreviewAsset, PrimaryRecord};
pub use state::{
    CollectionIndexState, IndexStateEvent, RebuildReason, ThumbnailChange,
    CURRENT_SCHEMA_VERSION,
};
pub use thumbnail::{ThumbnailCacheEntry, ThumbnailFormat, ThumbnailMeta};
