//! Index rebuild and consistency engine.
//!
//! Keeps the read-optimized index in `catalog-storage` consistent with an
//! independently mutated primary store.
//!
//! ## Key Components
//!
//! - [`RebuildEngine`]: entry point; runs a [`RebuildMode`] with [`RebuildOptions`]
//! - [`RebuildPlanner`]: streams primary records in batches and classifies them
//! - [`IndexWriter`]: writes ordered-set, thumbnail and state entries per batch
//! - [`ConsistencyVerifier`]: two-way drift detection and repair
//! - [`ThumbnailCacheAdapter`]: resize-or-pass-through decision for previews
//! - [`StateStore`]: per-record [`catalog_types::CollectionIndexState`] lookups
//! - [`PrimaryStore`], [`AssetSource`], [`ImageResizer`]: collaborator seams
//!
//! ## Example
//!
//! ```ignore
//! use catalog_indexing::{EngineConfig, EngineParts, RebuildEngine, RebuildMode, RebuildOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! let engine = RebuildEngine::new(parts, EngineConfig::default())?;
//! let summary = engine
//!     .run(RebuildMode::ChangedOnly, RebuildOptions::default(), CancellationToken::new())
//!     .await?;
//! println!("rebuilt {} of {}", summary.rebuilt, summary.scanned);
//! ```

pub mod error;
pub mod memory;
pub mod mock;
pub mod planner;
pub mod rebuild;
pub mod resize;
pub mod source;
pub mod state_store;
pub mod thumbnail;
pub mod verify;
pub mod writer;

pub use error::{IndexingError, RecordError, RecordErrorKind};
pub use memory::{BufferPool, MemoryProbe, PooledBuffer};
pub use planner::{classify, PlanAction, PlannedBatch, PlannedItem, RebuildPlanner};
pub use rebuild::{
    EngineConfig, EngineParts, LoggingProgressCallback, NoOpProgressCallback, ProgressCallback,
    RebuildEngine, RebuildMode, RebuildOptions, RebuildProgress, RebuildSummary,
};
pub use resize::{sniff_format, ImageCrateResizer, ImageResizer, ResizeError, ResizeTarget, ResizedImage};
pub use source::{AssetError, AssetSource, PrimaryStore, SourceError};
pub use state_store::{RunRecord, StateStore};
pub use thumbnail::{
    decide, ResizeDecision, ResizeTrigger, StaticThumbnailSettings, ThumbnailCacheAdapter,
    ThumbnailSettingsProvider,
};
pub use verify::{ConsistencyVerifier, VerifyReport};
pub use writer::{BatchOutcome, IndexWriter, WriteItem, WriteOptions, WrittenRecord};
