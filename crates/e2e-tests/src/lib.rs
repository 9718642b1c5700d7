//! End-to-end test infrastructure for the collection index.
//!
//! Provides a shared TestHarness and helper functions for E2E tests covering
//! rebuild, verification and navigation against one RocksDB index.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use catalog_indexing::mock::{InMemoryAssetSource, InMemoryPrimaryStore, MockResizer};
use catalog_indexing::{
    EngineConfig, EngineParts, IndexingError, ProgressCallback, RebuildEngine, RebuildMode,
    RebuildOptions, RebuildSummary, StaticThumbnailSettings,
};
use catalog_navigation::NavigationReader;
use catalog_storage::{IndexStore, ScanDirection, StorageStats};
use catalog_types::{PreviewAsset, PrimaryRecord, ThumbnailSettings};

/// Payload length produced by the harness resizer
pub const RESIZED_LEN: usize = 256;

/// Shared test harness for E2E tests.
///
/// Holds an index on a temp directory, in-memory collaborators and an
/// engine wired to them.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub store: Arc<IndexStore>,
    pub primary: Arc<InMemoryPrimaryStore>,
    pub assets: Arc<InMemoryAssetSource>,
    pub resizer: Arc<MockResizer>,
    pub engine: RebuildEngine,
    pub reader: NavigationReader,
}

impl TestHarness {
    /// Create a harness with default engine sizing.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a harness whose engine reports progress to `progress`.
    pub fn with_progress(config: EngineConfig, progress: Arc<dyn ProgressCallback>) -> Self {
        Self::build(config, Some(progress))
    }

    fn build(config: EngineConfig, progress: Option<Arc<dyn ProgressCallback>>) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let store =
            Arc::new(IndexStore::open(temp_dir.path()).expect("Failed to open test index"));
        let primary = Arc::new(InMemoryPrimaryStore::new());
        let assets = Arc::new(InMemoryAssetSource::new());
        let resizer = Arc::new(MockResizer::new(RESIZED_LEN));

        let engine = RebuildEngine::new(
            EngineParts {
                store: store.clone(),
                primary: primary.clone(),
                assets: assets.clone(),
                resizer: resizer.clone(),
                thumbnail_settings: Arc::new(StaticThumbnailSettings(ThumbnailSettings::default())),
            },
            config,
        )
        .expect("Failed to build engine");
        let engine = match progress {
            Some(progress) => engine.with_progress(progress),
            None => engine,
        };

        Self {
            _temp_dir: temp_dir,
            reader: NavigationReader::new(store.clone()),
            store,
            primary,
            assets,
            resizer,
            engine,
        }
    }

    /// Add `count` records, each with an existing preview asset.
    pub fn seed(&self, count: usize) -> Vec<PrimaryRecord> {
        let records: Vec<PrimaryRecord> = (0..count).map(make_record).collect();
        for record in &records {
            self.add(record.clone());
        }
        records
    }

    /// Add one record and the bytes of its previews.
    pub fn add(&self, record: PrimaryRecord) {
        for preview in &record.previews {
            self.assets
                .insert(preview.path.clone(), vec![0x5A; preview.byte_size as usize]);
        }
        self.primary.upsert(record);
    }

    /// Run the engine to completion.
    pub async fn run(
        &self,
        mode: RebuildMode,
        options: RebuildOptions,
    ) -> Result<RebuildSummary, IndexingError> {
        self.engine.run(mode, options, CancellationToken::new()).await
    }

    /// Run `ChangedOnly` with default options, panicking on fatal errors.
    pub async fn changed_only(&self) -> RebuildSummary {
        self.run(RebuildMode::ChangedOnly, RebuildOptions::default())
            .await
            .expect("changed-only run failed")
    }

    /// Every indexed id in navigation order.
    pub fn all_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .reader
                .page(cursor.as_deref(), 250, ScanDirection::Forward)
                .expect("Failed to read page");
            ids.extend(page.ids);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return ids,
            }
        }
    }

    pub fn stats(&self) -> StorageStats {
        self.store.get_stats().expect("Failed to read stats")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed base time so state timestamps are reproducible.
pub fn base_time() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_706_540_400_000).unwrap()
}

/// Record `i` with one small preview asset.
pub fn make_record(i: usize) -> PrimaryRecord {
    PrimaryRecord::new(
        format!("col-{:05}", i),
        format!("Collection {}", i),
        format!("sort-{:05}", i),
        base_time(),
    )
    .with_preview(PreviewAsset::new(format!("previews/{:05}.jpg", i), 300, 200, 4_096))
    .with_counts(12, 3)
}

/// Copy of `record` modified `minutes` after the base time.
pub fn touched(record: &PrimaryRecord, minutes: i64) -> PrimaryRecord {
    let mut updated = record.clone();
    updated.updated_at = base_time() + Duration::minutes(minutes);
    updated
}
