//! Rebuild engine entry point.
//!
//! [`RebuildEngine::run`] drives a run batch by batch: plan, write, trim
//! per-batch memory, report progress, check for cancellation. `Verify` runs
//! go to the [`ConsistencyVerifier`] instead.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use catalog_storage::IndexStore;
use catalog_types::RebuildSettings;

use crate::error::{IndexingError, RecordError};
use crate::memory::{BufferPool, MemoryProbe};
use crate::planner::RebuildPlanner;
use crate::resize::ImageResizer;
use crate::source::{AssetSource, PrimaryStore};
use crate::state_store::{RunRecord, StateStore};
use crate::thumbnail::{ThumbnailCacheAdapter, ThumbnailSettingsProvider};
use crate::verify::ConsistencyVerifier;
use crate::writer::{IndexWriter, WriteOptions};

/// Buffers kept in the pool between batches
const POOL_RETAINED_BUFFERS: usize = 16;
/// Capacity each retained buffer is shrunk to
const POOL_RETAINED_CAPACITY: usize = 64 * 1024;

/// Which records a run touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildMode {
    /// Records that changed since their last index write
    #[default]
    ChangedOnly,
    /// Two-way consistency check with repair
    Verify,
    /// Clear the index, then index everything
    Full,
    /// Index everything over the existing entries
    ForceRebuildAll,
}

impl std::fmt::Display for RebuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RebuildMode::ChangedOnly => write!(f, "changed-only"),
            RebuildMode::Verify => write!(f, "verify"),
            RebuildMode::Full => write!(f, "full"),
            RebuildMode::ForceRebuildAll => write!(f, "force-rebuild-all"),
        }
    }
}

impl FromStr for RebuildMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "changed-only" | "changed" | "incremental" => Ok(RebuildMode::ChangedOnly),
            "verify" => Ok(RebuildMode::Verify),
            "full" => Ok(RebuildMode::Full),
            "force-rebuild-all" | "force" => Ok(RebuildMode::ForceRebuildAll),
            other => Err(format!(
                "unknown rebuild mode '{}' (expected changed-only, verify, full or force-rebuild-all)",
                other
            )),
        }
    }
}

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildOptions {
    /// Classify and count without writing
    pub dry_run: bool,
    /// Keep cached thumbnails as they are
    pub skip_thumbnail_caching: bool,
}

impl RebuildOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Default::default()
        }
    }

    pub fn with_skip_thumbnails(mut self, skip: bool) -> Self {
        self.skip_thumbnail_caching = skip;
        self
    }

    /// Reject combinations that cannot be honoured.
    ///
    /// A full rebuild clears the index, and a forced rebuild exists to
    /// rewrite every entry, so neither can be simulated. Forcing a rebuild
    /// while leaving thumbnails alone defeats its purpose.
    pub fn validate(&self, mode: RebuildMode) -> Result<(), IndexingError> {
        if self.dry_run && matches!(mode, RebuildMode::Full | RebuildMode::ForceRebuildAll) {
            return Err(IndexingError::InvalidOptions(format!(
                "dry_run is not supported for {} rebuilds",
                mode
            )));
        }
        if self.skip_thumbnail_caching && mode == RebuildMode::ForceRebuildAll {
            return Err(IndexingError::InvalidOptions(
                "skip_thumbnail_caching cannot be combined with force-rebuild-all".to_string(),
            ));
        }
        Ok(())
    }
}

/// Statistics of a run, complete or partial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildSummary {
    pub mode: RebuildMode,
    pub dry_run: bool,
    /// Primary records read
    pub scanned: u64,
    /// Records whose index entries were written
    pub rebuilt: u64,
    /// Records that needed nothing
    pub skipped: u64,
    /// Written (or, in a dry run, classified) for the first time
    pub added: u64,
    /// Written (or classified) over an existing state
    pub updated: u64,
    /// Orphans removed (verify only)
    pub removed: u64,
    pub errors: Vec<RecordError>,
    pub duration_ms: u64,
    pub cancelled: bool,
    /// Pooled buffer capacity released during the run
    pub memory_reclaimed_bytes: u64,
}

impl RebuildSummary {
    pub fn new(mode: RebuildMode, dry_run: bool) -> Self {
        Self {
            mode,
            dry_run,
            ..Default::default()
        }
    }
}

/// Snapshot handed to progress callbacks after every batch.
#[derive(Debug, Clone, Default)]
pub struct RebuildProgress {
    pub mode: RebuildMode,
    pub batches_completed: u64,
    pub scanned: u64,
    pub rebuilt: u64,
    pub skipped: u64,
    pub errors: u64,
    pub resident_bytes: Option<u64>,
}

impl RebuildProgress {
    fn from_summary(summary: &RebuildSummary, batches_completed: u64) -> Self {
        Self {
            mode: summary.mode,
            batches_completed,
            scanned: summary.scanned,
            rebuilt: summary.rebuilt,
            skipped: summary.skipped,
            errors: summary.errors.len() as u64,
            resident_bytes: None,
        }
    }
}

/// Trait for receiving rebuild progress updates.
pub trait ProgressCallback: Send + Sync {
    /// Called after each batch is processed.
    fn on_progress(&self, progress: &RebuildProgress);
}

/// A no-op progress callback for when progress reporting isn't needed.
pub struct NoOpProgressCallback;

impl ProgressCallback for NoOpProgressCallback {
    fn on_progress(&self, _progress: &RebuildProgress) {}
}

/// A callback that logs progress at info level every `every` batches.
pub struct LoggingProgressCallback {
    every: u64,
}

impl LoggingProgressCallback {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl ProgressCallback for LoggingProgressCallback {
    fn on_progress(&self, progress: &RebuildProgress) {
        if progress.batches_completed % self.every == 0 {
            info!(
                mode = %progress.mode,
                batches = progress.batches_completed,
                scanned = progress.scanned,
                rebuilt = progress.rebuilt,
                skipped = progress.skipped,
                errors = progress.errors,
                rss = progress.resident_bytes,
                "Rebuild progress"
            );
        }
    }
}

/// Engine sizing, validated at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub batch_size: usize,
    pub concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_settings(&RebuildSettings::default())
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &RebuildSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            concurrency: settings.concurrency,
        }
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn validate(&self) -> Result<(), IndexingError> {
        if self.batch_size == 0 {
            return Err(IndexingError::InvalidOptions("batch_size must be > 0".to_string()));
        }
        if self.concurrency == 0 {
            return Err(IndexingError::InvalidOptions("concurrency must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Collaborators the engine is built from.
pub struct EngineParts {
    pub store: Arc<IndexStore>,
    pub primary: Arc<dyn PrimaryStore>,
    pub assets: Arc<dyn AssetSource>,
    pub resizer: Arc<dyn ImageResizer>,
    pub thumbnail_settings: Arc<dyn ThumbnailSettingsProvider>,
}

/// Index rebuild and consistency engine.
pub struct RebuildEngine {
    store: Arc<IndexStore>,
    states: StateStore,
    planner: Arc<RebuildPlanner>,
    writer: Arc<IndexWriter>,
    verifier: ConsistencyVerifier,
    pool: Arc<BufferPool>,
    progress: Arc<dyn ProgressCallback>,
}

impl RebuildEngine {
    pub fn new(parts: EngineParts, config: EngineConfig) -> Result<Self, IndexingError> {
        config.validate()?;

        let EngineParts {
            store,
            primary,
            assets,
            resizer,
            thumbnail_settings,
        } = parts;

        let pool = BufferPool::new(POOL_RETAINED_BUFFERS, POOL_RETAINED_CAPACITY);
        let states = StateStore::new(store.clone());
        let thumbnails = Arc::new(ThumbnailCacheAdapter::new(
            assets,
            resizer,
            thumbnail_settings,
            pool.clone(),
        ));
        let planner = Arc::new(RebuildPlanner::new(
            primary.clone(),
            states.clone(),
            config.batch_size,
        ));
        let writer = Arc::new(IndexWriter::new(
            store.clone(),
            thumbnails,
            config.concurrency,
        ));
        let verifier = ConsistencyVerifier::new(
            store.clone(),
            primary,
            planner.clone(),
            writer.clone(),
            pool.clone(),
            config.batch_size,
            config.concurrency,
        );

        Ok(Self {
            store,
            states,
            planner,
            writer,
            verifier,
            pool,
            progress: Arc::new(NoOpProgressCallback),
        })
    }

    /// Install a progress callback.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// The last completed run, if any.
    pub fn last_run(&self) -> Result<Option<RunRecord>, IndexingError> {
        self.states.last_run()
    }

    /// Run the engine once.
    ///
    /// Per-record failures are listed in the summary. A store outage aborts
    /// the run with [`IndexingError::Aborted`], which carries the partial
    /// summary.
    pub async fn run(
        &self,
        mode: RebuildMode,
        options: RebuildOptions,
        cancel: CancellationToken,
    ) -> Result<RebuildSummary, IndexingError> {
        options.validate(mode)?;

        let started = Instant::now();
        info!(
            mode = %mode,
            dry_run = options.dry_run,
            skip_thumbnails = options.skip_thumbnail_caching,
            "Starting index rebuild"
        );

        let summary = if mode == RebuildMode::Verify {
            let result = self.verifier.verify(&options, &cancel).await;
            let released = self.pool.release();
            match result {
                Ok(report) => {
                    let mut summary = report.into_summary(started.elapsed().as_millis() as u64);
                    summary.memory_reclaimed_bytes += released;
                    summary
                }
                Err(mut e) => {
                    if let IndexingError::Aborted { partial, .. } = &mut e {
                        partial.memory_reclaimed_bytes += released;
                    }
                    return Err(e);
                }
            }
        } else {
            let mut summary = RebuildSummary::new(mode, options.dry_run);
            let result = self.run_batches(mode, options, &cancel, &mut summary).await;
            summary.memory_reclaimed_bytes += self.pool.release();
            summary.duration_ms = started.elapsed().as_millis() as u64;
            if let Err(e) = result {
                warn!(error = %e, scanned = summary.scanned, "Rebuild aborted");
                return Err(e.aborted(summary));
            }
            summary
        };

        if !summary.dry_run {
            if let Err(e) = self
                .states
                .save_run(&RunRecord::from_summary(&summary, Utc::now()))
            {
                warn!(error = %e, "Failed to record run metadata");
            }
        }

        info!(
            mode = %mode,
            scanned = summary.scanned,
            rebuilt = summary.rebuilt,
            skipped = summary.skipped,
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            errors = summary.errors.len(),
            duration_ms = summary.duration_ms,
            reclaimed_bytes = summary.memory_reclaimed_bytes,
            cancelled = summary.cancelled,
            "Index rebuild complete"
        );
        Ok(summary)
    }

    async fn run_batches(
        &self,
        mode: RebuildMode,
        options: RebuildOptions,
        cancel: &CancellationToken,
        summary: &mut RebuildSummary,
    ) -> Result<(), IndexingError> {
        if mode == RebuildMode::Full {
            let cleared = self.store.clear_index()?;
            info!(cleared, "Cleared index for full rebuild");
        }

        let write_options = WriteOptions {
            skip_thumbnails: options.skip_thumbnail_caching,
        };
        let mut probe = MemoryProbe::new();
        let mut batches_completed = 0u64;
        let mut batches = self.planner.plan(mode);

        while let Some(batch) = batches.next().await {
            if cancel.is_cancelled() {
                info!(batches = batches_completed, "Rebuild cancelled");
                summary.cancelled = true;
                break;
            }

            let batch = batch?;
            let rss_before = probe.resident_bytes();
            summary.scanned += batch.scanned();

            let (work, skipped, invalid) = batch.into_work();
            summary.skipped += skipped;
            summary.errors.extend(invalid);

            if options.dry_run {
                let added = work.iter().filter(|w| w.prior.is_none()).count() as u64;
                summary.added += added;
                summary.updated += work.len() as u64 - added;
            } else {
                let outcome = self.writer.write_batch(work, write_options).await?;
                summary.rebuilt += outcome.written.len() as u64;
                summary.added += outcome.added();
                summary.updated += outcome.updated();
                summary.errors.extend(outcome.failures);
            }

            // Per-batch buffers are gone by now; cap what the pool keeps
            summary.memory_reclaimed_bytes += self.pool.trim();
            let rss_after = probe.resident_bytes();
            batches_completed += 1;
            debug!(
                batch = batches_completed,
                rss_before = rss_before,
                rss_after = rss_after,
                pooled_bytes = self.pool.retained_bytes(),
                "Batch complete"
            );

            let mut progress = RebuildProgress::from_summary(summary, batches_completed);
            progress.resident_bytes = rss_after;
            self.progress.on_progress(&progress);
        }

        if mode == RebuildMode::Full && !summary.cancelled {
            self.store.compact()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordErrorKind;
    use crate::mock::{InMemoryAssetSource, InMemoryPrimaryStore, MockResizer};
    use crate::thumbnail::StaticThumbnailSettings;
    use catalog_storage::Keyspace;
    use catalog_types::{PreviewAsset, PrimaryRecord};
    use chrono::{DateTime, TimeZone};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Fixture {
        engine: RebuildEngine,
        store: Arc<IndexStore>,
        primary: Arc<InMemoryPrimaryStore>,
        _temp: TempDir,
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn record(i: usize) -> PrimaryRecord {
        PrimaryRecord::new(format!("c{:04}", i), format!("Coll {}", i), format!("k{:04}", i), at(1_000))
            .with_preview(PreviewAsset::new(format!("{}.jpg", i), 100, 100, 64))
    }

    fn fixture(count: usize, config: EngineConfig) -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(IndexStore::open(temp.path()).unwrap());
        let primary = Arc::new(InMemoryPrimaryStore::with_records((0..count).map(record)));
        let assets = InMemoryAssetSource::new();
        for i in 0..count {
            assets.insert(format!("{}.jpg", i), vec![7; 64]);
        }
        let engine = RebuildEngine::new(
            EngineParts {
                store: store.clone(),
                primary: primary.clone(),
                assets: Arc::new(assets),
                resizer: Arc::new(MockResizer::new(32)),
                thumbnail_settings: Arc::new(StaticThumbnailSettings::default()),
            },
            config,
        )
        .unwrap();
        Fixture {
            engine,
            store,
            primary,
            _temp: temp,
        }
    }

    #[test]
    fn test_mode_parse_and_display() {
        assert_eq!("changed-only".parse::<RebuildMode>().unwrap(), RebuildMode::ChangedOnly);
        assert_eq!("FORCE_REBUILD_ALL".parse::<RebuildMode>().unwrap(), RebuildMode::ForceRebuildAll);
        assert_eq!("full".parse::<RebuildMode>().unwrap(), RebuildMode::Full);
        assert!("sometimes".parse::<RebuildMode>().is_err());
        assert_eq!(RebuildMode::Verify.to_string(), "verify");
        assert_eq!(RebuildMode::default(), RebuildMode::ChangedOnly);
    }

    #[test]
    fn test_option_validation() {
        assert!(RebuildOptions::dry_run().validate(RebuildMode::Verify).is_ok());
        assert!(RebuildOptions::dry_run().validate(RebuildMode::ChangedOnly).is_ok());
        assert!(RebuildOptions::dry_run().validate(RebuildMode::Full).is_err());
        assert!(RebuildOptions::dry_run()
            .validate(RebuildMode::ForceRebuildAll)
            .is_err());
        assert!(RebuildOptions::default()
            .with_skip_thumbnails(true)
            .validate(RebuildMode::ForceRebuildAll)
            .is_err());
        assert!(RebuildOptions::default()
            .with_skip_thumbnails(true)
            .validate(RebuildMode::Full)
            .is_ok());
    }

    #[test]
    fn test_engine_config_validation() {
        assert!(EngineConfig::default().validate().is_ok());
        assert_eq!(EngineConfig::default().batch_size, 100);
        assert!(EngineConfig::default().with_batch_size(0).validate().is_err());
        assert!(EngineConfig::default().with_concurrency(0).validate().is_err());
    }

    #[tokio::test]
    async fn test_invalid_options_rejected_before_work() {
        let f = fixture(5, EngineConfig::default());
        let err = f
            .engine
            .run(RebuildMode::Full, RebuildOptions::dry_run(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexingError::InvalidOptions(_)));
        assert_eq!(f.store.get_stats().unwrap().state_count, 0);
    }

    #[tokio::test]
    async fn test_changed_only_is_idempotent() {
        let f = fixture(30, EngineConfig::default().with_batch_size(10));
        let first = f
            .engine
            .run(RebuildMode::ChangedOnly, RebuildOptions::default(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.scanned, 30);
        assert_eq!(first.rebuilt, 30);
        assert_eq!(first.added, 30);

        let second = f
            .engine
            .run(RebuildMode::ChangedOnly, RebuildOptions::default(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(second.rebuilt, 0);
        assert_eq!(second.skipped, 30);

        let last = f.engine.last_run().unwrap().unwrap();
        assert_eq!(last.skipped, 30);
    }

    #[tokio::test]
    async fn test_dry_run_changed_only_writes_nothing() {
        let f = fixture(12, EngineConfig::default());
        let summary = f
            .engine
            .run(RebuildMode::ChangedOnly, RebuildOptions::dry_run(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.added, 12);
        assert_eq!(summary.rebuilt, 0);
        assert_eq!(f.store.get_stats().unwrap().state_count, 0);
        assert!(f.engine.last_run().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_full_rebuild_clears_stale_entries() {
        let f = fixture(10, EngineConfig::default());
        f.engine
            .run(RebuildMode::ChangedOnly, RebuildOptions::default(), CancellationToken::new())
            .await
            .unwrap();

        f.primary.remove("c0003");
        let summary = f
            .engine
            .run(RebuildMode::Full, RebuildOptions::default(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.rebuilt, 9);
        assert!(f.store.get_state("c0003").unwrap().is_none());
        assert_eq!(f.store.get_stats().unwrap().ordered_count, 9);
    }

    #[tokio::test]
    async fn test_force_rebuild_overwrites_in_place() {
        let f = fixture(10, EngineConfig::default());
        f.engine
            .run(RebuildMode::ChangedOnly, RebuildOptions::default(), CancellationToken::new())
            .await
            .unwrap();
        let summary = f
            .engine
            .run(RebuildMode::ForceRebuildAll, RebuildOptions::default(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.rebuilt, 10);
        assert_eq!(summary.updated, 10);
        assert_eq!(summary.added, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_returns_partial() {
        let f = fixture(10, EngineConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = f
            .engine
            .run(RebuildMode::ChangedOnly, RebuildOptions::default(), cancel)
            .await
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.scanned, 0);
    }

    struct CancelAfter {
        batches: u64,
        token: CancellationToken,
        seen: Mutex<Vec<u64>>,
    }

    impl ProgressCallback for CancelAfter {
        fn on_progress(&self, progress: &RebuildProgress) {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(progress.scanned);
            }
            if progress.batches_completed >= self.batches {
                self.token.cancel();
            }
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_at_batch_boundary() {
        let token = CancellationToken::new();
        let callback = Arc::new(CancelAfter {
            batches: 2,
            token: token.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let f = fixture(50, EngineConfig::default().with_batch_size(10));
        let engine = f.engine.with_progress(callback.clone());

        let summary = engine
            .run(RebuildMode::ChangedOnly, RebuildOptions::default(), token)
            .await
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.scanned, 20);
        assert_eq!(summary.rebuilt, 20);
        assert_eq!(*callback.seen.lock().unwrap(), vec![10, 20]);
        assert_eq!(f.store.get_stats().unwrap().state_count, 20);
    }

    #[tokio::test]
    async fn test_primary_outage_aborts_with_partial_stats() {
        let f = fixture(30, EngineConfig::default().with_batch_size(10));
        f.primary.fail_after(25);

        let err = f
            .engine
            .run(RebuildMode::ChangedOnly, RebuildOptions::default(), CancellationToken::new())
            .await
            .unwrap_err();
        let partial = err.partial().expect("partial stats");
        assert_eq!(partial.scanned, 20);
        assert_eq!(partial.rebuilt, 20);
        assert!(matches!(
            err,
            IndexingError::Aborted { ref source, .. } if matches!(**source, IndexingError::PrimaryUnavailable(_))
        ));
    }

    async fn run(f: &Fixture, mode: RebuildMode, options: RebuildOptions) -> RebuildSummary {
        f.engine
            .run(mode, options, CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_undecodable_state_is_rebuilt() {
        let f = fixture(10, EngineConfig::default());
        run(&f, RebuildMode::ChangedOnly, RebuildOptions::default()).await;

        f.store.put_raw(Keyspace::State, "c0003", b"garbage").unwrap();
        let summary = run(&f, RebuildMode::ChangedOnly, RebuildOptions::default()).await;
        assert_eq!(summary.rebuilt, 1);
        assert_eq!(summary.added, 1);
        assert_eq!(summary.skipped, 9);
        assert!(summary.errors.is_empty());

        let state = f.store.get_state("c0003").unwrap().expect("state rewritten");
        assert!(state.has_first_thumbnail);
        assert_eq!(f.store.get_stats().unwrap().ordered_count, 10);
    }

    #[tokio::test]
    async fn test_verify_keeps_entries_whose_record_is_unreadable() {
        let f = fixture(10, EngineConfig::default());
        run(&f, RebuildMode::ChangedOnly, RebuildOptions::default()).await;
        f.primary.mark_unreadable("c0004");

        for options in [RebuildOptions::dry_run(), RebuildOptions::default()] {
            let summary = run(&f, RebuildMode::Verify, options).await;
            assert_eq!(summary.removed, 0);
            assert_eq!(summary.errors.len(), 1);
            assert_eq!(summary.errors[0].id, "c0004");
            assert_eq!(summary.errors[0].kind, RecordErrorKind::InvalidRecord);
        }
        assert!(f.store.get_state("c0004").unwrap().is_some());
        assert!(f.store.member_key("c0004").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stateless_leftover_counted_once() {
        let f = fixture(10, EngineConfig::default());
        run(&f, RebuildMode::ChangedOnly, RebuildOptions::default()).await;

        f.primary.remove("c0005");
        f.store.delete_raw(Keyspace::State, "c0005").unwrap();
        assert!(f.store.member_key("c0005").unwrap().is_some());
        assert!(f.store.get_thumbnail("c0005").unwrap().is_some());

        let dry = run(&f, RebuildMode::Verify, RebuildOptions::dry_run()).await;
        assert_eq!(dry.removed, 1);

        let repaired = run(&f, RebuildMode::Verify, RebuildOptions::default()).await;
        assert_eq!(repaired.removed, dry.removed);
        assert!(f.store.member_key("c0005").unwrap().is_none());
        assert!(f.store.get_thumbnail("c0005").unwrap().is_none());
        assert_eq!(f.store.get_stats().unwrap().ordered_count, 9);
    }

    #[tokio::test]
    async fn test_verify_releases_buffer_pool() {
        let f = fixture(10, EngineConfig::default().with_batch_size(4));
        let summary = run(&f, RebuildMode::Verify, RebuildOptions::default()).await;
        assert_eq!(summary.added, 10);
        assert_eq!(summary.rebuilt, 10);
        assert!(summary.memory_reclaimed_bytes > 0);
    }
}
