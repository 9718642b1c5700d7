//! Index writer.
//!
//! Prepares every record of a batch concurrently (asset read, resize
//! decision, state transition), then commits the whole batch in a single
//! RocksDB write batch. A record that fails to prepare is reported and left
//! out; the rest of the batch is still written.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use catalog_storage::{EntryWrite, IndexStore, OrderKey, ThumbnailWrite};
use catalog_types::{
    CollectionIndexState, IndexStateEvent, PrimaryRecord, RebuildReason, ThumbnailChange,
};

use crate::error::{IndexingError, RecordError};
use crate::thumbnail::ThumbnailCacheAdapter;

/// One record scheduled for (re)indexing.
#[derive(Debug, Clone)]
pub struct WriteItem {
    pub record: PrimaryRecord,
    pub prior: Option<CollectionIndexState>,
    pub reason: RebuildReason,
}

/// A record whose entries were committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenRecord {
    pub id: String,
    pub reason: RebuildReason,
}

/// Result of writing one batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub written: Vec<WrittenRecord>,
    pub failures: Vec<RecordError>,
}

impl BatchOutcome {
    /// Records written for the first time.
    pub fn added(&self) -> u64 {
        self.written
            .iter()
            .filter(|w| w.reason == RebuildReason::NeverIndexed)
            .count() as u64
    }

    /// Records rewritten over an existing state.
    pub fn updated(&self) -> u64 {
        self.written.len() as u64 - self.added()
    }
}

/// Per-batch write options.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Leave cached thumbnails untouched
    pub skip_thumbnails: bool,
}

struct PreparedEntry {
    write: EntryWrite,
    reason: RebuildReason,
}

/// Writes ordered-set, thumbnail and state entries.
pub struct IndexWriter {
    store: Arc<IndexStore>,
    thumbnails: Arc<ThumbnailCacheAdapter>,
    concurrency: usize,
}

impl IndexWriter {
    pub fn new(
        store: Arc<IndexStore>,
        thumbnails: Arc<ThumbnailCacheAdapter>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            thumbnails,
            concurrency: concurrency.max(1),
        }
    }

    /// Write a batch of records.
    ///
    /// Per-record failures are returned in the outcome. Only a store
    /// connectivity failure is returned as an error.
    pub async fn write_batch(
        &self,
        items: Vec<WriteItem>,
        options: WriteOptions,
    ) -> Result<BatchOutcome, IndexingError> {
        let mut outcome = BatchOutcome::default();
        if items.is_empty() {
            return Ok(outcome);
        }

        let prepared: Vec<Result<PreparedEntry, RecordError>> = stream::iter(items)
            .map(|item| self.prepare(item, options))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut entries = Vec::with_capacity(prepared.len());
        for result in prepared {
            match result {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    warn!(record_id = %err.id, kind = %err.kind, error = %err.message, "Record failed");
                    outcome.failures.push(err);
                }
            }
        }

        let (writes, reasons): (Vec<EntryWrite>, Vec<RebuildReason>) =
            entries.into_iter().map(|e| (e.write, e.reason)).unzip();
        match self.store.commit_entries(&writes) {
            Ok(()) => {
                outcome.written = writes
                    .into_iter()
                    .zip(reasons)
                    .map(|(w, reason)| WrittenRecord {
                        id: w.order_key.id,
                        reason,
                    })
                    .collect();
            }
            Err(e) if e.is_connectivity() => return Err(IndexingError::from_store(e)),
            Err(e) => {
                warn!(error = %e, count = writes.len(), "Batch commit failed, retrying per record");
                self.commit_individually(writes, reasons, &mut outcome)?;
            }
        }

        debug!(
            written = outcome.written.len(),
            failed = outcome.failures.len(),
            "Batch written"
        );
        Ok(outcome)
    }

    fn commit_individually(
        &self,
        writes: Vec<EntryWrite>,
        reasons: Vec<RebuildReason>,
        outcome: &mut BatchOutcome,
    ) -> Result<(), IndexingError> {
        for (write, reason) in writes.into_iter().zip(reasons) {
            match self.store.commit_entries(std::slice::from_ref(&write)) {
                Ok(()) => outcome.written.push(WrittenRecord {
                    id: write.order_key.id,
                    reason,
                }),
                Err(e) if e.is_connectivity() => return Err(IndexingError::from_store(e)),
                Err(e) => {
                    warn!(record_id = %write.id(), error = %e, "Record write failed");
                    outcome.failures.push(RecordError::write(write.id(), &e));
                }
            }
        }
        Ok(())
    }

    async fn prepare(
        &self,
        item: WriteItem,
        options: WriteOptions,
    ) -> Result<PreparedEntry, RecordError> {
        let WriteItem {
            record,
            prior,
            reason,
        } = item;

        let (thumbnail, change_path) = if options.skip_thumbnails {
            (ThumbnailWrite::Keep, None)
        } else {
            match record.representative_preview() {
                Some(asset) => {
                    let entry = self
                        .thumbnails
                        .prepare_for_cache(asset)
                        .await
                        .map_err(|e| RecordError::asset(&record.id, &e))?;
                    (ThumbnailWrite::Put(entry), Some(asset.path.clone()))
                }
                None => (ThumbnailWrite::Remove, None),
            }
        };

        let change = match (&thumbnail, change_path.as_deref()) {
            (ThumbnailWrite::Put(_), Some(path)) => ThumbnailChange::Cached(path),
            (ThumbnailWrite::Remove, _) => ThumbnailChange::Cleared,
            _ => ThumbnailChange::Unchanged,
        };

        let state = CollectionIndexState::apply(
            prior.as_ref(),
            IndexStateEvent::Indexed {
                record: &record,
                thumbnail: change,
                at: Utc::now(),
            },
        )
        .ok_or_else(|| RecordError::write(&record.id, &"state transition produced no state"))?;

        debug!(record_id = %record.id, reason = %reason, "Prepared index entries");
        Ok(PreparedEntry {
            write: EntryWrite {
                order_key: OrderKey::for_record(&record),
                thumbnail,
                state,
            },
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordErrorKind;
    use crate::memory::BufferPool;
    use crate::mock::{InMemoryAssetSource, MockResizer};
    use crate::thumbnail::StaticThumbnailSettings;
    use catalog_types::PreviewAsset;
    use tempfile::TempDir;

    struct Fixture {
        writer: IndexWriter,
        store: Arc<IndexStore>,
        assets: Arc<InMemoryAssetSource>,
        _temp: TempDir,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(IndexStore::open(temp.path()).unwrap());
        let assets = Arc::new(InMemoryAssetSource::new());
        let thumbnails = Arc::new(ThumbnailCacheAdapter::new(
            assets.clone(),
            Arc::new(MockResizer::new(64)),
            Arc::new(StaticThumbnailSettings::default()),
            BufferPool::new(8, 1024),
        ));
        Fixture {
            writer: IndexWriter::new(store.clone(), thumbnails, 4),
            store,
            assets,
            _temp: temp,
        }
    }

    fn item(id: &str, preview: Option<&str>) -> WriteItem {
        let mut record = PrimaryRecord::new(id, format!("Name {}", id), id, Utc::now());
        if let Some(path) = preview {
            record = record.with_preview(PreviewAsset::new(path, 100, 100, 100));
        }
        WriteItem {
            record,
            prior: None,
            reason: RebuildReason::NeverIndexed,
        }
    }

    #[tokio::test]
    async fn test_write_batch_commits_all_keyspaces() {
        let f = fixture();
        f.assets.insert("a.jpg", vec![1; 100]);

        let outcome = f
            .writer
            .write_batch(vec![item("a", Some("a.jpg")), item("b", None)], WriteOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.written.len(), 2);
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.added(), 2);

        let a = f.store.get_state("a").unwrap().unwrap();
        assert!(a.has_first_thumbnail);
        assert_eq!(a.first_thumbnail_source_path.as_deref(), Some("a.jpg"));
        assert!(f.store.get_thumbnail("a").unwrap().is_some());

        let b = f.store.get_state("b").unwrap().unwrap();
        assert!(!b.has_first_thumbnail);
        assert!(f.store.get_thumbnail("b").unwrap().is_none());
        assert!(f.store.member_key("b").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_asset_fails_only_its_record() {
        let f = fixture();
        f.assets.insert("ok.jpg", vec![1; 100]);

        let outcome = f
            .writer
            .write_batch(
                vec![item("ok", Some("ok.jpg")), item("bad", Some("missing.jpg"))],
                WriteOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.written.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].id, "bad");
        assert_eq!(outcome.failures[0].kind, RecordErrorKind::AssetNotFound);
        assert!(f.store.get_state("bad").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_skip_thumbnails_keeps_existing_blob() {
        let f = fixture();
        f.assets.insert("a.jpg", vec![1; 100]);
        f.writer
            .write_batch(vec![item("a", Some("a.jpg"))], WriteOptions::default())
            .await
            .unwrap();

        // Asset gone, but thumbnails are skipped so the record still writes
        f.assets.remove("a.jpg");
        let mut again = item("a", Some("a.jpg"));
        again.prior = f.store.get_state("a").unwrap();
        again.reason = RebuildReason::SourceUpdated;

        let outcome = f
            .writer
            .write_batch(
                vec![again],
                WriteOptions {
                    skip_thumbnails: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.updated(), 1);
        assert!(f.store.get_thumbnail("a").unwrap().is_some());
        assert!(f.store.get_state("a").unwrap().unwrap().has_first_thumbnail);
    }

    #[tokio::test]
    async fn test_bounded_concurrency_handles_large_batch() {
        let f = fixture();
        let items: Vec<_> = (0..100).map(|i| item(&format!("r{:03}", i), None)).collect();
        let outcome = f
            .writer
            .write_batch(items, WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.written.len(), 100);
        assert_eq!(f.store.get_stats().unwrap().state_count, 100);
    }
}
