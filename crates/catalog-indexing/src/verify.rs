//! Two-way consistency check between the primary store and the index.
//!
//! Forward: every primary record is classified against its state (add,
//! update, or skip). Reverse: every id found in the index keyspaces is
//! looked up in the primary store; missing or deleted records are orphans.
//! Counts are classifications, so a dry run reports what a real run would
//! do. Write failures of a real run are listed in `errors`.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use catalog_storage::{IndexStore, Keyspace};
use catalog_types::RebuildReason;

use crate::error::{IndexingError, RecordError, RecordErrorKind};
use crate::memory::{BufferPool, MemoryProbe};
use crate::planner::{PlanAction, RebuildPlanner};
use crate::rebuild::{RebuildMode, RebuildOptions, RebuildSummary};
use crate::source::PrimaryStore;
use crate::writer::{IndexWriter, WriteOptions};

/// Outcome of a verify run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Primary records with no state
    pub added: u64,
    /// Primary records with stale state or a drifted thumbnail
    pub updated: u64,
    /// Index ids with no live primary record
    pub removed: u64,
    pub dry_run: bool,
    /// Primary records visited by the forward pass
    pub scanned: u64,
    /// Records that needed nothing
    pub skipped: u64,
    /// Adds and updates actually written
    pub written: u64,
    pub errors: Vec<RecordError>,
    pub cancelled: bool,
    /// Pooled buffer capacity trimmed between forward batches
    pub memory_reclaimed_bytes: u64,
}

impl VerifyReport {
    /// Whether the index and the primary store disagreed anywhere.
    pub fn drift_detected(&self) -> bool {
        self.added + self.updated + self.removed > 0
    }

    /// Express the report as run statistics.
    pub fn into_summary(self, duration_ms: u64) -> RebuildSummary {
        RebuildSummary {
            mode: RebuildMode::Verify,
            dry_run: self.dry_run,
            scanned: self.scanned,
            rebuilt: self.written,
            skipped: self.skipped,
            added: self.added,
            updated: self.updated,
            removed: self.removed,
            errors: self.errors,
            duration_ms,
            cancelled: self.cancelled,
            memory_reclaimed_bytes: self.memory_reclaimed_bytes,
        }
    }
}

/// Finds and repairs drift between the primary store and the index.
pub struct ConsistencyVerifier {
    store: Arc<IndexStore>,
    primary: Arc<dyn PrimaryStore>,
    planner: Arc<RebuildPlanner>,
    writer: Arc<IndexWriter>,
    pool: Arc<BufferPool>,
    batch_size: usize,
    concurrency: usize,
}

impl ConsistencyVerifier {
    pub fn new(
        store: Arc<IndexStore>,
        primary: Arc<dyn PrimaryStore>,
        planner: Arc<RebuildPlanner>,
        writer: Arc<IndexWriter>,
        pool: Arc<BufferPool>,
        batch_size: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            primary,
            planner,
            writer,
            pool,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    /// Run both passes and, unless `dry_run`, repair what they find.
    ///
    /// Cancellation is checked between batches. A fatal error is returned
    /// as [`IndexingError::Aborted`] carrying the partial report.
    pub async fn verify(
        &self,
        options: &RebuildOptions,
        cancel: &CancellationToken,
    ) -> Result<VerifyReport, IndexingError> {
        let started = Instant::now();
        let mut report = VerifyReport {
            dry_run: options.dry_run,
            ..Default::default()
        };

        info!(dry_run = options.dry_run, "Starting consistency verification");

        let result = async {
            self.forward_pass(options, cancel, &mut report).await?;
            if !report.cancelled {
                self.reverse_pass(options, cancel, &mut report).await?;
            }
            Ok::<(), IndexingError>(())
        }
        .await;

        if let Err(e) = result {
            let elapsed = started.elapsed().as_millis() as u64;
            return Err(e.aborted(report.into_summary(elapsed)));
        }

        info!(
            added = report.added,
            updated = report.updated,
            removed = report.removed,
            errors = report.errors.len(),
            cancelled = report.cancelled,
            "Consistency verification complete"
        );
        if report.drift_detected() {
            warn!(
                added = report.added,
                updated = report.updated,
                removed = report.removed,
                "Index drift detected"
            );
        }
        Ok(report)
    }

    /// Primary -> index.
    async fn forward_pass(
        &self,
        options: &RebuildOptions,
        cancel: &CancellationToken,
        report: &mut VerifyReport,
    ) -> Result<(), IndexingError> {
        let mut probe = MemoryProbe::new();
        let mut batch_no = 0u64;
        let mut batches = self.planner.plan(RebuildMode::Verify);
        while let Some(batch) = batches.next().await {
            if cancel.is_cancelled() {
                info!("Verification cancelled during forward pass");
                report.cancelled = true;
                return Ok(());
            }

            let batch = batch?;
            report.scanned += batch.scanned();
            for item in &batch.items {
                match item.action {
                    PlanAction::Rebuild(RebuildReason::NeverIndexed) => report.added += 1,
                    PlanAction::Rebuild(_) => report.updated += 1,
                    PlanAction::Skip => report.skipped += 1,
                }
            }

            let (work, _, invalid) = batch.into_work();
            report.errors.extend(invalid);
            if options.dry_run || work.is_empty() {
                continue;
            }

            let rss_before = probe.resident_bytes();
            let outcome = self
                .writer
                .write_batch(
                    work,
                    WriteOptions {
                        skip_thumbnails: options.skip_thumbnail_caching,
                    },
                )
                .await?;
            report.written += outcome.written.len() as u64;
            report.errors.extend(outcome.failures);

            report.memory_reclaimed_bytes += self.pool.trim();
            batch_no += 1;
            debug!(
                batch = batch_no,
                rss_before = rss_before,
                rss_after = probe.resident_bytes(),
                pooled_bytes = self.pool.retained_bytes(),
                "Repair batch complete"
            );
        }
        Ok(())
    }

    /// Index -> primary, over every keyspace that can hold a record id.
    ///
    /// Each id is looked at by exactly one scan: the state scan takes ids
    /// with a state, the membership scan stateless leftovers, and the
    /// thumbnail scan ids found in neither.
    async fn reverse_pass(
        &self,
        options: &RebuildOptions,
        cancel: &CancellationToken,
        report: &mut VerifyReport,
    ) -> Result<(), IndexingError> {
        for keyspace in [Keyspace::State, Keyspace::Members, Keyspace::Thumbnails] {
            let mut after: Option<String> = None;
            loop {
                if cancel.is_cancelled() {
                    info!("Verification cancelled during reverse pass");
                    report.cancelled = true;
                    return Ok(());
                }

                let ids = self
                    .store
                    .scan_ids(keyspace, after.as_deref(), self.batch_size)?;
                let Some(last) = ids.last().cloned() else {
                    break;
                };

                let mut candidates = Vec::with_capacity(ids.len());
                for id in ids {
                    if self.owned_by_earlier_scan(keyspace, &id)? {
                        continue;
                    }
                    candidates.push(id);
                }

                let orphans = self.find_orphans(candidates, report).await?;
                for id in orphans {
                    report.removed += 1;
                    if options.dry_run {
                        debug!(record_id = %id, "Would remove orphan");
                        continue;
                    }
                    match self.store.remove_entry(&id) {
                        Ok(_) => debug!(record_id = %id, "Removed orphan"),
                        Err(e) if e.is_connectivity() => return Err(IndexingError::from_store(e)),
                        Err(e) => {
                            warn!(record_id = %id, error = %e, "Failed to remove orphan");
                            report.errors.push(RecordError::write(id, &e));
                        }
                    }
                }

                after = Some(last);
            }
        }
        Ok(())
    }

    fn owned_by_earlier_scan(&self, keyspace: Keyspace, id: &str) -> Result<bool, IndexingError> {
        let earlier: &[Keyspace] = match keyspace {
            Keyspace::State => &[],
            Keyspace::Members => &[Keyspace::State],
            Keyspace::Thumbnails => &[Keyspace::State, Keyspace::Members],
        };
        for other in earlier {
            if self.store.contains(*other, id)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Look up candidates in the primary store concurrently.
    ///
    /// An id whose primary record does not decode is reported as a record
    /// error and kept. Store outages abort the pass.
    async fn find_orphans(
        &self,
        ids: Vec<String>,
        report: &mut VerifyReport,
    ) -> Result<Vec<String>, IndexingError> {
        let lookups: Vec<_> = stream::iter(ids)
            .map(|id| async move {
                let found = self.primary.get_by_id(&id).await;
                (id, found)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut orphans = Vec::new();
        for (id, found) in lookups {
            match found {
                Ok(Some(record)) if !record.deleted => {}
                Ok(_) => orphans.push(id),
                Err(e) => {
                    let err = IndexingError::from(e);
                    if err.is_fatal() {
                        return Err(err);
                    }
                    warn!(record_id = %id, error = %err, "Primary record unreadable, keeping index entry");
                    report
                        .errors
                        .push(RecordError::new(id, RecordErrorKind::InvalidRecord, err.to_string()));
                }
            }
        }
        orphans.sort();
        Ok(orphans)
    }
}
