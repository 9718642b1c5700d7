//! Rebuild planner.
//!
//! Streams the primary store in fixed-size chunks, fetches the matching
//! states with one multi-get per chunk and classifies each record as
//! rebuild or skip. Neither the record list nor the state map is ever held
//! in full.

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, warn};

use catalog_types::{CollectionIndexState, PrimaryRecord, RebuildReason};

use crate::error::{IndexingError, RecordError, RecordErrorKind};
use crate::rebuild::RebuildMode;
use crate::source::{PrimaryStore, SourceError};
use crate::state_store::StateStore;
use crate::writer::WriteItem;

/// Classification of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    Rebuild(RebuildReason),
    Skip,
}

/// One classified record.
#[derive(Debug, Clone)]
pub struct PlannedItem {
    pub record: PrimaryRecord,
    pub prior_state: Option<CollectionIndexState>,
    pub action: PlanAction,
}

/// A classified chunk of the primary store.
#[derive(Debug, Default)]
pub struct PlannedBatch {
    pub items: Vec<PlannedItem>,
    /// Entries the primary store could not decode
    pub invalid: Vec<RecordError>,
}

impl PlannedBatch {
    /// Entries read from the primary store, decodable or not.
    pub fn scanned(&self) -> u64 {
        (self.items.len() + self.invalid.len()) as u64
    }

    pub fn rebuild_count(&self) -> u64 {
        self.items
            .iter()
            .filter(|i| matches!(i.action, PlanAction::Rebuild(_)))
            .count() as u64
    }

    pub fn skip_count(&self) -> u64 {
        self.items.len() as u64 - self.rebuild_count()
    }

    /// Split into the records to write and the skip count.
    pub fn into_work(self) -> (Vec<WriteItem>, u64, Vec<RecordError>) {
        let mut work = Vec::with_capacity(self.items.len());
        let mut skipped = 0;
        for item in self.items {
            match item.action {
                PlanAction::Rebuild(reason) => work.push(WriteItem {
                    record: item.record,
                    prior: item.prior_state,
                    reason,
                }),
                PlanAction::Skip => skipped += 1,
            }
        }
        (work, skipped, self.invalid)
    }
}

/// Classify one record against its prior state.
///
/// Deleted records are never indexed; removing them is left to `Verify`.
pub fn classify(
    mode: RebuildMode,
    record: &PrimaryRecord,
    prior: Option<&CollectionIndexState>,
) -> PlanAction {
    if record.deleted {
        return PlanAction::Skip;
    }
    match mode {
        RebuildMode::Full | RebuildMode::ForceRebuildAll => {
            PlanAction::Rebuild(RebuildReason::Forced)
        }
        RebuildMode::ChangedOnly | RebuildMode::Verify => {
            let Some(state) = prior else {
                return PlanAction::Rebuild(RebuildReason::NeverIndexed);
            };
            if let Some(reason) = state.change_reason(record) {
                return PlanAction::Rebuild(reason);
            }
            if mode == RebuildMode::Verify && state.thumbnail_drifted(record) {
                return PlanAction::Rebuild(RebuildReason::ThumbnailChanged);
            }
            PlanAction::Skip
        }
    }
}

/// Streams classified batches for a rebuild mode.
pub struct RebuildPlanner {
    primary: Arc<dyn PrimaryStore>,
    states: StateStore,
    batch_size: usize,
}

impl RebuildPlanner {
    pub fn new(primary: Arc<dyn PrimaryStore>, states: StateStore, batch_size: usize) -> Self {
        Self {
            primary,
            states,
            batch_size: batch_size.max(1),
        }
    }

    /// Plan a run. Each item is one batch of at most `batch_size` records.
    ///
    /// A primary store outage ends the stream with `PrimaryUnavailable`.
    pub fn plan(
        &self,
        mode: RebuildMode,
    ) -> BoxStream<'_, Result<PlannedBatch, IndexingError>> {
        self.primary
            .stream_all()
            .chunks(self.batch_size)
            .map(move |chunk| self.classify_chunk(mode, chunk))
            .boxed()
    }

    fn classify_chunk(
        &self,
        mode: RebuildMode,
        chunk: Vec<Result<PrimaryRecord, SourceError>>,
    ) -> Result<PlannedBatch, IndexingError> {
        let mut batch = PlannedBatch::default();
        let mut records = Vec::with_capacity(chunk.len());
        for entry in chunk {
            match entry {
                Ok(record) => records.push(record),
                Err(SourceError::InvalidRecord { location, message }) => {
                    warn!(location = %location, error = %message, "Skipping undecodable record");
                    batch.invalid.push(RecordError::new(
                        location,
                        RecordErrorKind::InvalidRecord,
                        message,
                    ));
                }
                Err(e @ SourceError::Unavailable(_)) => return Err(e.into()),
            }
        }

        // A full rebuild starts from an empty index; no state to read
        let priors = if mode == RebuildMode::Full {
            vec![None; records.len()]
        } else {
            let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
            self.states.get_many(&ids)?
        };

        batch.items = records
            .into_iter()
            .zip(priors)
            .map(|(record, prior_state)| {
                let action = classify(mode, &record, prior_state.as_ref());
                PlannedItem {
                    record,
                    prior_state,
                    action,
                }
            })
            .collect();

        debug!(
            mode = %mode,
            records = batch.items.len(),
            rebuild = batch.rebuild_count(),
            "Planned batch"
        );
        Ok(batch)
    }
}
