//! Per-record state lookups and run bookkeeping.
//!
//! The state keyspace is the only thing consulted when deciding whether a
//! record needs re-indexing. Lookups for a batch go out as one multi-get.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use catalog_storage::IndexStore;
use catalog_types::CollectionIndexState;

use crate::error::IndexingError;
use crate::rebuild::{RebuildMode, RebuildSummary};

/// Record of the last completed run, kept in the metadata keyspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub mode: RebuildMode,
    pub scanned: u64,
    pub rebuilt: u64,
    pub skipped: u64,
    pub added: u64,
    pub updated: u64,
    pub removed: u64,
    pub error_count: u64,
    pub duration_ms: u64,
    pub cancelled: bool,

    /// When the run finished (milliseconds since epoch for JSON compatibility)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub finished_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn from_summary(summary: &RebuildSummary, finished_at: DateTime<Utc>) -> Self {
        Self {
            mode: summary.mode,
            scanned: summary.scanned,
            rebuilt: summary.rebuilt,
            skipped: summary.skipped,
            added: summary.added,
            updated: summary.updated,
            removed: summary.removed,
            error_count: summary.errors.len() as u64,
            duration_ms: summary.duration_ms,
            cancelled: summary.cancelled,
            finished_at,
        }
    }

    /// Serialize to JSON bytes for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexingError> {
        serde_json::to_vec(self).map_err(IndexingError::from)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexingError> {
        serde_json::from_slice(bytes).map_err(IndexingError::from)
    }
}

/// Read access to [`CollectionIndexState`] plus run metadata.
#[derive(Clone)]
pub struct StateStore {
    store: Arc<IndexStore>,
}

impl StateStore {
    pub fn new(store: Arc<IndexStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, id: &str) -> Result<Option<CollectionIndexState>, IndexingError> {
        Ok(self.store.get_state(id)?)
    }

    /// Fetch the states of a batch in one round trip, aligned with `ids`.
    pub fn get_many(
        &self,
        ids: &[String],
    ) -> Result<Vec<Option<CollectionIndexState>>, IndexingError> {
        Ok(self.store.get_states(ids)?)
    }

    pub fn save_run(&self, record: &RunRecord) -> Result<(), IndexingError> {
        self.store.put_last_run(&record.to_bytes()?)?;
        Ok(())
    }

    pub fn last_run(&self) -> Result<Option<RunRecord>, IndexingError> {
        match self.store.get_last_run()? {
            Some(bytes) => Ok(Some(RunRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }
}
