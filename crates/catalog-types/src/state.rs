//! Per-record index bookkeeping.
//!
//! A [`CollectionIndexState`] is the only artifact consulted when deciding
//! whether a record must be re-indexed. It is never mutated in place: every
//! transition goes through [`CollectionIndexState::apply`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::PrimaryRecord;

/// Layout version written into every state record.
///
/// Bump when the derived index entries change shape; older states are then
/// re-indexed by the next incremental pass.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Why a record was selected for (re)indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildReason {
    /// No state exists for the record
    NeverIndexed,
    /// The primary record changed after the last index write
    SourceUpdated,
    /// The state was written by an older index layout
    SchemaUpgrade,
    /// The representative preview no longer matches the cached thumbnail
    ThumbnailChanged,
    /// The rebuild mode re-indexes everything
    Forced,
}

impl std::fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RebuildReason::NeverIndexed => write!(f, "never_indexed"),
            RebuildReason::SourceUpdated => write!(f, "source_updated"),
            RebuildReason::SchemaUpgrade => write!(f, "schema_upgrade"),
            RebuildReason::ThumbnailChanged => write!(f, "thumbnail_changed"),
            RebuildReason::Forced => write!(f, "forced"),
        }
    }
}

/// What happened to the thumbnail during an index write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailChange<'a> {
    /// A thumbnail derived from this source path was cached
    Cached(&'a str),
    /// No representative preview; any cached thumbnail was removed
    Cleared,
    /// Thumbnail caching was skipped; the previous thumbnail stays
    Unchanged,
}

/// Transitions applied to a record's state.
#[derive(Debug, Clone, Copy)]
pub enum IndexStateEvent<'a> {
    /// The record's index entries were written
    Indexed {
        record: &'a PrimaryRecord,
        thumbnail: ThumbnailChange<'a>,
        at: DateTime<Utc>,
    },
    /// The record's index entries were deleted
    Removed,
}

/// Bookkeeping for one indexed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionIndexState {
    /// When the index entries were last written
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub indexed_at: DateTime<Utc>,

    /// Copy of `PrimaryRecord::updated_at` at write time
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub source_updated_at: DateTime<Utc>,

    /// Child item count at write time
    pub child_count: u64,

    /// Cached derivative count at write time
    pub cached_derivative_count: u64,

    /// Whether a thumbnail is present in the hash map
    pub has_first_thumbnail: bool,

    /// Source path of the cached thumbnail, used to detect staleness
    #[serde(default)]
    pub first_thumbnail_source_path: Option<String>,

    /// Index layout version
    pub schema_version: u32,
}

impl CollectionIndexState {
    /// Pure transition function: `(state, event) -> state`.
    ///
    /// Returns `None` when the record no longer has a state.
    pub fn apply(prior: Option<&Self>, event: IndexStateEvent<'_>) -> Option<Self> {
        match event {
            IndexStateEvent::Removed => None,
            IndexStateEvent::Indexed {
                record,
                thumbnail,
                at,
            } => {
                let (has_first_thumbnail, first_thumbnail_source_path) = match thumbnail {
                    ThumbnailChange::Cached(path) => (true, Some(path.to_string())),
                    ThumbnailChange::Cleared => (false, None),
                    ThumbnailChange::Unchanged => prior
                        .map(|p| (p.has_first_thumbnail, p.first_thumbnail_source_path.clone()))
                        .unwrap_or((false, None)),
                };

                Some(Self {
                    indexed_at: at,
                    source_updated_at: record.updated_at,
                    child_count: record.child_count,
                    cached_derivative_count: record.cached_derivative_count,
                    has_first_thumbnail,
                    first_thumbnail_source_path,
                    schema_version: CURRENT_SCHEMA_VERSION,
                })
            }
        }
    }

    /// Decide whether the record changed since this state was written.
    ///
    /// Timestamps are compared at millisecond precision, which is what the
    /// state keyspace persists.
    pub fn change_reason(&self, record: &PrimaryRecord) -> Option<RebuildReason> {
        if self.schema_version < CURRENT_SCHEMA_VERSION {
            return Some(RebuildReason::SchemaUpgrade);
        }
        if record.updated_at.timestamp_millis() > self.source_updated_at.timestamp_millis() {
            return Some(RebuildReason::SourceUpdated);
        }
        None
    }

    /// True when a thumbnail is cached but the record's representative
    /// preview now points somewhere else (or is gone).
    pub fn thumbnail_drifted(&self, record: &PrimaryRecord) -> bool {
        if !self.has_first_thumbnail {
            return false;
        }
        self.first_thumbnail_source_path.as_deref() != record.representative_path()
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PreviewAsset;
    use chrono::{Duration, TimeZone};

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn record(updated_ms: i64) -> PrimaryRecord {
        PrimaryRecord::new("c-1", "Name", "name", at(updated_ms))
            .with_preview(PreviewAsset::new("cover.jpg", 100, 100, 2048))
            .with_counts(12, 3)
    }

    fn indexed(record: &PrimaryRecord) -> CollectionIndexState {
        CollectionIndexState::apply(
            None,
            IndexStateEvent::Indexed {
                record,
                thumbnail: ThumbnailChange::Cached("cover.jpg"),
                at: at(2_000),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_apply_indexed_copies_record() {
        let rec = record(1_000);
        let state = indexed(&rec);

        assert_eq!(state.source_updated_at, rec.updated_at);
        assert_eq!(state.child_count, 12);
        assert_eq!(state.cached_derivative_count, 3);
        assert!(state.has_first_thumbnail);
        assert_eq!(state.first_thumbnail_source_path.as_deref(), Some("cover.jpg"));
        assert_eq!(state.schema_version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_apply_unchanged_keeps_prior_thumbnail() {
        let rec = record(1_000);
        let prior = indexed(&rec);
        let newer = record(5_000);

        let next = CollectionIndexState::apply(
            Some(&prior),
            IndexStateEvent::Indexed {
                record: &newer,
                thumbnail: ThumbnailChange::Unchanged,
                at: at(6_000),
            },
        )
        .unwrap();

        assert!(next.has_first_thumbnail);
        assert_eq!(next.first_thumbnail_source_path.as_deref(), Some("cover.jpg"));
        assert_eq!(next.source_updated_at, at(5_000));
    }

    #[test]
    fn test_apply_removed() {
        let rec = record(1_000);
        let prior = indexed(&rec);
        assert!(CollectionIndexState::apply(Some(&prior), IndexStateEvent::Removed).is_none());
    }

    #[test]
    fn test_change_reason() {
        let rec = record(1_000);
        let state = indexed(&rec);

        assert_eq!(state.change_reason(&rec), None);
        assert_eq!(
            state.change_reason(&record(1_001)),
            Some(RebuildReason::SourceUpdated)
        );
        // Older primary timestamps never trigger a rebuild
        assert_eq!(state.change_reason(&record(999)), None);
    }

    #[test]
    fn test_change_reason_ignores_sub_millisecond_precision() {
        let mut rec = record(1_000);
        let state = indexed(&rec);
        rec.updated_at += Duration::microseconds(400);
        assert_eq!(state.change_reason(&rec), None);
    }

    #[test]
    fn test_change_reason_schema_upgrade() {
        let rec = record(1_000);
        let mut state = indexed(&rec);
        state.schema_version = 0;
        assert_eq!(state.change_reason(&rec), Some(RebuildReason::SchemaUpgrade));
    }

    #[test]
    fn test_thumbnail_drift() {
        let rec = record(1_000);
        let state = indexed(&rec);
        assert!(!state.thumbnail_drifted(&rec));

        let mut moved = rec.clone();
        moved.previews[0].path = "other.jpg".to_string();
        assert!(state.thumbnail_drifted(&moved));

        let mut gone = rec.clone();
        gone.previews.clear();
        assert!(state.thumbnail_drifted(&gone));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let rec = record(1_000);
        let state = indexed(&rec);
        let decoded = CollectionIndexState::from_bytes(&state.to_bytes().unwrap()).unwrap();
        assert_eq!(state, decoded);
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(RebuildReason::NeverIndexed.to_string(), "never_indexed");
        assert_eq!(RebuildReason::ThumbnailChanged.to_string(), "thumbnail_changed");
    }
}
