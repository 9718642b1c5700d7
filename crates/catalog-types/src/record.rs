//! Read-only views of primary-store collections.
//!
//! The primary store owns these records. The index engine only reads them,
//! compares them against [`crate::CollectionIndexState`] and derives index
//! entries from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A preview asset embedded in a primary record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewAsset {
    /// Byte-source reference (archive-relative path or similar)
    pub path: String,

    /// Pixel width
    pub width: u32,

    /// Pixel height
    pub height: u32,

    /// Size of the stored asset in bytes
    pub byte_size: u64,

    /// True when the asset is an unmodified original rather than a
    /// pre-generated derivative
    #[serde(default)]
    pub direct: bool,

    /// Position of the asset within its collection
    #[serde(default)]
    pub sort_index: u32,
}

impl PreviewAsset {
    /// Create a derivative (non-direct) asset.
    pub fn new(path: impl Into<String>, width: u32, height: u32, byte_size: u64) -> Self {
        Self {
            path: path.into(),
            width,
            height,
            byte_size,
            direct: false,
            sort_index: 0,
        }
    }

    /// Mark the asset as an unmodified original.
    pub fn direct(mut self) -> Self {
        self.direct = true;
        self
    }

    /// Set the position within the collection.
    pub fn with_sort_index(mut self, sort_index: u32) -> Self {
        self.sort_index = sort_index;
        self
    }

    /// Whether the asset points at anything at all.
    pub fn has_source(&self) -> bool {
        !self.path.trim().is_empty()
    }
}

/// A collection record as stored by the primary store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryRecord {
    /// Unique identifier
    pub id: String,

    /// Monotonically increasing modification time
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,

    /// Human-readable name
    pub display_name: String,

    /// Key used to position the record in the ordered set
    pub sort_key: String,

    /// Embedded preview assets
    #[serde(default)]
    pub previews: Vec<PreviewAsset>,

    /// Number of child items in the collection
    #[serde(default)]
    pub child_count: u64,

    /// Number of cached derivatives for the collection
    #[serde(default)]
    pub cached_derivative_count: u64,

    /// Soft-delete marker set by the primary store
    #[serde(default)]
    pub deleted: bool,
}

impl PrimaryRecord {
    /// Create a record with no previews.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        sort_key: impl Into<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            updated_at,
            display_name: display_name.into(),
            sort_key: sort_key.into(),
            previews: Vec::new(),
            child_count: 0,
            cached_derivative_count: 0,
            deleted: false,
        }
    }

    /// Add a preview asset.
    pub fn with_preview(mut self, preview: PreviewAsset) -> Self {
        self.previews.push(preview);
        self
    }

    /// Set the aggregate counts.
    pub fn with_counts(mut self, child_count: u64, cached_derivative_count: u64) -> Self {
        self.child_count = child_count;
        self.cached_derivative_count = cached_derivative_count;
        self
    }

    /// Mark the record as deleted.
    pub fn mark_deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    /// The preview used for list and grid display.
    ///
    /// Lowest `sort_index` with a non-empty source wins; on ties the first
    /// declared asset is kept.
    pub fn representative_preview(&self) -> Option<&PreviewAsset> {
        self.previews
            .iter()
            .filter(|p| p.has_source())
            .min_by_key(|p| p.sort_index)
    }

    /// Source path of the representative preview, if any.
    pub fn representative_path(&self) -> Option<&str> {
        self.representative_preview().map(|p| p.path.as_str())
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
    use chrono::TimeZone;

    fn record() -> PrimaryRecord {
        PrimaryRecord::new(
            "c-1",
            "Summer",
            "summer",
            Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        )
    }

    #[test]
    fn test_representative_prefers_lowest_sort_index() {
        let rec = record()
            .with_preview(PreviewAsset::new("b.jpg", 10, 10, 100).with_sort_index(2))
            .with_preview(PreviewAsset::new("a.jpg", 10, 10, 100).with_sort_index(1));

        assert_eq!(rec.representative_path(), Some("a.jpg"));
    }

    #[test]
    fn test_representative_skips_empty_paths() {
        let rec = record()
            .with_preview(PreviewAsset::new("", 10, 10, 100).with_sort_index(0))
            .with_preview(PreviewAsset::new("x.png", 10, 10, 100).with_sort_index(5));

        assert_eq!(rec.representative_path(), Some("x.png"));
    }

    #[test]
    fn test_representative_tie_keeps_first() {
        let rec = record()
            .with_preview(PreviewAsset::new("first.jpg", 10, 10, 100))
            .with_preview(PreviewAsset::new("second.jpg", 10, 10, 100));

        assert_eq!(rec.representative_path(), Some("first.jpg"));
    }

    #[test]
    fn test_no_previews() {
        assert!(record().representative_preview().is_none());
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{"id":"c-9","updated_at":1700000000000,"display_name":"N","sort_key":"n"}"#;
        let rec = PrimaryRecord::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(rec.id, "c-9");
        assert!(rec.previews.is_empty());
        assert!(!rec.deleted);
        assert_eq!(rec.updated_at.timestamp_millis(), 1_700_000_000_000);
    }
}
