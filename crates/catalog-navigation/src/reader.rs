//! Pagination, sibling lookup and aggregation over the index.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use catalog_storage::{IndexStore, OrderKey, ScanDirection};
use catalog_types::CURRENT_SCHEMA_VERSION;

use crate::cursor::Cursor;
use crate::error::NavigationError;

/// Largest page a caller may request
pub const MAX_PAGE_SIZE: usize = 1_000;

/// One page of record ids in navigation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Page {
    pub ids: Vec<String>,
    /// Continue forward from the last id of this page
    pub next_cursor: Option<String>,
    /// Continue backward from the first id of this page
    pub prev_cursor: Option<String>,
    /// More records exist in the requested direction
    pub has_more: bool,
}

/// Neighbours of a record in navigation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Siblings {
    pub previous: Option<String>,
    pub next: Option<String>,
}

/// Dashboard aggregates, computed in one streaming pass per keyspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStatistics {
    /// Entries in the ordered set
    pub ordered_records: u64,
    /// Records with an index state
    pub indexed_records: u64,
    pub records_with_thumbnail: u64,
    pub total_child_count: u64,
    pub total_cached_derivatives: u64,
    /// States written by an older schema
    pub outdated_states: u64,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub cached_thumbnails: u64,
    pub resized_thumbnails: u64,
    pub thumbnail_bytes: u64,
    pub largest_thumbnail_bytes: u64,
    /// Cached thumbnails per encoded format
    pub thumbnails_by_format: BTreeMap<String, u64>,
}

/// Read-only view over the navigation keyspaces.
pub struct NavigationReader {
    store: Arc<IndexStore>,
}

impl NavigationReader {
    pub fn new(store: Arc<IndexStore>) -> Self {
        Self { store }
    }

    /// Read one page starting after (or, backward, before) `cursor`.
    ///
    /// Without a cursor a forward page starts at the first record and a
    /// backward page ends at the last one. Ids are always returned in
    /// ascending navigation order.
    pub fn page(
        &self,
        cursor: Option<&str>,
        page_size: usize,
        direction: ScanDirection,
    ) -> Result<Page, NavigationError> {
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(NavigationError::InvalidPageSize(page_size));
        }
        let bound = cursor.map(Cursor::decode).transpose()?;

        // One extra key tells whether the scan direction has more
        let mut keys = self
            .store
            .order_range(bound.as_ref().map(Cursor::key), direction, page_size + 1)?;
        let has_more = keys.len() > page_size;
        keys.truncate(page_size);
        if direction == ScanDirection::Backward {
            keys.reverse();
        }

        let (Some(first), Some(last)) = (keys.first(), keys.last()) else {
            return Ok(Page::default());
        };

        let (more_before, more_after) = match direction {
            ScanDirection::Forward => (self.has_neighbour(first, ScanDirection::Backward)?, has_more),
            ScanDirection::Backward => (has_more, self.has_neighbour(last, ScanDirection::Forward)?),
        };

        let page = Page {
            next_cursor: more_after.then(|| Cursor::new(last.clone()).encode()),
            prev_cursor: more_before.then(|| Cursor::new(first.clone()).encode()),
            has_more,
            ids: keys.into_iter().map(|k| k.id).collect(),
        };
        debug!(
            count = page.ids.len(),
            has_more = page.has_more,
            "Read navigation page"
        );
        Ok(page)
    }

    /// Previous and next record around `id`, or `None` if it is not indexed.
    pub fn siblings(&self, id: &str) -> Result<Option<Siblings>, NavigationError> {
        let Some(key) = self.store.member_key(id)? else {
            return Ok(None);
        };
        let previous = self.neighbour(&key, ScanDirection::Backward)?;
        let next = self.neighbour(&key, ScanDirection::Forward)?;
        Ok(Some(Siblings { previous, next }))
    }

    /// Aggregate the thumbnail hash map and the state keyspace.
    pub fn statistics(&self) -> Result<IndexStatistics, NavigationError> {
        let stats = self.store.fold_states(IndexStatistics::default(), |mut acc, _, state| {
            acc.indexed_records += 1;
            if state.has_first_thumbnail {
                acc.records_with_thumbnail += 1;
            }
            acc.total_child_count += state.child_count;
            acc.total_cached_derivatives += state.cached_derivative_count;
            if state.schema_version < CURRENT_SCHEMA_VERSION {
                acc.outdated_states += 1;
            }
            if acc.last_indexed_at.map_or(true, |t| state.indexed_at > t) {
                acc.last_indexed_at = Some(state.indexed_at);
            }
            acc
        })?;

        let mut stats = self.store.fold_thumbnails(stats, |mut acc, _, meta| {
            acc.cached_thumbnails += 1;
            if meta.resized {
                acc.resized_thumbnails += 1;
            }
            acc.thumbnail_bytes += meta.byte_size;
            acc.largest_thumbnail_bytes = acc.largest_thumbnail_bytes.max(meta.byte_size);
            *acc
                .thumbnails_by_format
                .entry(meta.format.to_string())
                .or_insert(0) += 1;
            acc
        })?;

        stats.ordered_records = self.store.get_stats()?.ordered_count;
        Ok(stats)
    }

    fn neighbour(
        &self,
        key: &OrderKey,
        direction: ScanDirection,
    ) -> Result<Option<String>, NavigationError> {
        Ok(self
            .store
            .order_range(Some(key), direction, 1)?
            .into_iter()
            .next()
            .map(|k| k.id))
    }

    fn has_neighbour(&self, key: &OrderKey, direction: ScanDirection) -> Result<bool, NavigationError> {
        Ok(self.neighbour(key, direction)?.is_some())
    }
}
