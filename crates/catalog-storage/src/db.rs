//! RocksDB wrapper for the collection index.
//!
//! Provides:
//! - Database open with column family setup
//! - Pipelined per-batch writes of ordered-set, thumbnail and state entries
//! - Multi-get state lookups for incremental planning
//! - Bounded scans for verification, pagination and aggregation

use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use tracing::{debug, info, warn};

use catalog_types::{CollectionIndexState, ThumbnailCacheEntry, ThumbnailMeta};

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_INDEX_META, CF_INDEX_STATE, CF_NAV_MEMBERS,
    CF_NAV_ORDER, CF_THUMBNAILS, RECORD_CF_NAMES,
};
use crate::error::StorageError;
use crate::keys::{OrderKey, LAST_RUN_KEY};

/// Deletes per write batch when clearing a keyspace
const CLEAR_CHUNK: usize = 1_000;

/// Per-record keyspaces that can be scanned by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyspace {
    /// Ordered-set membership (`nav_members`)
    Members,
    /// Thumbnail hash map
    Thumbnails,
    /// Index state
    State,
}

impl Keyspace {
    fn cf_name(&self) -> &'static str {
        match self {
            Keyspace::Members => CF_NAV_MEMBERS,
            Keyspace::Thumbnails => CF_THUMBNAILS,
            Keyspace::State => CF_INDEX_STATE,
        }
    }
}

/// Scan direction over the ordered set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanDirection {
    #[default]
    Forward,
    Backward,
}

/// What to do with a record's thumbnail field.
#[derive(Debug, Clone)]
pub enum ThumbnailWrite {
    /// Store a new blob
    Put(ThumbnailCacheEntry),
    /// Delete any existing blob
    Remove,
    /// Leave the field untouched
    Keep,
}

/// All index writes for one record.
#[derive(Debug, Clone)]
pub struct EntryWrite {
    pub order_key: OrderKey,
    pub thumbnail: ThumbnailWrite,
    pub state: CollectionIndexState,
}

impl EntryWrite {
    pub fn id(&self) -> &str {
        &self.order_key.id
    }
}

/// Entry counts per keyspace
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StorageStats {
    pub ordered_count: u64,
    pub member_count: u64,
    pub thumbnail_count: u64,
    pub state_count: u64,
}

/// Main storage interface for the index
pub struct IndexStore {
    db: DB,
}

impl IndexStore {
    /// Open the index at the given path, creating if necessary.
    ///
    /// RocksDB holds an exclusive lock on the directory, so a second process
    /// opening the same index fails here.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening index store at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        let db = DB::open_cf_descriptors(&db_opts, path, build_cf_descriptors())?;
        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    // ==================== State Methods ====================

    /// Get the state of one record.
    pub fn get_state(&self, id: &str) -> Result<Option<CollectionIndexState>, StorageError> {
        let cf = self.cf(CF_INDEX_STATE)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(CollectionIndexState::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get the states of many records in one multi-get.
    ///
    /// The result is positionally aligned with `ids`. A state that no longer
    /// decodes is returned as absent so the record gets rewritten.
    pub fn get_states(
        &self,
        ids: &[String],
    ) -> Result<Vec<Option<CollectionIndexState>>, StorageError> {
        let cf = self.cf(CF_INDEX_STATE)?;
        self.db
            .multi_get_cf(ids.iter().map(|id| (cf, id.as_bytes())))
            .into_iter()
            .zip(ids)
            .map(|(res, id)| Ok(res?.and_then(|bytes| decode_state(id, &bytes))))
            .collect()
    }

    // ==================== Entry Write Methods ====================

    /// Commit the index entries of many records in a single write batch.
    ///
    /// Ordered-set keys that moved (sort key or name changed) are deleted
    /// before the new key is written, so each id has exactly one member.
    pub fn commit_entries(&self, writes: &[EntryWrite]) -> Result<(), StorageError> {
        if writes.is_empty() {
            return Ok(());
        }

        let order_cf = self.cf(CF_NAV_ORDER)?;
        let members_cf = self.cf(CF_NAV_MEMBERS)?;
        let thumbs_cf = self.cf(CF_THUMBNAILS)?;
        let state_cf = self.cf(CF_INDEX_STATE)?;

        let prior_keys = self
            .db
            .multi_get_cf(writes.iter().map(|w| (members_cf, w.id().as_bytes())));

        let mut batch = WriteBatch::default();
        for (write, prior) in writes.iter().zip(prior_keys) {
            let new_key = write.order_key.to_bytes();
            if let Some(prior) = prior? {
                if prior != new_key {
                    batch.delete_cf(order_cf, &prior);
                }
            }
            batch.put_cf(order_cf, &new_key, b"");
            batch.put_cf(members_cf, write.id().as_bytes(), &new_key);

            match &write.thumbnail {
                ThumbnailWrite::Put(entry) => {
                    batch.put_cf(thumbs_cf, write.id().as_bytes(), entry.to_bytes()?)
                }
                ThumbnailWrite::Remove => batch.delete_cf(thumbs_cf, write.id().as_bytes()),
                ThumbnailWrite::Keep => {}
            }

            batch.put_cf(state_cf, write.id().as_bytes(), write.state.to_bytes()?);
        }

        self.db.write(batch)?;
        debug!(count = writes.len(), "Committed index entries");
        Ok(())
    }

    /// Remove every index entry of one record in a single write.
    ///
    /// Returns true if the record had any entry.
    pub fn remove_entry(&self, id: &str) -> Result<bool, StorageError> {
        let order_cf = self.cf(CF_NAV_ORDER)?;
        let members_cf = self.cf(CF_NAV_MEMBERS)?;
        let thumbs_cf = self.cf(CF_THUMBNAILS)?;
        let state_cf = self.cf(CF_INDEX_STATE)?;

        let key = id.as_bytes();
        let member = self.db.get_cf(members_cf, key)?;
        let existed = member.is_some()
            || self.db.get_cf(state_cf, key)?.is_some()
            || self.db.get_cf(thumbs_cf, key)?.is_some();

        let mut batch = WriteBatch::default();
        if let Some(order_key) = member {
            batch.delete_cf(order_cf, order_key);
        }
        batch.delete_cf(members_cf, key);
        batch.delete_cf(thumbs_cf, key);
        batch.delete_cf(state_cf, key);
        self.db.write(batch)?;

        debug!(record_id = %id, existed, "Removed index entries");
        Ok(existed)
    }

    /// Delete every per-record entry. Run metadata is kept.
    ///
    /// Returns the number of deleted keys.
    pub fn clear_index(&self) -> Result<u64, StorageError> {
        let mut removed = 0u64;
        for cf_name in RECORD_CF_NAMES {
            let cf = self.cf(cf_name)?;
            loop {
                let mut batch = WriteBatch::default();
                let mut chunk = 0;
                for item in self.db.iterator_cf(cf, IteratorMode::Start).take(CLEAR_CHUNK) {
                    let (key, _) = item?;
                    batch.delete_cf(cf, &key);
                    chunk += 1;
                }
                if chunk == 0 {
                    break;
                }
                self.db.write(batch)?;
                removed += chunk as u64;
            }
        }
        info!(removed, "Cleared index keyspaces");
        Ok(removed)
    }

    // ==================== Scan Methods ====================

    /// Page through the ids of a keyspace in key order.
    ///
    /// `after` is exclusive, so feeding back the last returned id continues
    /// the scan even if entries are deleted in between.
    pub fn scan_ids(
        &self,
        keyspace: Keyspace,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, StorageError> {
        let cf = self.cf(keyspace.cf_name())?;
        let mode = match after {
            Some(after) => IteratorMode::From(after.as_bytes(), Direction::Forward),
            None => IteratorMode::Start,
        };

        let mut ids = Vec::with_capacity(limit);
        for item in self.db.iterator_cf(cf, mode) {
            if ids.len() >= limit {
                break;
            }
            let (key, _) = item?;
            if after.is_some_and(|a| a.as_bytes() == key.as_ref()) {
                continue;
            }
            let id = std::str::from_utf8(&key)
                .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
            ids.push(id.to_string());
        }
        Ok(ids)
    }

    /// Whether a record id appears in a keyspace.
    pub fn contains(&self, keyspace: Keyspace, id: &str) -> Result<bool, StorageError> {
        let cf = self.cf(keyspace.cf_name())?;
        Ok(self.db.get_pinned_cf(cf, id.as_bytes())?.is_some())
    }

    /// Current ordered-set key of a record.
    pub fn member_key(&self, id: &str) -> Result<Option<OrderKey>, StorageError> {
        let cf = self.cf(CF_NAV_MEMBERS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(OrderKey::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Range scan over the ordered set.
    ///
    /// `bound` is exclusive. Forward scans return keys greater than the bound
    /// in ascending order; backward scans return keys smaller than the bound
    /// in descending order.
    pub fn order_range(
        &self,
        bound: Option<&OrderKey>,
        direction: ScanDirection,
        limit: usize,
    ) -> Result<Vec<OrderKey>, StorageError> {
        let cf = self.cf(CF_NAV_ORDER)?;
        let bound_bytes = bound.map(OrderKey::to_bytes);

        let mode = match (&bound_bytes, direction) {
            (Some(b), ScanDirection::Forward) => IteratorMode::From(b, Direction::Forward),
            (Some(b), ScanDirection::Backward) => IteratorMode::From(b, Direction::Reverse),
            (None, ScanDirection::Forward) => IteratorMode::Start,
            (None, ScanDirection::Backward) => IteratorMode::End,
        };

        let mut keys = Vec::with_capacity(limit);
        for item in self.db.iterator_cf(cf, mode) {
            if keys.len() >= limit {
                break;
            }
            let (key, _) = item?;
            if bound_bytes.as_deref() == Some(key.as_ref()) {
                continue;
            }
            keys.push(OrderKey::from_bytes(&key)?);
        }
        Ok(keys)
    }

    // ==================== Thumbnail Methods ====================

    /// Get the cached thumbnail of one record.
    pub fn get_thumbnail(&self, id: &str) -> Result<Option<ThumbnailCacheEntry>, StorageError> {
        let cf = self.cf(CF_THUMBNAILS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(ThumbnailCacheEntry::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Fold over thumbnail metadata without collecting the hash map.
    pub fn fold_thumbnails<T, F>(&self, init: T, mut f: F) -> Result<T, StorageError>
    where
        F: FnMut(T, &str, ThumbnailMeta) -> T,
    {
        let cf = self.cf(CF_THUMBNAILS)?;
        let mut acc = init;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let id = String::from_utf8_lossy(&key);
            let meta = ThumbnailCacheEntry::meta_from_bytes(&value)?;
            acc = f(acc, &id, meta);
        }
        Ok(acc)
    }

    /// Fold over index states without collecting the keyspace.
    ///
    /// Undecodable states are skipped.
    pub fn fold_states<T, F>(&self, init: T, mut f: F) -> Result<T, StorageError>
    where
        F: FnMut(T, &str, CollectionIndexState) -> T,
    {
        let cf = self.cf(CF_INDEX_STATE)?;
        let mut acc = init;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let id = String::from_utf8_lossy(&key);
            if let Some(state) = decode_state(&id, &value) {
                acc = f(acc, &id, state);
            }
        }
        Ok(acc)
    }

    // ==================== Metadata Methods ====================

    /// Store the record of the last completed run.
    pub fn put_last_run(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(CF_INDEX_META)?;
        self.db.put_cf(cf, LAST_RUN_KEY, bytes)?;
        Ok(())
    }

    /// Get the record of the last completed run.
    pub fn get_last_run(&self) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(CF_INDEX_META)?;
        Ok(self.db.get_cf(cf, LAST_RUN_KEY)?)
    }

    // ==================== Maintenance Methods ====================

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(cf)?;
            }
        }
        Ok(())
    }

    /// Compact all column families, reclaiming space left by deletes.
    pub fn compact(&self) -> Result<(), StorageError> {
        info!("Starting full compaction");
        for cf_name in ALL_CF_NAMES {
            let cf = self.cf(cf_name)?;
            self.db.compact_range_cf(cf, None::<&[u8]>, None::<&[u8]>);
            debug!(cf = cf_name, "Compacted column family");
        }
        info!("Full compaction complete");
        Ok(())
    }

    /// Count entries per keyspace.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        Ok(StorageStats {
            ordered_count: self.count_cf_entries(self.cf(CF_NAV_ORDER)?)?,
            member_count: self.count_cf_entries(self.cf(CF_NAV_MEMBERS)?)?,
            thumbnail_count: self.count_cf_entries(self.cf(CF_THUMBNAILS)?)?,
            state_count: self.count_cf_entries(self.cf(CF_INDEX_STATE)?)?,
        })
    }

    fn count_cf_entries(&self, cf: &ColumnFamily) -> Result<u64, StorageError> {
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

/// Decode a stored state, logging and dropping values that do not parse.
fn decode_state(id: &str, bytes: &[u8]) -> Option<CollectionIndexState> {
    match CollectionIndexState::from_bytes(bytes) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(record_id = %id, error = %e, "Ignoring undecodable index state");
            None
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
impl IndexStore {
    /// Overwrite one keyspace value as is, bypassing the codecs.
    pub fn put_raw(&self, keyspace: Keyspace, id: &str, value: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(keyspace.cf_name())?;
        self.db.put_cf(cf, id.as_bytes(), value)?;
        Ok(())
    }

    /// Delete one keyspace value, leaving the record's other entries.
    pub fn delete_raw(&self, keyspace: Keyspace, id: &str) -> Result<(), StorageError> {
        let cf = self.cf(keyspace.cf_name())?;
        self.db.delete_cf(cf, id.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_types::{
        IndexStateEvent, PrimaryRecord, ThumbnailChange, ThumbnailFormat,
    };
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn create_test_store() -> (IndexStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = IndexStore::open(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    fn record(id: &str, sort_key: &str) -> PrimaryRecord {
        PrimaryRecord::new(
            id,
            format!("Name {}", id),
            sort_key,
            Utc.timestamp_millis_opt(1_000).unwrap(),
        )
    }

    fn thumbnail(source: &str) -> ThumbnailCacheEntry {
        ThumbnailCacheEntry::new(
            ThumbnailMeta {
                format: ThumbnailFormat::Jpeg,
                quality: 80,
                width: 10,
                height: 10,
                byte_size: 0,
                source_path: source.to_string(),
                resized: false,
            },
            vec![7; 32],
        )
    }

    fn write_for(record: &PrimaryRecord, thumbnail_write: ThumbnailWrite) -> EntryWrite {
        let change = match &thumbnail_write {
            ThumbnailWrite::Put(entry) => ThumbnailChange::Cached(&entry.meta.source_path),
            ThumbnailWrite::Remove => ThumbnailChange::Cleared,
            ThumbnailWrite::Keep => ThumbnailChange::Unchanged,
        };
        let state = CollectionIndexState::apply(
            None,
            IndexStateEvent::Indexed {
                record,
                thumbnail: change,
                at: Utc::now(),
            },
        )
        .unwrap();
        EntryWrite {
            order_key: OrderKey::for_record(record),
            thumbnail: thumbnail_write,
            state,
        }
    }

    #[test]
    fn test_open_creates_column_families() {
        let (store, _temp) = create_test_store();
        for cf_name in ALL_CF_NAMES {
            assert!(
                store.db.cf_handle(cf_name).is_some(),
                "CF {} should exist",
                cf_name
            );
        }
    }

    #[test]
    fn test_commit_and_read_back() {
        let (store, _temp) = create_test_store();
        let rec = record("c-1", "alpha");

        store
            .commit_entries(&[write_for(&rec, ThumbnailWrite::Put(thumbnail("a.jpg")))])
            .unwrap();

        let state = store.get_state("c-1").unwrap().unwrap();
        assert!(state.has_first_thumbnail);
        assert_eq!(store.member_key("c-1").unwrap().unwrap().sort_key, "alpha");
        assert_eq!(
            store.get_thumbnail("c-1").unwrap().unwrap().meta.source_path,
            "a.jpg"
        );
    }

    #[test]
    fn test_get_states_is_aligned() {
        let (store, _temp) = create_test_store();
        let rec = record("c-2", "beta");
        store
            .commit_entries(&[write_for(&rec, ThumbnailWrite::Remove)])
            .unwrap();

        let states = store
            .get_states(&["c-1".to_string(), "c-2".to_string()])
            .unwrap();
        assert_eq!(states.len(), 2);
        assert!(states[0].is_none());
        assert!(states[1].is_some());
    }

    #[test]
    fn test_moved_sort_key_leaves_single_member() {
        let (store, _temp) = create_test_store();
        let rec = record("c-1", "alpha");
        store
            .commit_entries(&[write_for(&rec, ThumbnailWrite::Remove)])
            .unwrap();

        let moved = record("c-1", "zulu");
        store
            .commit_entries(&[write_for(&moved, ThumbnailWrite::Remove)])
            .unwrap();

        let keys = store.order_range(None, ScanDirection::Forward, 10).unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].sort_key, "zulu");
    }

    #[test]
    fn test_keep_leaves_thumbnail() {
        let (store, _temp) = create_test_store();
        let rec = record("c-1", "alpha");
        store
            .commit_entries(&[write_for(&rec, ThumbnailWrite::Put(thumbnail("a.jpg")))])
            .unwrap();
        store
            .commit_entries(&[write_for(&rec, ThumbnailWrite::Keep)])
            .unwrap();
        assert!(store.get_thumbnail("c-1").unwrap().is_some());

        store
            .commit_entries(&[write_for(&rec, ThumbnailWrite::Remove)])
            .unwrap();
        assert!(store.get_thumbnail("c-1").unwrap().is_none());
    }

    #[test]
    fn test_remove_entry() {
        let (store, _temp) = create_test_store();
        let rec = record("c-1", "alpha");
        store
            .commit_entries(&[write_for(&rec, ThumbnailWrite::Put(thumbnail("a.jpg")))])
            .unwrap();

        assert!(store.remove_entry("c-1").unwrap());
        assert!(store.get_state("c-1").unwrap().is_none());
        assert!(store.get_thumbnail("c-1").unwrap().is_none());
        assert!(store.member_key("c-1").unwrap().is_none());
        assert_eq!(store.get_stats().unwrap(), StorageStats::default());

        assert!(!store.remove_entry("c-1").unwrap());
    }

    #[test]
    fn test_order_range_directions() {
        let (store, _temp) = create_test_store();
        let writes: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|k| write_for(&record(&format!("id-{}", k), k), ThumbnailWrite::Remove))
            .collect();
        store.commit_entries(&writes).unwrap();

        let first_two = store.order_range(None, ScanDirection::Forward, 2).unwrap();
        assert_eq!(
            first_two.iter().map(|k| k.sort_key.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        let after_b = store
            .order_range(Some(&first_two[1]), ScanDirection::Forward, 10)
            .unwrap();
        assert_eq!(
            after_b.iter().map(|k| k.sort_key.as_str()).collect::<Vec<_>>(),
            vec!["c", "d"]
        );

        let before_c = store
            .order_range(Some(&after_b[0]), ScanDirection::Backward, 10)
            .unwrap();
        assert_eq!(
            before_c.iter().map(|k| k.sort_key.as_str()).collect::<Vec<_>>(),
            vec!["b", "a"]
        );

        let last = store.order_range(None, ScanDirection::Backward, 1).unwrap();
        assert_eq!(last[0].sort_key, "d");
    }

    #[test]
    fn test_scan_ids_pages() {
        let (store, _temp) = create_test_store();
        let writes: Vec<_> = (0..5)
            .map(|i| write_for(&record(&format!("id-{}", i), "k"), ThumbnailWrite::Remove))
            .collect();
        store.commit_entries(&writes).unwrap();

        let first = store.scan_ids(Keyspace::State, None, 3).unwrap();
        assert_eq!(first, vec!["id-0", "id-1", "id-2"]);
        let rest = store
            .scan_ids(Keyspace::State, first.last().map(String::as_str), 3)
            .unwrap();
        assert_eq!(rest, vec!["id-3", "id-4"]);
    }

    #[test]
    fn test_clear_index_keeps_metadata() {
        let (store, _temp) = create_test_store();
        let rec = record("c-1", "alpha");
        store
            .commit_entries(&[write_for(&rec, ThumbnailWrite::Put(thumbnail("a.jpg")))])
            .unwrap();
        store.put_last_run(b"{}").unwrap();

        let removed = store.clear_index().unwrap();
        assert_eq!(removed, 4);
        assert_eq!(store.get_stats().unwrap(), StorageStats::default());
        assert_eq!(store.get_last_run().unwrap(), Some(b"{}".to_vec()));
    }

    #[test]
    fn test_folds_stream_values() {
        let (store, _temp) = create_test_store();
        let writes = vec![
            write_for(&record("c-1", "a"), ThumbnailWrite::Put(thumbnail("1.jpg"))),
            write_for(&record("c-2", "b"), ThumbnailWrite::Put(thumbnail("2.jpg"))),
        ];
        store.commit_entries(&writes).unwrap();

        let bytes = store
            .fold_thumbnails(0u64, |acc, _, meta| acc + meta.byte_size)
            .unwrap();
        assert_eq!(bytes, 64);

        let states = store.fold_states(0usize, |acc, _, _| acc + 1).unwrap();
        assert_eq!(states, 2);
    }

    #[test]
    fn test_undecodable_state_reads_as_absent() {
        let (store, _temp) = create_test_store();
        let writes = vec![
            write_for(&record("c-1", "a"), ThumbnailWrite::Remove),
            write_for(&record("c-2", "b"), ThumbnailWrite::Remove),
        ];
        store.commit_entries(&writes).unwrap();
        store.put_raw(Keyspace::State, "c-1", b"garbage").unwrap();

        let states = store
            .get_states(&["c-1".to_string(), "c-2".to_string()])
            .unwrap();
        assert!(states[0].is_none());
        assert!(states[1].is_some());

        let counted = store.fold_states(0usize, |acc, _, _| acc + 1).unwrap();
        assert_eq!(counted, 1);
    }
}
