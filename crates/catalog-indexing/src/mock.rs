//! In-memory collaborators for tests and local experiments.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use catalog_types::{PreviewAsset, PrimaryRecord};

use crate::resize::{ImageResizer, ResizeError, ResizeTarget, ResizedImage};
use crate::source::{AssetError, AssetSource, PrimaryStore, SourceError};

/// Primary store backed by an ordered map.
pub struct InMemoryPrimaryStore {
    records: RwLock<BTreeMap<String, PrimaryRecord>>,
    /// Stream yields `Unavailable` after this many records
    fail_after: AtomicUsize,
    unavailable: AtomicBool,
    /// Ids whose `get_by_id` returns `InvalidRecord`
    unreadable: RwLock<HashSet<String>>,
    lookups: AtomicUsize,
}

impl InMemoryPrimaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = PrimaryRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.upsert(record);
        }
        store
    }

    /// Insert or replace a record.
    pub fn upsert(&self, record: PrimaryRecord) {
        if let Ok(mut records) = self.records.write() {
            records.insert(record.id.clone(), record);
        }
    }

    /// Delete a record out of band.
    pub fn remove(&self, id: &str) -> Option<PrimaryRecord> {
        self.records.write().ok().and_then(|mut r| r.remove(id))
    }

    pub fn get(&self, id: &str) -> Option<PrimaryRecord> {
        self.records.read().ok().and_then(|r| r.get(id).cloned())
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make `stream_all` fail after yielding `n` records.
    pub fn fail_after(&self, n: usize) {
        self.fail_after.store(n, Ordering::SeqCst);
    }

    /// Make every call fail as if the store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `get_by_id` fail to decode `id`. Streaming is unaffected.
    pub fn mark_unreadable(&self, id: impl Into<String>) {
        if let Ok(mut unreadable) = self.unreadable.write() {
            unreadable.insert(id.into());
        }
    }

    /// Number of `get_by_id` calls served.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryPrimaryStore {
    fn default() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            fail_after: AtomicUsize::new(usize::MAX),
            unavailable: AtomicBool::new(false),
            unreadable: RwLock::new(HashSet::new()),
            lookups: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PrimaryStore for InMemoryPrimaryStore {
    fn stream_all(&self) -> BoxStream<'_, Result<PrimaryRecord, SourceError>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return stream::once(async {
                Err(SourceError::Unavailable("store offline".to_string()))
            })
            .boxed();
        }

        let snapshot: Vec<PrimaryRecord> = self
            .records
            .read()
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default();
        let fail_after = self.fail_after.load(Ordering::SeqCst);

        stream::iter(snapshot.into_iter().enumerate().map(move |(i, record)| {
            if i >= fail_after {
                Err(SourceError::Unavailable("connection reset".to_string()))
            } else {
                Ok(record)
            }
        }))
        .boxed()
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<PrimaryRecord>, SourceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("store offline".to_string()));
        }
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let unreadable = self
            .unreadable
            .read()
            .map(|u| u.contains(id))
            .unwrap_or(false);
        if unreadable {
            return Err(SourceError::InvalidRecord {
                location: id.to_string(),
                message: "missing field `sort_key`".to_string(),
            });
        }
        Ok(self.get(id))
    }
}

/// Asset source backed by a path -> bytes map.
#[derive(Default)]
pub struct InMemoryAssetSource {
    assets: RwLock<HashMap<String, Vec<u8>>>,
    corrupt: RwLock<HashSet<String>>,
}

impl InMemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(self, path: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(path, bytes);
        self
    }

    pub fn insert(&self, path: impl Into<String>, bytes: Vec<u8>) {
        if let Ok(mut assets) = self.assets.write() {
            assets.insert(path.into(), bytes);
        }
    }

    /// Delete an asset, as if the file vanished from disk.
    pub fn remove(&self, path: &str) {
        if let Ok(mut assets) = self.assets.write() {
            assets.remove(path);
        }
    }

    /// Make reads of `path` fail as corrupt.
    pub fn mark_corrupt(&self, path: impl Into<String>) {
        if let Ok(mut corrupt) = self.corrupt.write() {
            corrupt.insert(path.into());
        }
    }
}

#[async_trait]
impl AssetSource for InMemoryAssetSource {
    async fn read(&self, asset: &PreviewAsset, buf: &mut Vec<u8>) -> Result<(), AssetError> {
        let corrupt = self
            .corrupt
            .read()
            .map(|c| c.contains(&asset.path))
            .unwrap_or(false);
        if corrupt {
            return Err(AssetError::Corrupt(asset.path.clone()));
        }

        let assets = self
            .assets
            .read()
            .map_err(|_| AssetError::Io("asset map poisoned".to_string()))?;
        let bytes = assets
            .get(&asset.path)
            .ok_or_else(|| AssetError::NotFound(asset.path.clone()))?;
        buf.extend_from_slice(bytes);
        Ok(())
    }
}

/// Resizer that returns a fixed-size payload without decoding anything.
#[derive(Default)]
pub struct MockResizer {
    output_len: usize,
    calls: AtomicUsize,
}

impl MockResizer {
    pub fn new(output_len: usize) -> Self {
        Self {
            output_len,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageResizer for MockResizer {
    fn resize(&self, _bytes: &[u8], target: &ResizeTarget) -> Result<ResizedImage, ResizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ResizedImage {
            data: vec![0xAB; self.output_len],
            width: target.width,
            height: target.height,
            format: target.format,
            quality: target.quality,
        })
    }
}

/// Resizer that always fails to decode.
pub struct FailingResizer;

impl ImageResizer for FailingResizer {
    fn resize(&self, _bytes: &[u8], _target: &ResizeTarget) -> Result<ResizedImage, ResizeError> {
        Err(ResizeError::Decode("unsupported codec".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_primary_store_streams_in_id_order() {
        let store = InMemoryPrimaryStore::with_records(vec![
            PrimaryRecord::new("b", "B", "b", Utc::now()),
            PrimaryRecord::new("a", "A", "a", Utc::now()),
        ]);
        let ids: Vec<String> = store
            .stream_all()
            .map(|r| r.unwrap().id)
            .collect()
            .await;
        assert_eq!(ids, vec!["a", "b"]);
        assert!(store.get_by_id("a").await.unwrap().is_some());
        assert!(store.get_by_id("zzz").await.unwrap().is_none());
        assert_eq!(store.lookups(), 2);
    }

    #[tokio::test]
    async fn test_primary_store_fail_after() {
        let store = InMemoryPrimaryStore::with_records(
            (0..5).map(|i| PrimaryRecord::new(format!("r{}", i), "n", "k", Utc::now())),
        );
        store.fail_after(3);
        let results: Vec<_> = store.stream_all().collect().await;
        assert!(results[..3].iter().all(|r| r.is_ok()));
        assert!(matches!(results[3], Err(SourceError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_asset_source_errors() {
        let source = InMemoryAssetSource::new().with_asset("a.jpg", vec![1, 2, 3]);
        source.mark_corrupt("b.jpg");

        let mut buf = Vec::new();
        source
            .read(&PreviewAsset::new("a.jpg", 1, 1, 3), &mut buf)
            .await
            .unwrap();
        assert_eq!(buf, vec![1, 2, 3]);

        let err = source
            .read(&PreviewAsset::new("b.jpg", 1, 1, 3), &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::Corrupt(_)));

        let err = source
            .read(&PreviewAsset::new("c.jpg", 1, 1, 3), &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }
}
