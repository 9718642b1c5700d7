//! Thumbnail cache adapter.
//!
//! Turns a record's representative preview into a bounded-size
//! [`ThumbnailCacheEntry`]. The resize decision looks at metadata only; asset
//! bytes are read once the adapter commits to caching the preview.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use catalog_types::{PreviewAsset, ThumbnailCacheEntry, ThumbnailMeta, ThumbnailSettings};

use crate::memory::{BufferPool, PooledBuffer};
use crate::resize::{sniff_format, ImageResizer, ResizeTarget, ResizedImage};
use crate::source::{AssetError, AssetSource};

/// Supplies the operator-tunable thumbnail parameters.
pub trait ThumbnailSettingsProvider: Send + Sync {
    fn thumbnail_settings(&self) -> ThumbnailSettings;
}

/// Provider returning a fixed snapshot, usually taken from `Settings`.
#[derive(Debug, Clone, Default)]
pub struct StaticThumbnailSettings(pub ThumbnailSettings);

impl ThumbnailSettingsProvider for StaticThumbnailSettings {
    fn thumbnail_settings(&self) -> ThumbnailSettings {
        self.0.clone()
    }
}

/// Why an asset is resized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeTrigger {
    /// Unmodified original rather than a derivative
    Direct,
    /// Width or height above the threshold
    Dimensions,
    /// Byte size above the threshold
    ByteSize,
}

/// Outcome of the resize decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeDecision {
    Resize(ResizeTrigger),
    PassThrough,
}

/// Decide whether an asset needs resizing. First match wins; thresholds
/// are strict so an asset exactly at a limit passes through.
pub fn decide(asset: &PreviewAsset, settings: &ThumbnailSettings) -> ResizeDecision {
    if asset.direct {
        ResizeDecision::Resize(ResizeTrigger::Direct)
    } else if asset.width > settings.max_width || asset.height > settings.max_height {
        ResizeDecision::Resize(ResizeTrigger::Dimensions)
    } else if asset.byte_size > settings.max_bytes {
        ResizeDecision::Resize(ResizeTrigger::ByteSize)
    } else {
        ResizeDecision::PassThrough
    }
}

/// Builds index-ready thumbnails from preview assets.
pub struct ThumbnailCacheAdapter {
    assets: Arc<dyn AssetSource>,
    resizer: Arc<dyn ImageResizer>,
    provider: Arc<dyn ThumbnailSettingsProvider>,
    pool: Arc<BufferPool>,
    cached_settings: Mutex<Option<(ThumbnailSettings, Instant)>>,
}

impl ThumbnailCacheAdapter {
    pub fn new(
        assets: Arc<dyn AssetSource>,
        resizer: Arc<dyn ImageResizer>,
        provider: Arc<dyn ThumbnailSettingsProvider>,
        pool: Arc<BufferPool>,
    ) -> Self {
        Self {
            assets,
            resizer,
            provider,
            pool,
            cached_settings: Mutex::new(None),
        }
    }

    /// Current settings, re-read from the provider once the TTL expires.
    pub fn settings(&self) -> ThumbnailSettings {
        if let Ok(cache) = self.cached_settings.lock() {
            if let Some((settings, fetched_at)) = cache.as_ref() {
                if fetched_at.elapsed() < Duration::from_secs(settings.settings_ttl_secs) {
                    return settings.clone();
                }
            }
        }

        let settings = self.provider.thumbnail_settings();
        if let Ok(mut cache) = self.cached_settings.lock() {
            *cache = Some((settings.clone(), Instant::now()));
        }
        debug!(
            format = %settings.format,
            quality = settings.quality,
            "Refreshed thumbnail settings"
        );
        settings
    }

    /// Produce the cache entry for an asset.
    ///
    /// Only asset read failures are returned. Resize failures, and resizes
    /// that would grow the payload, fall back to the original bytes.
    pub async fn prepare_for_cache(
        &self,
        asset: &PreviewAsset,
    ) -> Result<ThumbnailCacheEntry, AssetError> {
        let settings = self.settings();
        let decision = decide(asset, &settings);

        let mut buf = self.pool.acquire();
        self.assets.read(asset, &mut buf).await?;
        if buf.is_empty() {
            return Err(AssetError::Corrupt(format!("{} is empty", asset.path)));
        }

        let ResizeDecision::Resize(trigger) = decision else {
            debug!(path = %asset.path, "Caching preview unmodified");
            return Ok(original_entry(asset, &buf));
        };

        let target = ResizeTarget::from(&settings);
        let (buf, result) = self.resize_blocking(buf, target).await?;
        match result {
            Ok(resized) if resized.data.len() <= buf.len() => {
                debug!(
                    path = %asset.path,
                    trigger = ?trigger,
                    original_bytes = buf.len(),
                    resized_bytes = resized.data.len(),
                    "Resized preview"
                );
                Ok(resized_entry(asset, resized))
            }
            Ok(resized) => {
                debug!(
                    path = %asset.path,
                    original_bytes = buf.len(),
                    resized_bytes = resized.data.len(),
                    "Resize grew the payload, keeping original"
                );
                Ok(original_entry(asset, &buf))
            }
            Err(reason) => {
                warn!(path = %asset.path, error = %reason, "Resize failed, caching original");
                Ok(original_entry(asset, &buf))
            }
        }
    }

    /// Run the resizer on a blocking thread, handing the buffer back.
    ///
    /// If the task itself dies the original bytes go with it, so the record
    /// fails instead of falling back.
    async fn resize_blocking(
        &self,
        buf: PooledBuffer,
        target: ResizeTarget,
    ) -> Result<(PooledBuffer, Result<ResizedImage, String>), AssetError> {
        let resizer = Arc::clone(&self.resizer);
        tokio::task::spawn_blocking(move || {
            let result = resizer.resize(&buf, &target).map_err(|e| e.to_string());
            (buf, result)
        })
        .await
        .map_err(|e| AssetError::Io(format!("resize task failed: {}", e)))
    }
}

fn original_entry(asset: &PreviewAsset, bytes: &[u8]) -> ThumbnailCacheEntry {
    ThumbnailCacheEntry::new(
        ThumbnailMeta {
            format: sniff_format(bytes),
            quality: 0,
            width: asset.width,
            height: asset.height,
            byte_size: 0,
            source_path: asset.path.clone(),
            resized: false,
        },
        bytes.to_vec(),
    )
}

fn resized_entry(asset: &PreviewAsset, resized: ResizedImage) -> ThumbnailCacheEntry {
    ThumbnailCacheEntry::new(
        ThumbnailMeta {
            format: resized.format,
            quality: resized.quality,
            width: resized.width,
            height: resized.height,
            byte_size: 0,
            source_path: asset.path.clone(),
            resized: true,
        },
        resized.data,
    )
}
