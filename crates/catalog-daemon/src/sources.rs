//! File-backed collaborators used by the daemon.
//!
//! - [`JsonLinesPrimaryStore`]: one JSON record per line, streamed
//! - [`DirectoryAssetSource`]: preview paths relative to an asset root

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader, Lines};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use catalog_indexing::{AssetError, AssetSource, PrimaryStore, SourceError};
use catalog_types::{PreviewAsset, PrimaryRecord};

/// Primary store reading a JSON-lines file.
///
/// Blank lines are ignored. A line that does not decode is reported as
/// `InvalidRecord` with its `file:line` location and the stream continues.
pub struct JsonLinesPrimaryStore {
    path: PathBuf,
    /// Byte offset of every id, rebuilt when the file changes
    offsets: Mutex<Option<OffsetIndex>>,
}

struct OffsetIndex {
    modified: SystemTime,
    len: u64,
    offsets: HashMap<String, u64>,
}

#[derive(Deserialize)]
struct IdOnly {
    id: String,
}

type LineState = (Option<Lines<BufReader<File>>>, usize, String);

impl JsonLinesPrimaryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offsets: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unavailable(&self, e: std::io::Error) -> SourceError {
        SourceError::Unavailable(format!("{}: {}", self.path.display(), e))
    }

    async fn next_record(state: LineState) -> Option<(Result<PrimaryRecord, SourceError>, LineState)> {
        let (lines, mut line_no, label) = state;
        let mut lines = lines?;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    line_no += 1;
                    if line.trim().is_empty() {
                        continue;
                    }
                    let item = serde_json::from_str::<PrimaryRecord>(&line).map_err(|e| {
                        SourceError::InvalidRecord {
                            location: format!("{}:{}", label, line_no),
                            message: e.to_string(),
                        }
                    });
                    return Some((item, (Some(lines), line_no, label)));
                }
                Ok(None) => return None,
                Err(e) => {
                    let err = SourceError::Unavailable(format!("{}: {}", label, e));
                    return Some((Err(err), (None, line_no, label)));
                }
            }
        }
    }

    /// Map every id to the byte offset of its line.
    async fn build_offsets(&self) -> Result<HashMap<String, u64>, SourceError> {
        let file = File::open(&self.path)
            .await
            .map_err(|e| self.unavailable(e))?;
        let mut reader = BufReader::new(file);
        let mut offsets = HashMap::new();
        let mut offset = 0u64;
        let mut line = String::new();
        loop {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .await
                .map_err(|e| self.unavailable(e))?;
            if read == 0 {
                break;
            }
            if let Ok(entry) = serde_json::from_str::<IdOnly>(&line) {
                offsets.insert(entry.id, offset);
            }
            offset += read as u64;
        }
        debug!(path = ?self.path, records = offsets.len(), "Built record offset index");
        Ok(offsets)
    }

    async fn offset_of(&self, id: &str) -> Result<Option<u64>, SourceError> {
        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| self.unavailable(e))?;
        let modified = meta.modified().map_err(|e| self.unavailable(e))?;

        let mut guard = self.offsets.lock().await;
        let stale = guard
            .as_ref()
            .map_or(true, |idx| idx.modified != modified || idx.len != meta.len());
        if stale {
            *guard = Some(OffsetIndex {
                modified,
                len: meta.len(),
                offsets: self.build_offsets().await?,
            });
        }
        Ok(guard.as_ref().and_then(|idx| idx.offsets.get(id).copied()))
    }
}

#[async_trait]
impl PrimaryStore for JsonLinesPrimaryStore {
    fn stream_all(&self) -> BoxStream<'_, Result<PrimaryRecord, SourceError>> {
        let label = self.path.display().to_string();
        stream::once(File::open(self.path.clone()))
            .map(move |opened| match opened {
                Ok(file) => {
                    let lines = BufReader::new(file).lines();
                    stream::unfold((Some(lines), 0, label.clone()), Self::next_record).boxed()
                }
                Err(e) => {
                    let err = SourceError::Unavailable(format!("{}: {}", label, e));
                    stream::once(async move { Err(err) }).boxed()
                }
            })
            .flatten()
            .boxed()
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<PrimaryRecord>, SourceError> {
        let Some(offset) = self.offset_of(id).await? else {
            return Ok(None);
        };

        let mut file = File::open(&self.path)
            .await
            .map_err(|e| self.unavailable(e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| self.unavailable(e))?;
        let mut line = String::new();
        BufReader::new(file)
            .read_line(&mut line)
            .await
            .map_err(|e| self.unavailable(e))?;

        let record: PrimaryRecord =
            serde_json::from_str(&line).map_err(|e| SourceError::InvalidRecord {
                location: format!("{}@{}", self.path.display(), offset),
                message: e.to_string(),
            })?;
        Ok((record.id == id).then_some(record))
    }
}

/// How a preview path was resolved against the asset root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    /// The path exists as given
    Exact(PathBuf),
    /// Only a case-insensitive file-name match exists in the same directory
    FallbackByName { resolved: PathBuf, original: PathBuf },
    NotFound,
}

/// Asset source rooted at a directory.
pub struct DirectoryAssetSource {
    root: PathBuf,
}

impl DirectoryAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a preview path. Paths that leave the root never match.
    pub async fn resolve(&self, relative: &str) -> MatchResult {
        let relative = Path::new(relative);
        let confined = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !confined {
            return MatchResult::NotFound;
        }

        let original = self.root.join(relative);
        if tokio::fs::metadata(&original)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return MatchResult::Exact(original);
        }

        let (Some(parent), Some(wanted)) = (original.parent(), original.file_name()) else {
            return MatchResult::NotFound;
        };
        let wanted = wanted.to_string_lossy().to_lowercase();
        let Ok(mut entries) = tokio::fs::read_dir(parent).await else {
            return MatchResult::NotFound;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().to_lowercase() == wanted {
                return MatchResult::FallbackByName {
                    resolved: entry.path(),
                    original,
                };
            }
        }
        MatchResult::NotFound
    }
}

#[async_trait]
impl AssetSource for DirectoryAssetSource {
    async fn read(&self, asset: &PreviewAsset, buf: &mut Vec<u8>) -> Result<(), AssetError> {
        let path = match self.resolve(&asset.path).await {
            MatchResult::Exact(path) => path,
            MatchResult::FallbackByName { resolved, original } => {
                warn!(
                    original = %original.display(),
                    resolved = %resolved.display(),
                    "Preview resolved by file name"
                );
                resolved
            }
            MatchResult::NotFound => return Err(AssetError::NotFound(asset.path.clone())),
        };

        let mut file = File::open(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AssetError::NotFound(asset.path.clone()),
            _ => AssetError::Io(format!("{}: {}", path.display(), e)),
        })?;
        file.read_to_end(buf)
            .await
            .map_err(|e| AssetError::Io(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }
}
