//! Index-ready thumbnail blobs.
//!
//! Stored value layout: `{meta_len:u32 BE}{meta JSON}{image bytes}`.
//! Keeping the metadata in a small header lets aggregation read it without
//! touching the image payload.

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

const HEADER_LEN: usize = 4;

/// Encoded image format of a cached thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThumbnailFormat {
    #[default]
    Jpeg,
    Png,
    Webp,
    /// Format of an unmodified asset whose encoding was not inspected
    Original,
}

impl ThumbnailFormat {
    /// Parse a format name as used in configuration.
    pub fn parse(s: &str) -> Result<Self, CatalogError> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ThumbnailFormat::Jpeg),
            "png" => Ok(ThumbnailFormat::Png),
            "webp" => Ok(ThumbnailFormat::Webp),
            other => Err(CatalogError::InvalidInput(format!(
                "unknown thumbnail format: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ThumbnailFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThumbnailFormat::Jpeg => write!(f, "jpeg"),
            ThumbnailFormat::Png => write!(f, "png"),
            ThumbnailFormat::Webp => write!(f, "webp"),
            ThumbnailFormat::Original => write!(f, "original"),
        }
    }
}

/// Thumbnail metadata, stored ahead of the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailMeta {
    pub format: ThumbnailFormat,
    /// Encoder quality (0 when not applicable)
    pub quality: u8,
    pub width: u32,
    pub height: u32,
    /// Payload size in bytes
    pub byte_size: u64,
    /// Asset the thumbnail was derived from
    pub source_path: String,
    /// True when the payload was produced by the resizer
    pub resized: bool,
}

/// One value of the thumbnail hash map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailCacheEntry {
    pub meta: ThumbnailMeta,
    pub data: Vec<u8>,
}

impl ThumbnailCacheEntry {
    /// Build an entry, deriving `byte_size` from the payload.
    pub fn new(mut meta: ThumbnailMeta, data: Vec<u8>) -> Self {
        meta.byte_size = data.len() as u64;
        Self { meta, data }
    }

    /// Encode to the stored layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CatalogError> {
        let meta = serde_json::to_vec(&self.meta)?;
        let meta_len = u32::try_from(meta.len())
            .map_err(|_| CatalogError::Encoding("thumbnail metadata too large".to_string()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + meta.len() + self.data.len());
        out.extend_from_slice(&meta_len.to_be_bytes());
        out.extend_from_slice(&meta);
        out.extend_from_slice(&self.data);
        Ok(out)
    }

    /// Decode a full entry.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CatalogError> {
        let (meta, offset) = Self::split_meta(bytes)?;
        Ok(Self {
            meta,
            data: bytes[offset..].to_vec(),
        })
    }

    /// Decode only the metadata header.
    pub fn meta_from_bytes(bytes: &[u8]) -> Result<ThumbnailMeta, CatalogError> {
        Self::split_meta(bytes).map(|(meta, _)| meta)
    }

    fn split_meta(bytes: &[u8]) -> Result<(ThumbnailMeta, usize), CatalogError> {
        if bytes.len() < HEADER_LEN {
            return Err(CatalogError::Encoding("thumbnail value truncated".to_string()));
        }
        let mut len_buf = [0u8; HEADER_LEN];
        len_buf.copy_from_slice(&bytes[..HEADER_LEN]);
        let meta_len = u32::from_be_bytes(len_buf) as usize;
        let end = HEADER_LEN + meta_len;
        if bytes.len() < end {
            return Err(CatalogError::Encoding(format!(
                "thumbnail header claims {} bytes, value has {}",
                meta_len,
                bytes.len() - HEADER_LEN
            )));
        }
        let meta = serde_json::from_slice(&bytes[HEADER_LEN..end])?;
        Ok((meta, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ThumbnailCacheEntry {
        ThumbnailCacheEntry::new(
            ThumbnailMeta {
                format: ThumbnailFormat::Jpeg,
                quality: 80,
                width: 320,
                height: 200,
                byte_size: 0,
                source_path: "a/cover.jpg".to_string(),
                resized: true,
            },
            vec![1, 2, 3, 4, 5],
        )
    }

    #[test]
    fn test_byte_size_follows_payload() {
        assert_eq!(entry().meta.byte_size, 5);
    }

    #[test]
    fn test_encoding_roundtrip() {
        let original = entry();
        let decoded = ThumbnailCacheEntry::from_bytes(&original.to_bytes().unwrap()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_meta_only_decode() {
        let bytes = entry().to_bytes().unwrap();
        let meta = ThumbnailCacheEntry::meta_from_bytes(&bytes).unwrap();
        assert_eq!(meta.width, 320);
        assert_eq!(meta.source_path, "a/cover.jpg");
    }

    #[test]
    fn test_truncated_value_rejected() {
        let bytes = entry().to_bytes().unwrap();
        assert!(ThumbnailCacheEntry::from_bytes(&bytes[..2]).is_err());
        assert!(ThumbnailCacheEntry::from_bytes(&bytes[..10]).is_err());
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(ThumbnailFormat::parse("JPG").unwrap(), ThumbnailFormat::Jpeg);
        assert_eq!(ThumbnailFormat::parse("webp").unwrap(), ThumbnailFormat::Webp);
        assert!(ThumbnailFormat::parse("gif").is_err());
        assert_eq!(ThumbnailFormat::Png.to_string(), "png");
    }
}
