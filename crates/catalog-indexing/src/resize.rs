//! Image resizing collaborator.
//!
//! The engine only decides *whether* to resize (see `thumbnail`); the
//! encoding itself goes through [`ImageResizer`]. [`ImageCrateResizer`] is
//! the default implementation, built on the `image` crate.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use thiserror::Error;

use catalog_types::{ThumbnailFormat, ThumbnailSettings};

/// Resize failures. All of them fall back to caching the original bytes.
#[derive(Debug, Error)]
pub enum ResizeError {
    #[error("decode failed: {0}")]
    Decode(String),

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("unsupported output format: {0}")]
    Unsupported(ThumbnailFormat),
}

/// Output parameters of one resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeTarget {
    /// Bounding box; aspect ratio is preserved
    pub width: u32,
    pub height: u32,
    pub format: ThumbnailFormat,
    pub quality: u8,
}

impl From<&ThumbnailSettings> for ResizeTarget {
    fn from(settings: &ThumbnailSettings) -> Self {
        Self {
            width: settings.target_width,
            height: settings.target_height,
            format: settings.format,
            quality: settings.quality,
        }
    }
}

/// An encoded, resized image.
#[derive(Debug, Clone)]
pub struct ResizedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ThumbnailFormat,
    /// Quality used by the encoder (0 for lossless formats)
    pub quality: u8,
}

/// CPU-bound image resizer. Called from a blocking thread.
pub trait ImageResizer: Send + Sync {
    fn resize(&self, bytes: &[u8], target: &ResizeTarget) -> Result<ResizedImage, ResizeError>;
}

/// Resizer backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateResizer;

impl ImageResizer for ImageCrateResizer {
    fn resize(&self, bytes: &[u8], target: &ResizeTarget) -> Result<ResizedImage, ResizeError> {
        let img = image::load_from_memory(bytes).map_err(|e| ResizeError::Decode(e.to_string()))?;

        // Never upscale
        let img = if img.width() > target.width || img.height() > target.height {
            img.thumbnail(target.width, target.height)
        } else {
            img
        };

        let mut data = Vec::new();
        let quality = match target.format {
            ThumbnailFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
                let encoder = JpegEncoder::new_with_quality(&mut data, target.quality);
                rgb.write_with_encoder(encoder)
                    .map_err(|e| ResizeError::Encode(e.to_string()))?;
                target.quality
            }
            ThumbnailFormat::Png => {
                img.write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
                    .map_err(|e| ResizeError::Encode(e.to_string()))?;
                0
            }
            ThumbnailFormat::Webp => {
                // The bundled WebP encoder is lossless and wants 8-bit RGBA
                DynamicImage::ImageRgba8(img.to_rgba8())
                    .write_to(&mut Cursor::new(&mut data), ImageFormat::WebP)
                    .map_err(|e| ResizeError::Encode(e.to_string()))?;
                0
            }
            ThumbnailFormat::Original => return Err(ResizeError::Unsupported(target.format)),
        };

        Ok(ResizedImage {
            data,
            width: img.width(),
            height: img.height(),
            format: target.format,
            quality,
        })
    }
}

/// Identify the encoding of unmodified asset bytes.
pub fn sniff_format(bytes: &[u8]) -> ThumbnailFormat {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => ThumbnailFormat::Jpeg,
        Ok(ImageFormat::Png) => ThumbnailFormat::Png,
        Ok(ImageFormat::WebP) => ThumbnailFormat::Webp,
        _ => ThumbnailFormat::Original,
    }
}
