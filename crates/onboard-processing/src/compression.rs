use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ImageFormat, ImageReader};
use std::io::Cursor;

/// JPEG quality used when re-encoding a downscaled image
pub const JPEG_QUALITY: u8 = 85;

/// Downscales oversized PNG/JPEG images before branding.
///
/// A `max_dimension` of 0 disables the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCompressor {
    max_dimension: u32,
}

impl ImageCompressor {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_dimension > 0
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// Returns `Ok(None)` when nothing needs doing (disabled, unsupported format, already small
    /// enough) and the re-encoded bytes, in the same format, when the image was downscaled.
    pub fn compress(&self, data: &[u8]) -> Result<Option<Vec<u8>>> {
        if !self.is_enabled() || data.is_empty() {
            return Ok(None);
        }

        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .context("Failed to read image header")?;
        let format = match reader.format() {
            Some(format @ (ImageFormat::Png | ImageFormat::Jpeg)) => format,
            _ => return Ok(None),
        };

        let (width, height) = reader
            .into_dimensions()
            .context("Failed to read image dimensions")?;
        if width.max(height) <= self.max_dimension {
            return Ok(None);
        }

        let img = image::load_from_memory_with_format(data, format)
            .context("Failed to decode image")?;
        let resized = img.resize(self.max_dimension, self.max_dimension, FilterType::Lanczos3);

        let mut buffer = Vec::new();
        match format {
            ImageFormat::Jpeg => {
                JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY)
                    .encode_image(&resized.to_rgb8())
                    .context("Failed to encode JPEG")?;
            }
            _ => {
                resized
                    .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
                    .context("Failed to encode PNG")?;
            }
        }

        tracing::debug!(
            original_width = width,
            original_height = height,
            width = resized.width(),
            height = resized.height(),
            original_bytes = data.len(),
            compressed_bytes = buffer.len(),
            "Image downscaled"
        );

        Ok(Some(buffer))
    }
}
