// src/transforms/image.rs

use std::io::Cursor;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, ImageEncoder, ImageFormat};
use tracing::debug;

use crate::pipeline::Asset;
use crate::transforms::{StepOutput, Transform};

/// Image compression: PNGs are re-encoded losslessly at the highest
/// compression level, JPEGs are re-encoded at `jpeg_quality`. The smaller of
/// the original and the re-encoded bytes is kept. Other formats pass
/// through untouched.
#[derive(Debug, Clone, Copy)]
pub struct ImageStep {
    jpeg_quality: u8,
}

impl ImageStep {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    fn recompress(&self, format: ImageFormat, bytes: &[u8]) -> Result<Vec<u8>> {
        let img = image::load_from_memory_with_format(bytes, format).context("decoding image")?;
        let mut out = Vec::new();

        match format {
            ImageFormat::Png => {
                let encoder = PngEncoder::new_with_quality(
                    Cursor::new(&mut out),
                    CompressionType::Best,
                    FilterType::Adaptive,
                );
                encoder
                    .write_image(img.as_bytes(), img.width(), img.height(), img.color())
                    .context("encoding png")?;
            }
            _ => {
                let rgb = img.to_rgb8();
                let mut encoder = JpegEncoder::new_with_quality(&mut out, self.jpeg_quality);
                encoder
                    .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
                    .context("encoding jpeg")?;
            }
        }

        Ok(out)
    }
}

impl Transform for ImageStep {
    fn name(&self) -> &str {
        "image"
    }

    fn apply(&self, asset: &Asset) -> Result<Option<StepOutput>> {
        let format = match asset.extension().map(str::to_ascii_lowercase).as_deref() {
            Some("png") => ImageFormat::Png,
            Some("jpg" | "jpeg") => ImageFormat::Jpeg,
            _ => return Ok(Some(StepOutput::bytes(asset.contents.clone()))),
        };

        let compressed = self.recompress(format, &asset.contents)?;
        if compressed.len() < asset.contents.len() {
            debug!(
                path = %asset.source.display(),
                before = asset.contents.len(),
                after = compressed.len(),
                "image recompressed"
            );
            Ok(Some(StepOutput::bytes(compressed)))
        } else {
            Ok(Some(StepOutput::bytes(asset.contents.clone())))
        }
    }
}
