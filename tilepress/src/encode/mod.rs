//! Tile image encoding.
//!
//! A [`TileEncoder`] turns a 256x256 RGBA tile buffer into encoded image
//! bytes. PNG is the lossless default; an optional png8 mode quantizes to an
//! indexed palette first, and JPEG drops the alpha channel before encoding.
//!
//! Encoders are stateless and shared behind a trait object so the pipeline
//! does not care which format the run was configured for.

mod quantize;

pub use quantize::{quantize, Quantized};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::EncodeError;

/// Output image format for tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    Png,
    Jpg,
}

impl TileFormat {
    /// File extension for the format.
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpg => "jpg",
        }
    }
}

impl std::fmt::Display for TileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Encodes tile pixel buffers into image bytes.
pub trait TileEncoder: Send + Sync {
    /// Encode one tile.
    ///
    /// # Errors
    ///
    /// Returns `EncodeError` when the buffer is inconsistent with its
    /// dimensions or the codec rejects it.
    fn encode(&self, image: &RgbaImage) -> Result<Vec<u8>, EncodeError>;

    /// The format this encoder produces.
    fn format(&self) -> TileFormat;

    /// Human-readable encoder name for logs.
    fn name(&self) -> &'static str;
}

/// Lossless PNG encoder, optionally quantizing to an indexed palette.
#[derive(Debug, Clone)]
pub struct PngTileEncoder {
    palette_size: Option<u16>,
}

impl PngTileEncoder {
    pub fn new() -> Self {
        Self { palette_size: None }
    }

    /// Quantize each tile to an indexed palette of `size` colors (png8).
    ///
    /// `size` must be in `[2, 256]`; the configuration layer validates this
    /// before an encoder is built.
    pub fn with_palette_size(mut self, size: u16) -> Self {
        debug_assert!((2..=256).contains(&size));
        self.palette_size = Some(size);
        self
    }

    fn encode_indexed(&self, image: &RgbaImage, size: u16) -> Result<Vec<u8>, EncodeError> {
        let quantized = quantize(image, size);

        let mut palette = Vec::with_capacity(quantized.palette.len() * 3);
        let mut alpha = Vec::with_capacity(quantized.palette.len());
        for entry in &quantized.palette {
            palette.extend_from_slice(&entry[..3]);
            alpha.push(entry[3]);
        }

        let mut buffer = Vec::new();
        let mut encoder = png::Encoder::new(&mut buffer, image.width(), image.height());
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(palette);
        encoder.set_trns(alpha);
        let mut writer = encoder
            .write_header()
            .map_err(|e| EncodeError::Codec(e.to_string()))?;
        writer
            .write_image_data(&quantized.indices)
            .map_err(|e| EncodeError::Codec(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| EncodeError::Codec(e.to_string()))?;
        Ok(buffer)
    }
}

impl Default for PngTileEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TileEncoder for PngTileEncoder {
    fn encode(&self, image: &RgbaImage) -> Result<Vec<u8>, EncodeError> {
        check_rgba_len(image)?;
        match self.palette_size {
            Some(size) => self.encode_indexed(image, size),
            None => {
                let mut buffer = Vec::new();
                PngEncoder::new(&mut buffer)
                    .write_image(
                        image.as_raw(),
                        image.width(),
                        image.height(),
                        ExtendedColorType::Rgba8,
                    )
                    .map_err(|e| EncodeError::Codec(e.to_string()))?;
                Ok(buffer)
            }
        }
    }

    fn format(&self) -> TileFormat {
        TileFormat::Png
    }

    fn name(&self) -> &'static str {
        match self.palette_size {
            Some(_) => "png8",
            None => "png",
        }
    }
}

/// JPEG encoder. Alpha cannot be represented and is stripped before
/// encoding, otherwise transparent pixels would come out white.
#[derive(Debug, Clone)]
pub struct JpegTileEncoder {
    quality: u8,
}

impl JpegTileEncoder {
    pub fn new() -> Self {
        Self { quality: 75 }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        debug_assert!(quality <= 100);
        self.quality = quality;
        self
    }
}

impl Default for JpegTileEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TileEncoder for JpegTileEncoder {
    fn encode(&self, image: &RgbaImage) -> Result<Vec<u8>, EncodeError> {
        check_rgba_len(image)?;
        let mut rgb = Vec::with_capacity(image.as_raw().len() / 4 * 3);
        for pixel in image.as_raw().chunks_exact(4) {
            rgb.extend_from_slice(&pixel[..3]);
        }
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, self.quality)
            .write_image(
                &rgb,
                image.width(),
                image.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| EncodeError::Codec(e.to_string()))?;
        Ok(buffer)
    }

    fn format(&self) -> TileFormat {
        TileFormat::Jpg
    }

    fn name(&self) -> &'static str {
        "jpeg"
    }
}

/// Builds the encoder configured for a run.
pub fn encoder_for(format: TileFormat, png8: Option<u16>) -> Box<dyn TileEncoder> {
    match (format, png8) {
        (TileFormat::Png, Some(size)) => Box::new(PngTileEncoder::new().with_palette_size(size)),
        (TileFormat::Png, None) => Box::new(PngTileEncoder::new()),
        (TileFormat::Jpg, _) => Box::new(JpegTileEncoder::new()),
    }
}

fn check_rgba_len(image: &RgbaImage) -> Result<(), EncodeError> {
    let expected = image.width() as usize * image.height() as usize * 4;
    let actual = image.as_raw().len();
    if actual != expected {
        return Err(EncodeError::ChannelMismatch { expected, actual });
    }
    Ok(())
}
