//! In-memory raster model.
//!
//! A [`Raster`] owns a rectangular grid of samples (`width × height × bands`)
//! together with the affine transform that places its pixels in projected
//! coordinates. Rasters are never mutated in place; every transformation in
//! the pipeline produces a new buffer.
//!
//! Sample bytes are band-interleaved, row-major, little-endian.

use image::RgbaImage;

use crate::error::{ConfigError, ResourceError};
use crate::grid::{Extents, XY};

/// Per-band sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    U8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl SampleFormat {
    /// Bytes per sample.
    pub fn byte_width(&self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::U16 | SampleFormat::I16 => 2,
            SampleFormat::U32 | SampleFormat::I32 | SampleFormat::F32 => 4,
            SampleFormat::F64 => 8,
        }
    }
}

/// Affine transform mapping pixel coordinates to projected coordinates.
///
/// `origin` is the projected position of the top-left corner of pixel
/// (0, 0); `pixel_height` is negative for north-up rasters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Builds a north-up transform covering `extents` with a `width × height`
    /// pixel grid.
    pub fn from_extents(extents: &Extents, width: u32, height: u32) -> Self {
        let dims = extents.dimensions();
        Self {
            origin_x: extents.lower_left.x,
            origin_y: extents.upper_right.y,
            pixel_width: dims.x / f64::from(width),
            pixel_height: -dims.y / f64::from(height),
        }
    }

    /// Ground units per pixel along each axis (absolute values).
    pub fn pixel_dimensions(&self) -> XY {
        XY::new(self.pixel_width.abs(), self.pixel_height.abs())
    }

    /// Projected extents of a `width × height` raster under this transform.
    pub fn extents(&self, width: u32, height: u32) -> Extents {
        let x0 = self.origin_x;
        let y0 = self.origin_y;
        let x1 = self.origin_x + self.pixel_width * f64::from(width);
        let y1 = self.origin_y + self.pixel_height * f64::from(height);
        Extents::new(
            XY::new(x0.min(x1), y0.min(y1)),
            XY::new(x0.max(x1), y0.max(y1)),
        )
    }
}

/// An owned, immutable grid of pixel samples with georeferencing.
#[derive(Debug, Clone)]
pub struct Raster {
    width: u32,
    height: u32,
    bands: u8,
    format: SampleFormat,
    data: Vec<u8>,
    transform: GeoTransform,
    nodata: Option<f64>,
}

impl Raster {
    /// Wraps a sample buffer.
    ///
    /// # Errors
    ///
    /// Returns `ResourceError::BufferSize` if `data` does not hold exactly
    /// `width × height × bands` samples of `format`.
    pub fn new(
        width: u32,
        height: u32,
        bands: u8,
        format: SampleFormat,
        data: Vec<u8>,
        transform: GeoTransform,
        nodata: Option<f64>,
    ) -> Result<Self, ResourceError> {
        let expected = width as usize * height as usize * bands as usize * format.byte_width();
        if data.len() != expected {
            return Err(ResourceError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            bands,
            format,
            data,
            transform,
            nodata,
        })
    }

    /// Wraps an RGBA image as a 4-band U8 raster.
    pub fn from_rgba(image: RgbaImage, transform: GeoTransform) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            bands: 4,
            format: SampleFormat::U8,
            data: image.into_raw(),
            transform,
            nodata: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bands(&self) -> u8 {
        self.bands
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Projected extents of the raster.
    pub fn extents(&self) -> Extents {
        self.transform.extents(self.width, self.height)
    }

    /// Reads one sample as `f64`. `band` is 0-based.
    ///
    /// Callers must stay in bounds; this is the hot path of the color
    /// mapper.
    pub fn sample(&self, band: u8, x: u32, y: u32) -> f64 {
        debug_assert!(band < self.bands && x < self.width && y < self.height);
        let width = self.format.byte_width();
        let index = ((y as usize * self.width as usize + x as usize) * self.bands as usize
            + band as usize)
            * width;
        let bytes = &self.data[index..index + width];
        match self.format {
            SampleFormat::U8 => f64::from(bytes[0]),
            SampleFormat::U16 => f64::from(u16::from_le_bytes([bytes[0], bytes[1]])),
            SampleFormat::I16 => f64::from(i16::from_le_bytes([bytes[0], bytes[1]])),
            SampleFormat::U32 => f64::from(u32::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ])),
            SampleFormat::I32 => f64::from(i32::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ])),
            SampleFormat::F32 => f64::from(f32::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ])),
            SampleFormat::F64 => f64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]),
        }
    }

    /// Returns true for a 4-band U8 raster.
    pub fn is_rgba8(&self) -> bool {
        self.bands == 4 && self.format == SampleFormat::U8
    }

    /// Returns true for a 3-band U8 raster.
    pub fn is_rgb8(&self) -> bool {
        self.bands == 3 && self.format == SampleFormat::U8
    }

    /// Converts to an RGBA image without color mapping.
    ///
    /// 4-band U8 passes through, 3-band U8 gains an opaque alpha channel,
    /// and 1-band U8 expands to grayscale. Anything else needs the color
    /// mapper.
    ///
    /// # Errors
    ///
    /// `ConfigError::UnsupportedBands` when the layout has no direct RGBA
    /// interpretation.
    pub fn to_rgba(&self) -> Result<RgbaImage, ConfigError> {
        if self.format != SampleFormat::U8 {
            return Err(ConfigError::UnsupportedBands(self.bands));
        }
        let pixels = self.width as usize * self.height as usize;
        let raw = match self.bands {
            4 => self.data.clone(),
            3 => {
                let mut raw = Vec::with_capacity(pixels * 4);
                for rgb in self.data.chunks_exact(3) {
                    raw.extend_from_slice(rgb);
                    raw.push(255);
                }
                raw
            }
            1 => {
                let mut raw = Vec::with_capacity(pixels * 4);
                for &v in &self.data {
                    raw.extend_from_slice(&[v, v, v, 255]);
                }
                raw
            }
            other => return Err(ConfigError::UnsupportedBands(other)),
        };
        // Length is correct by construction.
        Ok(RgbaImage::from_raw(self.width, self.height, raw).expect("buffer sized to dimensions"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_transform() -> GeoTransform {
        GeoTransform::new(0.0, 0.0, 1.0, -1.0)
    }

    #[test]
    fn test_new_rejects_short_buffer() {
        let result = Raster::new(
            4,
            4,
            1,
            SampleFormat::U16,
            vec![0u8; 31],
            unit_transform(),
            None,
        );
        assert!(matches!(
            result,
            Err(ResourceError::BufferSize {
                expected: 32,
                actual: 31
            })
        ));
    }

    #[test]
    fn test_sample_u8() {
        let data = vec![10, 20, 30, 40];
        let raster =
            Raster::new(2, 2, 1, SampleFormat::U8, data, unit_transform(), None).unwrap();
        assert_eq!(raster.sample(0, 0, 0), 10.0);
        assert_eq!(raster.sample(0, 1, 0), 20.0);
        assert_eq!(raster.sample(0, 0, 1), 30.0);
        assert_eq!(raster.sample(0, 1, 1), 40.0);
    }

    #[test]
    fn test_sample_u16_little_endian() {
        let mut data = Vec::new();
        for v in [0u16, 256, 65535, 7] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        let raster =
            Raster::new(2, 2, 1, SampleFormat::U16, data, unit_transform(), None).unwrap();
        assert_eq!(raster.sample(0, 0, 0), 0.0);
        assert_eq!(raster.sample(0, 1, 0), 256.0);
        assert_eq!(raster.sample(0, 0, 1), 65535.0);
    }

    #[test]
    fn test_sample_f32_negative() {
        let mut data = Vec::new();
        for v in [-1.5f32, 2.25] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        let raster =
            Raster::new(2, 1, 1, SampleFormat::F32, data, unit_transform(), None).unwrap();
        assert_eq!(raster.sample(0, 0, 0), -1.5);
        assert_eq!(raster.sample(0, 1, 0), 2.25);
    }

    #[test]
    fn test_sample_multi_band_interleaved() {
        // 1x2 raster, 3 bands: pixel 0 = (1,2,3), pixel 1 = (4,5,6).
        let data = vec![1, 2, 3, 4, 5, 6];
        let raster =
            Raster::new(2, 1, 3, SampleFormat::U8, data, unit_transform(), None).unwrap();
        assert_eq!(raster.sample(1, 0, 0), 2.0);
        assert_eq!(raster.sample(2, 1, 0), 6.0);
    }

    #[test]
    fn test_to_rgba_adds_alpha_to_rgb() {
        let data = vec![9, 8, 7];
        let raster =
            Raster::new(1, 1, 3, SampleFormat::U8, data, unit_transform(), None).unwrap();
        let image = raster.to_rgba().unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [9, 8, 7, 255]);
    }

    #[test]
    fn test_to_rgba_expands_grayscale() {
        let raster = Raster::new(
            1,
            1,
            1,
            SampleFormat::U8,
            vec![100],
            unit_transform(),
            None,
        )
        .unwrap();
        let image = raster.to_rgba().unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [100, 100, 100, 255]);
    }

    #[test]
    fn test_to_rgba_rejects_non_u8() {
        let raster = Raster::new(
            1,
            1,
            1,
            SampleFormat::F32,
            vec![0u8; 4],
            unit_transform(),
            None,
        )
        .unwrap();
        assert!(matches!(
            raster.to_rgba(),
            Err(ConfigError::UnsupportedBands(1))
        ));
    }

    #[test]
    fn test_geotransform_extents_north_up() {
        let transform = GeoTransform::new(100.0, 200.0, 10.0, -10.0);
        let extents = transform.extents(4, 2);
        assert_eq!(extents.lower_left.x, 100.0);
        assert_eq!(extents.lower_left.y, 180.0);
        assert_eq!(extents.upper_right.x, 140.0);
        assert_eq!(extents.upper_right.y, 200.0);
    }

    #[test]
    fn test_geotransform_from_extents_roundtrip() {
        let extents = Extents::new(XY::new(-50.0, -20.0), XY::new(50.0, 30.0));
        let transform = GeoTransform::from_extents(&extents, 100, 50);
        let back = transform.extents(100, 50);
        assert!(back.almost_equal(&extents, 1e-9));
        assert_eq!(transform.pixel_dimensions().x, 1.0);
        assert_eq!(transform.pixel_dimensions().y, 1.0);
    }
}
