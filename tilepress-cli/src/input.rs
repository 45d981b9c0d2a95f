//! Raster loading.
//!
//! Decoding is delegated to the `image` crate; this module only maps the
//! decoded buffer onto the library's [`Raster`] model and attaches the
//! projected extents. Grayscale inputs keep their single band (and 16-bit
//! depth) so scientific data can flow into the color mapper unquantized.

use std::path::Path;

use image::DynamicImage;
use tilepress::grid::{Extents, SpatialReference, XY};
use tilepress::raster::{GeoTransform, Raster, SampleFormat};

use crate::error::CliError;

/// Loads `path` as a [`Raster`] spanning `bounds` (projected units).
///
/// With no bounds given, the raster is assumed to span the whole world, the
/// common case for unprojected imagery fitted to square maps.
///
/// # Errors
///
/// `CliError::Image` when decoding fails, `CliError::Convert` when the
/// buffer does not form a valid raster.
pub fn load_raster(
    path: &Path,
    bounds: Option<[f64; 4]>,
    srs: &SpatialReference,
) -> Result<Raster, CliError> {
    let decoded = image::open(path)?;
    let extents = match bounds {
        Some([left, bottom, right, top]) => {
            Extents::new(XY::new(left, bottom), XY::new(right, top))
        }
        None => srs.world_extents(),
    };

    let (width, height) = (decoded.width(), decoded.height());
    let transform = GeoTransform::from_extents(&extents, width, height);

    let raster = match decoded {
        DynamicImage::ImageLuma8(img) => Raster::new(
            width,
            height,
            1,
            SampleFormat::U8,
            img.into_raw(),
            transform,
            None,
        )?,
        DynamicImage::ImageLuma16(img) => {
            let mut data = Vec::with_capacity(width as usize * height as usize * 2);
            for sample in img.into_raw() {
                data.extend_from_slice(&sample.to_le_bytes());
            }
            Raster::new(width, height, 1, SampleFormat::U16, data, transform, None)?
        }
        DynamicImage::ImageRgb8(img) => Raster::new(
            width,
            height,
            3,
            SampleFormat::U8,
            img.into_raw(),
            transform,
            None,
        )?,
        DynamicImage::ImageRgba8(img) => Raster::from_rgba(img, transform),
        other => Raster::from_rgba(other.to_rgba8(), transform),
    };

    Ok(raster)
}
