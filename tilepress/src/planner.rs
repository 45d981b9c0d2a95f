//! Zoom-range planning.
//!
//! Converts the native ground resolution of the input (and the optional
//! min/max resolution bounds) into the range of zoom levels to render. The
//! range is derived exactly once per run and never recomputed.

use crate::error::ConfigError;
use crate::grid::{SpatialReference, MAX_ZOOM};

/// Inclusive range of zoom levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomRange {
    pub min_zoom: u8,
    pub max_zoom: u8,
}

/// The validated rendering plan for one run.
///
/// `render` holds the grid-true zooms the slicer works at; `offset` is added
/// when tiles are written, shifting the archive's zoom numbering without
/// changing the grid the pixels were cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomPlan {
    render: ZoomRange,
    native_zoom: u8,
    offset: i32,
}

impl ZoomPlan {
    /// Zooms the slicer renders at.
    pub fn render(&self) -> ZoomRange {
        self.render
    }

    /// The zoom whose pixel size matches the input's native resolution.
    pub fn native_zoom(&self) -> u8 {
        self.native_zoom
    }

    /// Offset applied to zoom numbers at archive-write time.
    pub fn offset(&self) -> i32 {
        self.offset
    }

    /// The zoom range as stored in the archive (render range plus offset).
    pub fn storage(&self) -> ZoomRange {
        ZoomRange {
            min_zoom: (i32::from(self.render.min_zoom) + self.offset) as u8,
            max_zoom: (i32::from(self.render.max_zoom) + self.offset) as u8,
        }
    }
}

/// Finds the zoom level whose pixel size matches `resolution` (ground units
/// per pixel).
///
/// Walks down from zoom 0 until the grid's pixel size is within tolerance of
/// the requested resolution. The tolerance starts at 1/128 of the zoom-0
/// pixel size and halves each level, which biases a resolution sitting
/// within floating-point error of a boundary toward the coarser zoom.
///
/// # Errors
///
/// `ConfigError::InvalidResolution` for non-positive (or NaN) input.
pub fn zoom_for_resolution(
    resolution: f64,
    srs: &SpatialReference,
) -> Result<u8, ConfigError> {
    if !(resolution > 0.0) {
        return Err(ConfigError::InvalidResolution(resolution));
    }
    let mut error = srs.pixel_size(0) / 128.0;
    for zoom in 0..=MAX_ZOOM {
        if srs.pixel_size(zoom) - resolution <= error {
            return Ok(zoom);
        }
        error /= 2.0;
    }
    Ok(MAX_ZOOM)
}

/// Derives the [`ZoomPlan`] for a run.
///
/// `min_resolution` bounds downsampling (a larger number, a coarser zoom);
/// `max_resolution` bounds upsampling (a smaller number, a finer zoom).
/// Either side defaulting to `None` pins that bound to the native zoom, so
/// by default nothing is downsampled below or upsampled above the input's
/// own resolution. `zoom_offset` shifts both bounds as stored.
///
/// # Errors
///
/// - `ConfigError::EmptyZoomRange` when the derived bounds cross.
/// - `ConfigError::ZoomBelowZero` when the offset pushes the minimum below 0.
/// - `ConfigError::ZoomAboveMaximum` when the offset pushes the maximum past
///   the supported ceiling.
pub fn plan(
    native_resolution: f64,
    min_resolution: Option<f64>,
    max_resolution: Option<f64>,
    zoom_offset: i32,
    srs: &SpatialReference,
) -> Result<ZoomPlan, ConfigError> {
    let native_zoom = zoom_for_resolution(native_resolution, srs)?;
    let min_zoom = match min_resolution {
        Some(resolution) => zoom_for_resolution(resolution, srs)?,
        None => native_zoom,
    };
    let max_zoom = match max_resolution {
        Some(resolution) => zoom_for_resolution(resolution, srs)?,
        None => native_zoom,
    };

    if min_zoom > max_zoom {
        return Err(ConfigError::EmptyZoomRange { min_zoom, max_zoom });
    }

    let shifted_min = i32::from(min_zoom) + zoom_offset;
    if shifted_min < 0 {
        return Err(ConfigError::ZoomBelowZero(shifted_min));
    }
    let shifted_max = i32::from(max_zoom) + zoom_offset;
    if shifted_max > i32::from(MAX_ZOOM) {
        return Err(ConfigError::ZoomAboveMaximum(shifted_max));
    }

    Ok(ZoomPlan {
        render: ZoomRange { min_zoom, max_zoom },
        native_zoom,
        offset: zoom_offset,
    })
}
