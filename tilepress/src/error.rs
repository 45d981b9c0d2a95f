//! Error taxonomy for a conversion run.
//!
//! Four families, detected at different pipeline stages:
//!
//! - [`ConfigError`] — contradictory or invalid configuration, raised before
//!   any tile is produced.
//! - [`ResourceError`] — a canvas region or tile buffer could not be
//!   materialized; fatal and never retried, the same inputs would fail the
//!   same way.
//! - [`EncodeError`] — a malformed pixel buffer reached the encoder; an
//!   internal invariant violation.
//! - [`crate::archive::ArchiveError`] — the archive could not be created or
//!   written; the run aborts and the output file is not usable.
//!
//! Nothing is swallowed: every failure propagates to the caller through
//! [`ConvertError`] and halts the run. There is no partial-success mode.

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::grid::TileCoord;

/// Invalid or contradictory run configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The EPSG code does not describe the square world grid this pipeline
    /// slices against.
    #[error("unsupported spatial reference: EPSG:{0}")]
    UnsupportedSpatialReference(u32),

    /// A resolution bound must be a positive number of ground units per
    /// pixel.
    #[error("resolution {0} must be greater than 0")]
    InvalidResolution(f64),

    /// The derived zoom range came out empty.
    #[error("zoom range is empty: min zoom {min_zoom} exceeds max zoom {max_zoom}")]
    EmptyZoomRange { min_zoom: u8, max_zoom: u8 },

    /// The zoom offset pushed the minimum zoom below zero.
    #[error("zoom offset pushes min zoom to {0}, below 0")]
    ZoomBelowZero(i32),

    /// The zoom offset pushed the maximum zoom past the supported ceiling.
    #[error("zoom offset pushes max zoom to {0}, above the supported maximum")]
    ZoomAboveMaximum(i32),

    /// Gradient/palette/exact coloring was requested with no color entries.
    #[error("color table is empty")]
    EmptyColorTable,

    /// A coloring mode was configured without any colors, or colors without
    /// a mode.
    #[error("colors and coloring mode must be provided together")]
    IncompleteColoring,

    /// The colorize band does not exist in the source raster.
    #[error("band {band} out of range: raster has {bands} band(s)")]
    BandOutOfRange { band: u8, bands: u8 },

    /// A color value could not be parsed or is not usable in a table.
    #[error("invalid color: {0}")]
    InvalidColor(String),

    /// png8 palette size outside [2, 256].
    #[error("png8 palette size {0} must be between 2 and 256")]
    InvalidPaletteSize(u16),

    /// png8 quantization only applies to PNG output.
    #[error("png8 requires the png tile format")]
    Png8WithJpeg,

    /// The raster's band layout cannot enter the pipeline.
    #[error("cannot handle a raster with {0} band(s); expected 1, 3 or 4")]
    UnsupportedBands(u8),
}

/// A canvas region or tile buffer could not be materialized.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
    /// The aligned canvas does not sit on the tile grid.
    #[error("canvas {width}×{height} is not a whole number of {tile} px tiles")]
    CanvasNotTileAligned { width: u32, height: u32, tile: u32 },

    /// Grid-aligned extents did not land on an integral pixel grid.
    #[error("aligned extents span {width}×{height} px, not an integral pixel grid")]
    FractionalCanvas { width: f64, height: f64 },

    /// The raster's pixel grid disagrees with its extents at the native
    /// resolution; the upstream reprojection contract was not honored.
    #[error(
        "raster is {width}×{height} px but its extents span \
         {expected_width}×{expected_height} px at the native resolution"
    )]
    PixelGridMismatch {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    /// A tile buffer fell outside the rendered canvas; the input was
    /// truncated or inconsistent.
    #[error("tile {0} cannot be materialized from the canvas")]
    TileUnavailable(TileCoord),

    /// A pixel buffer had the wrong byte length for its dimensions.
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
}

/// A malformed pixel buffer reached the tile encoder.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Buffer length is inconsistent with the declared channel count.
    #[error("encoder given {actual} bytes for a buffer needing {expected}")]
    ChannelMismatch { expected: usize, actual: usize },

    /// The underlying codec rejected the buffer.
    #[error("codec failure: {0}")]
    Codec(String),
}

/// Any failure that aborts a conversion run.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::EmptyZoomRange {
            min_zoom: 9,
            max_zoom: 4,
        };
        assert_eq!(
            err.to_string(),
            "zoom range is empty: min zoom 9 exceeds max zoom 4"
        );
    }

    #[test]
    fn test_resource_error_display_tile() {
        let err = ResourceError::TileUnavailable(TileCoord::new(3, 1, 2));
        assert!(err.to_string().contains("z3"));
        assert!(err.to_string().contains("(1, 2)"));
    }

    #[test]
    fn test_convert_error_from_config() {
        let err: ConvertError = ConfigError::EmptyColorTable.into();
        assert!(matches!(err, ConvertError::Config(_)));
        assert!(err.to_string().contains("configuration error"));
    }
}
