//! Tilepress - raster to tile-pyramid archive conversion
//!
//! This library turns a single georeferenced raster (already decoded and
//! reprojected by an upstream collaborator) into a zoomable pyramid of
//! 256x256 image tiles packaged in a single-file tile-cache archive.
//!
//! # Pipeline
//!
//! ```text
//! Raster ──► planner ──► color ──► canvas ──► pyramid ──► encode ──► archive
//! ```
//!
//! - [`planner`] derives the zoom range from the raster's native resolution.
//! - [`color`] maps raw band values to RGBA when the input is not an image.
//! - [`canvas`] aligns the pixels to the world tile grid.
//! - [`pyramid`] slices the canvas into tiles across the zoom range.
//! - [`encode`] serializes tiles to PNG (optionally palette-quantized) or
//!   JPEG.
//! - [`archive`] packs tiles and metadata into the output file.
//!
//! [`convert::Conversion`] wires the stages together for one run.
//!
//! # Example
//!
//! ```no_run
//! use tilepress::config::{ConvertConfig, TilesetMeta};
//! use tilepress::convert::Conversion;
//! use tilepress::raster::{GeoTransform, Raster};
//! use std::path::Path;
//!
//! let image = image::RgbaImage::new(512, 512);
//! let transform = GeoTransform::new(0.0, 0.0, 305.75, -305.75);
//! let raster = Raster::from_rgba(image, transform);
//!
//! let config = ConvertConfig::new(TilesetMeta::new("my layer"));
//! let report = Conversion::new(raster, config).run(Path::new("layer.tilepack"))?;
//! println!("{} tiles written", report.tiles_written);
//! # Ok::<(), tilepress::error::ConvertError>(())
//! ```

pub mod archive;
pub mod canvas;
pub mod color;
pub mod config;
pub mod convert;
pub mod encode;
pub mod error;
pub mod grid;
pub mod planner;
pub mod pyramid;
pub mod raster;

pub use archive::{ArchiveMetadata, ArchiveReader, ArchiveWriter, LayerType};
pub use config::{ConvertConfig, TilesetMeta};
pub use convert::{Conversion, ConversionReport};
pub use encode::TileFormat;
pub use error::ConvertError;
pub use grid::{SpatialReference, TileCoord, TILE_SIDE};
pub use planner::ZoomRange;
pub use raster::{GeoTransform, Raster, SampleFormat};
