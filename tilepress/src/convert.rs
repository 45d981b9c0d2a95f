//! Run orchestration.
//!
//! A [`Conversion`] is the explicit, run-scoped context for one raster →
//! archive conversion: it owns the raster, the configuration, and (while
//! running) the archive handle and canvas. Nothing here is process-global,
//! so several runs can coexist in one process.
//!
//! The run is driven by a single control thread; pixel loops inside the
//! color mapper may fan out internally, but tiles are emitted in one fixed,
//! deterministic order so identical inputs produce byte-identical archives.

use std::path::Path;

use image::RgbaImage;
use tracing::{debug, info};

use crate::archive::{ArchiveMetadata, ArchiveWriter};
use crate::canvas::WorldCanvas;
use crate::color;
use crate::config::ConvertConfig;
use crate::encode::{self, TileEncoder};
use crate::error::ConvertError;
use crate::grid::{self, SpatialReference, TileCoord, TILE_SIDE};
use crate::planner::{self, ZoomRange};
use crate::pyramid::{SliceError, TilePyramid, TileSink};
use crate::raster::Raster;

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionReport {
    /// Tiles written to the archive (including border tiles).
    pub tiles_written: u64,
    /// Zoom range as stored in the archive.
    pub zoom: ZoomRange,
    /// `[left, bottom, right, top]` bounds in WGS 84 degrees.
    pub bounds: [f64; 4],
}

/// One conversion run.
pub struct Conversion {
    raster: Raster,
    config: ConvertConfig,
}

impl Conversion {
    pub fn new(raster: Raster, config: ConvertConfig) -> Self {
        Self { raster, config }
    }

    /// Runs the full pipeline and writes the archive at `path`.
    ///
    /// Either every planned zoom level is produced and committed, or this
    /// returns an error and the output file must not be treated as an
    /// archive.
    ///
    /// # Errors
    ///
    /// The first failure from any stage, per the crate error taxonomy.
    pub fn run(self, path: &Path) -> Result<ConversionReport, ConvertError> {
        self.config.validate()?;
        let srs = SpatialReference::from_epsg(self.config.spatial_reference)?;

        let pixel_dims = self.raster.transform().pixel_dimensions();
        let native_resolution = pixel_dims.x.min(pixel_dims.y);
        let plan = planner::plan(
            native_resolution,
            self.config.min_resolution,
            self.config.max_resolution,
            self.config.zoom_offset,
            &srs,
        )?;
        info!(
            native_zoom = plan.native_zoom(),
            min_zoom = plan.render().min_zoom,
            max_zoom = plan.render().max_zoom,
            zoom_offset = plan.offset(),
            "planned zoom range"
        );

        let image: RgbaImage = match (self.config.coloring, self.config.color_table()?) {
            (Some(mode), Some(table)) => {
                color::colorize(&self.raster, self.config.colorize_band, &table, mode)?
            }
            _ => self.raster.to_rgba()?,
        };

        let extents = self.raster.extents();
        let canvas = WorldCanvas::build(
            image,
            &extents,
            srs,
            plan.native_zoom(),
            self.config.fill_borders,
        )?;

        // Layer bounds come from the grid-aligned extents, converted to
        // geographic degrees for the metadata table.
        let tiled = grid::tile_extents(&extents, &srs, plan.native_zoom());
        let bounds = srs.bounds_lon_lat(&tiled);

        let writer = ArchiveWriter::create(path)?.with_zoom_offset(plan.offset());
        let encoder = encode::encoder_for(self.config.format, self.config.png8);
        debug!(encoder = encoder.name(), "tile encoder selected");
        let mut sink = EncodingSink::new(writer, encoder);

        let tiles_written = TilePyramid::new(canvas, plan)
            .slice(&mut sink)
            .map_err(|error| match error {
                SliceError::Resource(e) => ConvertError::Resource(e),
                SliceError::Sink(e) => e,
            })?;

        let storage = plan.storage();
        let metadata = ArchiveMetadata {
            name: self.config.metadata.name.clone(),
            description: self.config.metadata.description.clone(),
            layer_type: self.config.metadata.layer_type,
            version: self.config.metadata.version.clone(),
            format: self.config.format,
            bounds: Some(bounds),
            minzoom: storage.min_zoom,
            maxzoom: storage.max_zoom,
        };
        sink.finish(&metadata)?;

        Ok(ConversionReport {
            tiles_written,
            zoom: storage,
            bounds,
        })
    }
}

/// Sink that encodes tiles and streams them into the archive.
///
/// The shared transparent border tile is encoded once and its bytes reused
/// for every border coordinate; the archive's content dedup then collapses
/// them all into a single stored blob.
struct EncodingSink {
    writer: ArchiveWriter,
    encoder: Box<dyn TileEncoder>,
    border: Option<Vec<u8>>,
}

impl EncodingSink {
    fn new(writer: ArchiveWriter, encoder: Box<dyn TileEncoder>) -> Self {
        Self {
            writer,
            encoder,
            border: None,
        }
    }

    fn finish(self, metadata: &ArchiveMetadata) -> Result<(), ConvertError> {
        self.writer.finalize(metadata).map_err(ConvertError::from)
    }
}

impl TileSink for EncodingSink {
    type Error = ConvertError;

    fn save(&mut self, coord: TileCoord, image: &RgbaImage) -> Result<(), ConvertError> {
        let bytes = self.encoder.encode(image)?;
        self.writer.put(coord, &bytes)?;
        Ok(())
    }

    fn save_border(&mut self, coord: TileCoord) -> Result<(), ConvertError> {
        let bytes = match self.border.take() {
            Some(bytes) => bytes,
            None => self
                .encoder
                .encode(&RgbaImage::new(TILE_SIDE, TILE_SIDE))?,
        };
        self.writer.put(coord, &bytes)?;
        self.border = Some(bytes);
        Ok(())
    }
}
