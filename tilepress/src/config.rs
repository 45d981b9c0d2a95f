//! Run configuration surface.
//!
//! [`ConvertConfig`] collects everything the outer layer (CLI or embedding
//! application) decides about a conversion. Validation happens up front,
//! before any tile is produced, so contradictory settings fail fast with a
//! `ConfigError`.

use crate::archive::LayerType;
use crate::color::{ColorTable, Coloring, Rgba};
use crate::encode::TileFormat;
use crate::error::ConfigError;
use crate::grid::{SpatialReference, EPSG_WEB_MERCATOR};

/// Descriptive tileset metadata supplied by the caller.
///
/// Bounds and the zoom range are filled in by the pipeline itself once they
/// are known.
#[derive(Debug, Clone)]
pub struct TilesetMeta {
    pub name: String,
    pub description: String,
    pub layer_type: LayerType,
    pub version: String,
}

impl TilesetMeta {
    /// Creates metadata with the defaults the original tooling used: an
    /// empty description, overlay layer type, version "1.0.0".
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            layer_type: LayerType::Overlay,
            version: "1.0.0".to_string(),
        }
    }
}

/// Full configuration for one conversion run.
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// Destination EPSG code. The raster must already be reprojected into
    /// this reference.
    pub spatial_reference: u32,

    /// Resampling algorithm name, consumed by the upstream warp step. Held
    /// here so the configuration surface is complete; the core never reads
    /// it.
    pub resampling: String,

    /// Coarsest resolution to downsample to (ground units per pixel).
    /// `None` means do not downsample below native.
    pub min_resolution: Option<f64>,

    /// Finest resolution to upsample to (ground units per pixel). `None`
    /// means do not upsample above native.
    pub max_resolution: Option<f64>,

    /// Fill the world grid around the data with empty tiles.
    pub fill_borders: bool,

    /// Offset added to zoom numbers as stored in the archive.
    pub zoom_offset: i32,

    /// Color mapping strategy; `None` leaves RGB(A) input untouched.
    pub coloring: Option<Coloring>,

    /// `(band value, color)` table entries, required with `coloring`.
    pub colors: Vec<(f64, Rgba)>,

    /// 1-based band to colorize.
    pub colorize_band: u8,

    /// Tile image format.
    pub format: TileFormat,

    /// Optional png8 palette size in `[2, 256]`.
    pub png8: Option<u16>,

    /// Tileset metadata.
    pub metadata: TilesetMeta,
}

impl ConvertConfig {
    pub fn new(metadata: TilesetMeta) -> Self {
        Self {
            spatial_reference: EPSG_WEB_MERCATOR,
            resampling: "near".to_string(),
            min_resolution: None,
            max_resolution: None,
            fill_borders: true,
            zoom_offset: 0,
            coloring: None,
            colors: Vec::new(),
            colorize_band: 1,
            format: TileFormat::Png,
            png8: None,
            metadata,
        }
    }

    pub fn with_spatial_reference(mut self, epsg: u32) -> Self {
        self.spatial_reference = epsg;
        self
    }

    pub fn with_resolutions(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_resolution = min;
        self.max_resolution = max;
        self
    }

    pub fn with_fill_borders(mut self, fill: bool) -> Self {
        self.fill_borders = fill;
        self
    }

    pub fn with_zoom_offset(mut self, offset: i32) -> Self {
        self.zoom_offset = offset;
        self
    }

    pub fn with_coloring(mut self, mode: Coloring, colors: Vec<(f64, Rgba)>) -> Self {
        self.coloring = Some(mode);
        self.colors = colors;
        self
    }

    pub fn with_colorize_band(mut self, band: u8) -> Self {
        self.colorize_band = band;
        self
    }

    pub fn with_format(mut self, format: TileFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_png8(mut self, palette_size: u16) -> Self {
        self.png8 = Some(palette_size);
        self
    }

    /// Checks the configuration for contradictions.
    ///
    /// # Errors
    ///
    /// The first `ConfigError` found; nothing has been rendered yet when
    /// this fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        SpatialReference::from_epsg(self.spatial_reference)?;

        for resolution in [self.min_resolution, self.max_resolution].into_iter().flatten() {
            if !(resolution > 0.0) {
                return Err(ConfigError::InvalidResolution(resolution));
            }
        }

        if self.coloring.is_some() != !self.colors.is_empty() {
            return Err(ConfigError::IncompleteColoring);
        }

        if let Some(size) = self.png8 {
            if !(2..=256).contains(&size) {
                return Err(ConfigError::InvalidPaletteSize(size));
            }
            if self.format == TileFormat::Jpg {
                return Err(ConfigError::Png8WithJpeg);
            }
        }

        Ok(())
    }

    /// Builds the color table when coloring is configured.
    ///
    /// # Errors
    ///
    /// Propagates table construction failures (empty table, non-finite band
    /// values).
    pub fn color_table(&self) -> Result<Option<ColorTable>, ConfigError> {
        match self.coloring {
            Some(_) => Ok(Some(ColorTable::from_entries(self.colors.clone())?)),
            None => Ok(None),
        }
    }
}
