//! Command-line argument surface.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use tilepress::color::{Coloring, Rgba};
use tilepress::{LayerType, TileFormat};

/// Converts a reprojected raster into a tile-pyramid archive.
#[derive(Debug, Parser)]
#[command(name = "tilepress", about)]
pub struct Args {
    /// Input raster (PNG or TIFF), already reprojected to the destination
    /// spatial reference.
    pub input: PathBuf,

    /// Output archive. Defaults to INPUT with a .tilepack extension.
    pub output: Option<PathBuf>,

    /// Human-readable name of the tileset. Defaults to the input filename.
    #[arg(long)]
    pub name: Option<String>,

    /// Description of the layer.
    #[arg(long, default_value = "")]
    pub description: String,

    /// Type of layer.
    #[arg(long, value_enum, default_value_t = LayerTypeArg::Overlay)]
    pub layer_type: LayerTypeArg,

    /// Version of the tileset.
    #[arg(long, default_value = "1.0.0")]
    pub version: String,

    /// Tile image format.
    #[arg(long, value_enum, default_value_t = FormatArg::Png)]
    pub format: FormatArg,

    /// Destination EPSG spatial reference.
    #[arg(long, default_value_t = 3857)]
    pub spatial_reference: u32,

    /// Resampling algorithm used by the upstream warp step.
    #[arg(long, default_value = "near")]
    pub resampling: String,

    /// Projected extents of the raster as LEFT,BOTTOM,RIGHT,TOP in the
    /// destination reference's units. Defaults to the whole world.
    #[arg(long, value_name = "LEFT,BOTTOM,RIGHT,TOP", value_parser = parse_bounds, allow_hyphen_values = true)]
    pub bounds: Option<Bounds>,

    /// Coarsest resolution (ground units per pixel) to downsample to.
    /// Default: do not downsample.
    #[arg(long)]
    pub min_resolution: Option<f64>,

    /// Finest resolution (ground units per pixel) to upsample to.
    /// Default: do not upsample.
    #[arg(long)]
    pub max_resolution: Option<f64>,

    /// Fill image to whole world with empty tiles. Default.
    #[arg(long, overrides_with = "no_fill_borders")]
    pub fill_borders: bool,

    /// Do not add borders to fill image.
    #[arg(long, overrides_with = "fill_borders")]
    pub no_fill_borders: bool,

    /// Offset zoom level by N to fit unprojected images to square maps.
    #[arg(long, value_name = "N", default_value_t = 0, allow_hyphen_values = true)]
    pub zoom_offset: i32,

    /// Coloring algorithm.
    #[arg(long, value_enum)]
    pub coloring: Option<ColoringArg>,

    /// Color table entry. Examples: --color="0:#ff00ff" --color=255:#ff0000
    #[arg(long = "color", value_name = "BAND-VALUE:HEX-COLOR", value_parser = parse_color_entry)]
    pub colors: Vec<ColorEntry>,

    /// Raster band to colorize. Defaults to 1.
    #[arg(long, value_name = "COLORIZE-BAND")]
    pub colorize_band: Option<u8>,

    /// Quantize PNG tiles to an indexed palette of N colors (2-256).
    #[arg(long, value_name = "N")]
    pub png8: Option<u16>,

    /// Explain what is being done (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Whether border filling is enabled after resolving the flag pair.
    pub fn fill_borders(&self) -> bool {
        !self.no_fill_borders
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayerTypeArg {
    Overlay,
    Baselayer,
}

impl From<LayerTypeArg> for LayerType {
    fn from(arg: LayerTypeArg) -> Self {
        match arg {
            LayerTypeArg::Overlay => LayerType::Overlay,
            LayerTypeArg::Baselayer => LayerType::Baselayer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Png,
    Jpg,
}

impl From<FormatArg> for TileFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Png => TileFormat::Png,
            FormatArg::Jpg => TileFormat::Jpg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColoringArg {
    Exact,
    Palette,
    Gradient,
}

impl From<ColoringArg> for Coloring {
    fn from(arg: ColoringArg) -> Self {
        match arg {
            ColoringArg::Exact => Coloring::Exact,
            ColoringArg::Palette => Coloring::Palette,
            ColoringArg::Gradient => Coloring::Gradient,
        }
    }
}

/// One `--color` entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorEntry {
    pub value: f64,
    pub color: Rgba,
}

fn parse_color_entry(text: &str) -> Result<ColorEntry, String> {
    let (value, color) = text
        .split_once(':')
        .ok_or_else(|| format!("'{text}' must be in format: BAND-VALUE:HEX-COLOR"))?;
    let value: f64 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a valid number"))?;
    let color = Rgba::from_hex(color).map_err(|e| e.to_string())?;
    Ok(ColorEntry { value, color })
}

/// Projected extents parsed from `--bounds`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds(pub [f64; 4]);

fn parse_bounds(text: &str) -> Result<Bounds, String> {
    let parts: Vec<&str> = text.split(',').collect();
    if parts.len() != 4 {
        return Err(format!("'{text}' must be LEFT,BOTTOM,RIGHT,TOP"));
    }
    let mut bounds = [0f64; 4];
    for (slot, part) in bounds.iter_mut().zip(parts.iter()) {
        *slot = part
            .trim()
            .parse()
            .map_err(|_| format!("'{part}' is not a valid number"))?;
    }
    if bounds[0] >= bounds[2] || bounds[1] >= bounds[3] {
        return Err(format!("'{text}' does not describe a non-empty box"));
    }
    Ok(Bounds(bounds))
}
