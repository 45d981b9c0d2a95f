//! Tile-grid arithmetic for a square world projection.
//!
//! Provides the geometry vocabulary shared by the whole pipeline: projected
//! extents, per-zoom pixel and tile sizes, snapping of dataset extents to the
//! tile grid, and tile index ranges.
//!
//! Tile indices use the slicer convention throughout this crate: `(0, 0)` is
//! the north-west corner of the world, rows increase southward. The archive
//! layer flips rows to its bottom-left origin on write.

use std::f64::consts::PI;

use crate::error::ConfigError;

/// Tile edge length in pixels. Fixed by the tiling scheme, not configurable.
pub const TILE_SIDE: u32 = 256;

/// Upper bound on zoom levels accepted anywhere in the pipeline.
pub const MAX_ZOOM: u8 = 30;

/// EPSG code for Web Mercator, the default spatial reference.
pub const EPSG_WEB_MERCATOR: u32 = 3857;

/// WGS 84 semi-major axis in metres, the radius of the Web Mercator sphere.
const WGS84_SEMI_MAJOR: f64 = 6_378_137.0;

/// Snapping tolerance when deciding whether a value, measured in tile units,
/// already sits on a grid boundary.
const GRID_EPSILON: f64 = 1e-6;

/// A point or vector in projected coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XY {
    pub x: f64,
    pub y: f64,
}

impl XY {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl std::ops::Add for XY {
    type Output = XY;

    fn add(self, other: XY) -> XY {
        XY::new(self.x + other.x, self.y + other.y)
    }
}

impl std::ops::Sub for XY {
    type Output = XY;

    fn sub(self, other: XY) -> XY {
        XY::new(self.x - other.x, self.y - other.y)
    }
}

/// Axis-aligned extents in projected coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extents {
    pub lower_left: XY,
    pub upper_right: XY,
}

impl Extents {
    pub fn new(lower_left: XY, upper_right: XY) -> Self {
        Self {
            lower_left,
            upper_right,
        }
    }

    /// Width and height of the extents.
    pub fn dimensions(&self) -> XY {
        self.upper_right - self.lower_left
    }

    /// Returns true when both corners match `other` within `delta`.
    pub fn almost_equal(&self, other: &Extents, delta: f64) -> bool {
        (self.lower_left.x - other.lower_left.x).abs() <= delta
            && (self.lower_left.y - other.lower_left.y).abs() <= delta
            && (self.upper_right.x - other.upper_right.x).abs() <= delta
            && (self.upper_right.y - other.upper_right.y).abs() <= delta
    }
}

/// Address of a single tile in the slicer convention (row 0 at the top).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub zoom: u8,
    pub column: u32,
    pub row: u32,
}

impl TileCoord {
    pub fn new(zoom: u8, column: u32, row: u32) -> Self {
        Self { zoom, column, row }
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "z{} ({}, {})", self.zoom, self.column, self.row)
    }
}

/// Half-open rectangle of tile indices at one zoom level.
///
/// `min_*` are inclusive, `max_*` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub min_column: u32,
    pub max_column: u32,
    pub min_row: u32,
    pub max_row: u32,
}

impl TileRange {
    /// Number of tile columns covered by the range.
    pub fn columns(&self) -> u32 {
        self.max_column - self.min_column
    }

    /// Number of tile rows covered by the range.
    pub fn rows(&self) -> u32 {
        self.max_row - self.min_row
    }

    /// Total number of tiles in the range.
    pub fn count(&self) -> u64 {
        u64::from(self.columns()) * u64::from(self.rows())
    }

    /// Returns true if `(column, row)` lies inside the range.
    pub fn contains(&self, column: u32, row: u32) -> bool {
        (self.min_column..self.max_column).contains(&column)
            && (self.min_row..self.max_row).contains(&row)
    }

    /// Iterates over the tiles of `world` that lie outside `self`, in
    /// row-major order.
    ///
    /// Used to enumerate the empty border tiles when filling the world grid
    /// around a partial-coverage dataset.
    pub fn border_tiles(&self, world: &TileRange) -> BorderTiles {
        debug_assert_eq!(self.zoom, world.zoom);
        BorderTiles {
            data: *self,
            world: *world,
            column: world.min_column,
            row: world.min_row,
        }
    }
}

/// Iterator over world tiles outside the data range. See
/// [`TileRange::border_tiles`].
pub struct BorderTiles {
    data: TileRange,
    world: TileRange,
    column: u32,
    row: u32,
}

impl Iterator for BorderTiles {
    type Item = TileCoord;

    fn next(&mut self) -> Option<TileCoord> {
        while self.row < self.world.max_row {
            while self.column < self.world.max_column {
                let column = self.column;
                self.column += 1;
                if !self.data.contains(column, self.row) {
                    return Some(TileCoord::new(self.world.zoom, column, self.row));
                }
            }
            self.column = self.world.min_column;
            self.row += 1;
        }
        None
    }
}

/// The projected coordinate system the tile grid lives in.
///
/// Only square-world references are supported; reprojection happens upstream
/// of this crate, so EPSG:3857 (and its deprecated aliases) is the grid this
/// pipeline slices against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialReference {
    epsg: u32,
}

impl SpatialReference {
    /// Web Mercator, the default.
    pub fn web_mercator() -> Self {
        Self {
            epsg: EPSG_WEB_MERCATOR,
        }
    }

    /// Builds a spatial reference from an EPSG code.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnsupportedSpatialReference` for codes that do
    /// not describe the square Web Mercator world grid.
    pub fn from_epsg(code: u32) -> Result<Self, ConfigError> {
        match code {
            // 3785 and 900913 are deprecated aliases of 3857.
            3857 | 3785 | 900_913 => Ok(Self { epsg: code }),
            other => Err(ConfigError::UnsupportedSpatialReference(other)),
        }
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    /// Full-world extents in projected metres.
    pub fn world_extents(&self) -> Extents {
        let half = PI * WGS84_SEMI_MAJOR;
        Extents::new(XY::new(-half, -half), XY::new(half, half))
    }

    /// Side length of the square world in projected metres.
    pub fn world_size(&self) -> f64 {
        2.0 * PI * WGS84_SEMI_MAJOR
    }

    /// Ground units covered by one pixel at `zoom`.
    pub fn pixel_size(&self, zoom: u8) -> f64 {
        self.world_size() / (f64::from(TILE_SIDE) * f64::from(self.tiles_across(zoom)))
    }

    /// Ground units covered by one tile at `zoom`.
    pub fn tile_span(&self, zoom: u8) -> f64 {
        self.world_size() / f64::from(self.tiles_across(zoom))
    }

    /// Number of tiles along each world axis at `zoom`.
    pub fn tiles_across(&self, zoom: u8) -> u32 {
        debug_assert!(zoom <= MAX_ZOOM);
        1u32 << zoom
    }

    /// Tile range covering the whole world at `zoom`.
    pub fn world_range(&self, zoom: u8) -> TileRange {
        let tiles = self.tiles_across(zoom);
        TileRange {
            zoom,
            min_column: 0,
            max_column: tiles,
            min_row: 0,
            max_row: tiles,
        }
    }

    /// Converts a projected point to (longitude, latitude) degrees.
    pub fn to_lon_lat(&self, point: XY) -> (f64, f64) {
        let lon = point.x / WGS84_SEMI_MAJOR * 180.0 / PI;
        let lat = ((point.y / WGS84_SEMI_MAJOR).exp().atan() * 2.0 - PI / 2.0) * 180.0 / PI;
        (lon, lat)
    }

    /// Converts projected extents to `[left, bottom, right, top]` degrees,
    /// the order layer metadata expects.
    pub fn bounds_lon_lat(&self, extents: &Extents) -> [f64; 4] {
        let (left, bottom) = self.to_lon_lat(extents.lower_left);
        let (right, top) = self.to_lon_lat(extents.upper_right);
        [left, bottom, right, top]
    }
}

/// Snaps `extents` outward to the tile grid at `zoom`.
///
/// An edge that already sits within one pixel of a grid boundary is treated
/// as rounding noise and snapped inward instead of growing a whole extra
/// tile. The result is clamped to the world.
pub fn tile_extents(extents: &Extents, srs: &SpatialReference, zoom: u8) -> Extents {
    let span = srs.tile_span(zoom);
    let pixel = srs.pixel_size(zoom);
    let world = srs.world_extents();

    // Work in offset space so modular arithmetic starts at a tile corner.
    let mut left = extents.lower_left.x - world.lower_left.x;
    let mut bottom = extents.lower_left.y - world.lower_left.y;
    let mut right = extents.upper_right.x - world.lower_left.x;
    let mut top = extents.upper_right.y - world.lower_left.y;

    let offset = left.rem_euclid(span);
    if offset <= span - pixel {
        left -= offset;
    } else {
        left += span - offset;
    }

    let offset = (-right).rem_euclid(span);
    if offset <= span - pixel {
        right += offset;
    } else {
        right -= span - offset;
    }

    let offset = bottom.rem_euclid(span);
    if offset <= span - pixel {
        bottom -= offset;
    } else {
        bottom += span - offset;
    }

    let offset = (-top).rem_euclid(span);
    if offset <= span - pixel {
        top += offset;
    } else {
        top -= span - offset;
    }

    let left = (left + world.lower_left.x).max(world.lower_left.x);
    let bottom = (bottom + world.lower_left.y).max(world.lower_left.y);
    let right = (right + world.lower_left.x).min(world.upper_right.x);
    let top = (top + world.lower_left.y).min(world.upper_right.y);

    Extents::new(XY::new(left, bottom), XY::new(right, top))
}

/// Tile index range covered by grid-aligned `extents` at `zoom`.
///
/// Rows are counted from the top of the world. Callers must pass extents
/// already snapped by [`tile_extents`]; boundaries within [`GRID_EPSILON`]
/// tile units of an integer are treated as exact.
pub fn tile_range(extents: &Extents, srs: &SpatialReference, zoom: u8) -> TileRange {
    let span = srs.tile_span(zoom);
    let world = srs.world_extents();
    let tiles = srs.tiles_across(zoom);

    let min_column = grid_floor((extents.lower_left.x - world.lower_left.x) / span);
    let max_column = grid_ceil((extents.upper_right.x - world.lower_left.x) / span);
    let min_row = grid_floor((world.upper_right.y - extents.upper_right.y) / span);
    let max_row = grid_ceil((world.upper_right.y - extents.lower_left.y) / span);

    TileRange {
        zoom,
        min_column: min_column.clamp(0, i64::from(tiles)) as u32,
        max_column: max_column.clamp(0, i64::from(tiles)) as u32,
        min_row: min_row.clamp(0, i64::from(tiles)) as u32,
        max_row: max_row.clamp(0, i64::from(tiles)) as u32,
    }
}

fn grid_floor(value: f64) -> i64 {
    let rounded = value.round();
    if (value - rounded).abs() < GRID_EPSILON {
        rounded as i64
    } else {
        value.floor() as i64
    }
}

fn grid_ceil(value: f64) -> i64 {
    let rounded = value.round();
    if (value - rounded).abs() < GRID_EPSILON {
        rounded as i64
    } else {
        value.ceil() as i64
    }
}
