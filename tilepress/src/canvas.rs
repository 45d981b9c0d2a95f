//! Grid-aligned rendering canvas.
//!
//! A [`WorldCanvas`] is an RGBA pixel buffer whose top-left corner sits
//! exactly on a tile boundary of the world grid at some zoom, with both
//! sides whole multiples of 256. The canvas only ever holds the data window
//! of the world: the surrounding world grid stays virtual, and border tiles
//! are synthesized by the slicer from a single shared transparent tile.
//! That keeps the memory footprint proportional to the data, not to
//! `2^zoom`, which is what makes GB-scale inputs workable.

use image::{imageops, RgbaImage};
use tracing::debug;

use crate::error::ResourceError;
use crate::grid::{self, Extents, SpatialReference, TileCoord, TileRange, TILE_SIDE};

/// Tolerated fractional error when checking that aligned extents land on an
/// integral pixel grid.
const PIXEL_EPSILON: f64 = 1e-4;

/// An RGBA canvas aligned to the world tile grid at one zoom level.
#[derive(Debug, Clone)]
pub struct WorldCanvas {
    image: RgbaImage,
    srs: SpatialReference,
    zoom: u8,
    column_offset: u32,
    row_offset: u32,
    fill_borders: bool,
}

impl WorldCanvas {
    /// Aligns `image` (covering `extents`) to the tile grid at `zoom`.
    ///
    /// The image is embedded into a transparent canvas padded out to the
    /// grid-snapped extents, so the result's dimensions are exact multiples
    /// of 256 and its top-left pixel sits on a tile corner.
    ///
    /// # Errors
    ///
    /// - `ResourceError::PixelGridMismatch` when the image's pixel grid
    ///   disagrees with its extents at this zoom's resolution (the upstream
    ///   resampling contract was broken).
    /// - `ResourceError::FractionalCanvas` / `CanvasNotTileAligned` when the
    ///   snapped extents cannot form a whole tile grid.
    pub fn build(
        image: RgbaImage,
        extents: &Extents,
        srs: SpatialReference,
        zoom: u8,
        fill_borders: bool,
    ) -> Result<Self, ResourceError> {
        let pixel = srs.pixel_size(zoom);
        let tiled = grid::tile_extents(extents, &srs, zoom);

        // The input must already be rendered at this zoom's resolution.
        let data_dims = extents.dimensions();
        let expected_width = (data_dims.x / pixel).round() as u32;
        let expected_height = (data_dims.y / pixel).round() as u32;
        if expected_width != image.width() || expected_height != image.height() {
            return Err(ResourceError::PixelGridMismatch {
                width: image.width(),
                height: image.height(),
                expected_width,
                expected_height,
            });
        }

        let tiled_dims = tiled.dimensions();
        let width = tiled_dims.x / pixel;
        let height = tiled_dims.y / pixel;
        if !near_integer(width) || !near_integer(height) {
            return Err(ResourceError::FractionalCanvas { width, height });
        }
        let width = width.round() as u32;
        let height = height.round() as u32;
        if width % TILE_SIDE != 0 || height % TILE_SIDE != 0 {
            return Err(ResourceError::CanvasNotTileAligned {
                width,
                height,
                tile: TILE_SIDE,
            });
        }

        let left = ((extents.lower_left.x - tiled.lower_left.x) / pixel).round() as u32;
        let top = ((tiled.upper_right.y - extents.upper_right.y) / pixel).round() as u32;

        let range = grid::tile_range(&tiled, &srs, zoom);
        debug!(
            zoom,
            width,
            height,
            left,
            top,
            column_offset = range.min_column,
            row_offset = range.min_row,
            "aligned canvas to tile grid"
        );

        let image = if left == 0 && top == 0 && image.width() == width && image.height() == height
        {
            image
        } else {
            let mut canvas = RgbaImage::new(width, height);
            imageops::replace(&mut canvas, &image, i64::from(left), i64::from(top));
            canvas
        };

        Ok(Self {
            image,
            srs,
            zoom,
            column_offset: range.min_column,
            row_offset: range.min_row,
            fill_borders,
        })
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn srs(&self) -> SpatialReference {
        self.srs
    }

    pub fn fill_borders(&self) -> bool {
        self.fill_borders
    }

    /// Tile indices covered by the canvas.
    pub fn tile_range(&self) -> TileRange {
        TileRange {
            zoom: self.zoom,
            min_column: self.column_offset,
            max_column: self.column_offset + self.image.width() / TILE_SIDE,
            min_row: self.row_offset,
            max_row: self.row_offset + self.image.height() / TILE_SIDE,
        }
    }

    /// The world grid at this canvas's zoom.
    pub fn world_range(&self) -> TileRange {
        self.srs.world_range(self.zoom)
    }

    /// Cuts the 256x256 tile at `coord` out of the canvas.
    ///
    /// # Errors
    ///
    /// `ResourceError::TileUnavailable` when `coord` lies outside the
    /// canvas.
    pub fn tile(&self, coord: TileCoord) -> Result<RgbaImage, ResourceError> {
        if coord.zoom != self.zoom || !self.tile_range().contains(coord.column, coord.row) {
            return Err(ResourceError::TileUnavailable(coord));
        }
        let x = (coord.column - self.column_offset) * TILE_SIDE;
        let y = (coord.row - self.row_offset) * TILE_SIDE;
        Ok(imageops::crop_imm(&self.image, x, y, TILE_SIDE, TILE_SIDE).to_image())
    }

    /// Produces the canvas one zoom level coarser by a single 2:1 box-filter
    /// step, re-aligned to the coarser grid.
    ///
    /// When the canvas's tile offset is odd, the shrunk image starts halfway
    /// into a coarser tile and gains 128 px of transparent padding on that
    /// side; both sides are then padded back out to whole tiles.
    pub fn downsample(&self) -> WorldCanvas {
        debug_assert!(self.zoom > 0);
        let shrunk = box_downsample(&self.image);

        let pad_left = (self.column_offset % 2) * (TILE_SIDE / 2);
        let pad_top = (self.row_offset % 2) * (TILE_SIDE / 2);
        let width = (pad_left + shrunk.width()).div_ceil(TILE_SIDE) * TILE_SIDE;
        let height = (pad_top + shrunk.height()).div_ceil(TILE_SIDE) * TILE_SIDE;

        let image = if pad_left == 0
            && pad_top == 0
            && shrunk.width() == width
            && shrunk.height() == height
        {
            shrunk
        } else {
            let mut canvas = RgbaImage::new(width, height);
            imageops::replace(&mut canvas, &shrunk, i64::from(pad_left), i64::from(pad_top));
            canvas
        };

        WorldCanvas {
            image,
            srs: self.srs,
            zoom: self.zoom - 1,
            column_offset: self.column_offset / 2,
            row_offset: self.row_offset / 2,
            fill_borders: self.fill_borders,
        }
    }

    /// Renders this canvas at a finer `zoom` by nearest-neighbour
    /// stretching.
    ///
    /// Always called on the native canvas, never on an upsampled
    /// intermediate, so no level compounds another level's interpolation.
    pub fn upsample_to(&self, zoom: u8) -> WorldCanvas {
        debug_assert!(zoom > self.zoom);
        let scale = 1u32 << (zoom - self.zoom);
        let image = imageops::resize(
            &self.image,
            self.image.width() * scale,
            self.image.height() * scale,
            imageops::FilterType::Nearest,
        );
        WorldCanvas {
            image,
            srs: self.srs,
            zoom,
            column_offset: self.column_offset * scale,
            row_offset: self.row_offset * scale,
            fill_borders: self.fill_borders,
        }
    }
}

fn near_integer(value: f64) -> bool {
    (value - value.round()).abs() <= PIXEL_EPSILON
}

/// Downsamples 2:1 with a box filter: each output pixel is the plain
/// per-channel average of a 2x2 input block. Deterministic by construction.
fn box_downsample(source: &RgbaImage) -> RgbaImage {
    let width = source.width() / 2;
    let height = source.height() / 2;
    let mut output = RgbaImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let p00 = source.get_pixel(x * 2, y * 2);
            let p10 = source.get_pixel(x * 2 + 1, y * 2);
            let p01 = source.get_pixel(x * 2, y * 2 + 1);
            let p11 = source.get_pixel(x * 2 + 1, y * 2 + 1);

            let mut avg = [0u8; 4];
            for (i, slot) in avg.iter_mut().enumerate() {
                let sum = u16::from(p00[i]) + u16::from(p10[i]) + u16::from(p01[i])
                    + u16::from(p11[i]);
                *slot = (sum / 4) as u8;
            }
            output.put_pixel(x, y, image::Rgba(avg));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::XY;
    use image::Rgba;

    fn srs() -> SpatialReference {
        SpatialReference::web_mercator()
    }

    /// Extents of a block of tiles at `zoom`, addressed top-left.
    fn tile_block_extents(zoom: u8, column: u32, row: u32, columns: u32, rows: u32) -> Extents {
        let span = srs().tile_span(zoom);
        let world = srs().world_extents();
        let left = world.lower_left.x + f64::from(column) * span;
        let top = world.upper_right.y - f64::from(row) * span;
        Extents::new(
            XY::new(left, top - f64::from(rows) * span),
            XY::new(left + f64::from(columns) * span, top),
        )
    }

    fn solid(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(color))
    }

    #[test]
    fn test_build_aligned_image_passes_through() {
        let extents = tile_block_extents(3, 2, 1, 2, 2);
        let image = solid(512, 512, [10, 20, 30, 255]);
        let canvas = WorldCanvas::build(image, &extents, srs(), 3, true).unwrap();

        assert_eq!(canvas.image().width(), 512);
        assert_eq!(canvas.image().height(), 512);
        let range = canvas.tile_range();
        assert_eq!(range.min_column, 2);
        assert_eq!(range.min_row, 1);
        assert_eq!(range.columns(), 2);
        assert_eq!(range.rows(), 2);
    }

    #[test]
    fn test_build_pads_partial_tile_coverage() {
        // Data covering the center quarter of one zoom-3 tile.
        let span = srs().tile_span(3);
        let block = tile_block_extents(3, 4, 4, 1, 1);
        let extents = Extents::new(
            XY::new(block.lower_left.x + span / 4.0, block.lower_left.y + span / 4.0),
            XY::new(block.upper_right.x - span / 4.0, block.upper_right.y - span / 4.0),
        );
        let image = solid(128, 128, [255, 0, 0, 255]);
        let canvas = WorldCanvas::build(image, &extents, srs(), 3, true).unwrap();

        assert_eq!(canvas.image().width(), 256);
        assert_eq!(canvas.image().height(), 256);
        // Center holds data, corners are transparent padding.
        assert_eq!(canvas.image().get_pixel(128, 128).0, [255, 0, 0, 255]);
        assert_eq!(canvas.image().get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(canvas.image().get_pixel(255, 255).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_build_rejects_wrong_pixel_grid() {
        // A 100x100 image claiming to span a whole 256 px tile.
        let extents = tile_block_extents(2, 0, 0, 1, 1);
        let image = solid(100, 100, [0, 0, 0, 255]);
        let result = WorldCanvas::build(image, &extents, srs(), 2, true);
        assert!(matches!(
            result,
            Err(ResourceError::PixelGridMismatch { width: 100, .. })
        ));
    }

    #[test]
    fn test_tile_extraction_round_trip() {
        let extents = tile_block_extents(2, 1, 1, 2, 1);
        let mut image = RgbaImage::new(512, 256);
        for (x, _, pixel) in image.enumerate_pixels_mut() {
            *pixel = if x < 256 {
                Rgba([1, 1, 1, 255])
            } else {
                Rgba([2, 2, 2, 255])
            };
        }
        let canvas = WorldCanvas::build(image, &extents, srs(), 2, true).unwrap();

        let left = canvas.tile(TileCoord::new(2, 1, 1)).unwrap();
        let right = canvas.tile(TileCoord::new(2, 2, 1)).unwrap();
        assert_eq!(left.get_pixel(0, 0).0, [1, 1, 1, 255]);
        assert_eq!(right.get_pixel(0, 0).0, [2, 2, 2, 255]);
    }

    #[test]
    fn test_tile_outside_canvas_unavailable() {
        let extents = tile_block_extents(2, 1, 1, 1, 1);
        let canvas =
            WorldCanvas::build(solid(256, 256, [0; 4]), &extents, srs(), 2, true).unwrap();
        let result = canvas.tile(TileCoord::new(2, 0, 0));
        assert!(matches!(result, Err(ResourceError::TileUnavailable(_))));
    }

    #[test]
    fn test_downsample_even_offset() {
        let extents = tile_block_extents(3, 2, 2, 2, 2);
        let canvas =
            WorldCanvas::build(solid(512, 512, [100, 100, 100, 255]), &extents, srs(), 3, true)
                .unwrap();
        let coarse = canvas.downsample();

        assert_eq!(coarse.zoom(), 2);
        assert_eq!(coarse.image().width(), 256);
        assert_eq!(coarse.image().height(), 256);
        assert_eq!(coarse.tile_range().min_column, 1);
        assert_eq!(coarse.tile_range().min_row, 1);
        assert_eq!(coarse.image().get_pixel(128, 128).0, [100, 100, 100, 255]);
    }

    #[test]
    fn test_downsample_odd_offset_gains_half_tile_padding() {
        let extents = tile_block_extents(3, 1, 1, 2, 2);
        let canvas =
            WorldCanvas::build(solid(512, 512, [50, 50, 50, 255]), &extents, srs(), 3, true)
                .unwrap();
        let coarse = canvas.downsample();

        assert_eq!(coarse.zoom(), 2);
        // Odd offset: data starts 128 px into coarser tile (0, 0).
        assert_eq!(coarse.tile_range().min_column, 0);
        assert_eq!(coarse.tile_range().min_row, 0);
        assert_eq!(coarse.image().width(), 512);
        assert_eq!(coarse.image().height(), 512);
        assert_eq!(coarse.image().get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(coarse.image().get_pixel(128, 128).0, [50, 50, 50, 255]);
    }

    #[test]
    fn test_box_downsample_averages_blocks() {
        let mut image = RgbaImage::new(2, 2);
        image.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([100, 0, 0, 255]));
        image.put_pixel(0, 1, Rgba([0, 100, 0, 255]));
        image.put_pixel(1, 1, Rgba([0, 0, 100, 255]));
        let out = box_downsample(&image);
        assert_eq!(out.get_pixel(0, 0).0, [25, 25, 25, 255]);
    }

    #[test]
    fn test_upsample_doubles_dimensions_and_offsets() {
        let extents = tile_block_extents(2, 1, 1, 1, 1);
        let canvas =
            WorldCanvas::build(solid(256, 256, [7, 7, 7, 255]), &extents, srs(), 2, true)
                .unwrap();
        let fine = canvas.upsample_to(4);

        assert_eq!(fine.zoom(), 4);
        assert_eq!(fine.image().width(), 1024);
        assert_eq!(fine.tile_range().min_column, 4);
        assert_eq!(fine.tile_range().min_row, 4);
        // Nearest neighbour keeps pixel values exact.
        assert_eq!(fine.image().get_pixel(1000, 3).0, [7, 7, 7, 255]);
    }

    #[test]
    fn test_whole_world_canvas_covers_world_range() {
        let world = srs().world_extents();
        let canvas =
            WorldCanvas::build(solid(1024, 1024, [1, 2, 3, 255]), &world, srs(), 2, true)
                .unwrap();
        assert_eq!(canvas.tile_range(), canvas.world_range());
    }
}
