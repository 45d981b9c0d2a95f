//! Quad-tree pyramid slicing.
//!
//! [`TilePyramid`] walks the zoom range of a plan and cuts each rendered
//! canvas into 256x256 tiles, handing them to a [`TileSink`]. The per-zoom
//! strategy is resolved once from the plan, never per tile:
//!
//! - the native zoom is sliced straight off the aligned canvas;
//! - zooms below native come from repeated 2:1 box-filter steps, each level
//!   derived from the immediately finer one so no tile is ever more than one
//!   downsampling removed from its source;
//! - zooms above native are stretched from the native canvas itself, never
//!   from an upsampled intermediate.
//!
//! Tiles are emitted in a fixed total order — native zoom, then descending
//! downsampled zooms, then ascending upsampled zooms; within a zoom, border
//! tiles first, then data tiles, row-major — so the archive is
//! byte-reproducible for identical inputs.

use image::RgbaImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::canvas::WorldCanvas;
use crate::error::ResourceError;
use crate::grid::TileCoord;
use crate::planner::ZoomPlan;

/// Receives sliced tiles.
///
/// `save` gets every tile cut from the canvas; `save_border` gets the
/// world-grid tiles outside the data extent when border filling is on, so
/// implementations can reuse one shared transparent tile instead of
/// re-encoding it thousands of times.
pub trait TileSink {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Store a rendered tile.
    fn save(&mut self, coord: TileCoord, image: &RgbaImage) -> Result<(), Self::Error>;

    /// Store an empty (fully transparent) border tile.
    fn save_border(&mut self, coord: TileCoord) -> Result<(), Self::Error>;
}

/// Failure while slicing a pyramid.
#[derive(Debug, Error)]
pub enum SliceError<E>
where
    E: std::error::Error + 'static,
{
    /// A tile or canvas level could not be materialized. Fatal for the run;
    /// retrying would fail identically.
    #[error("{0}")]
    Resource(#[from] ResourceError),

    /// The sink rejected a tile.
    #[error("tile sink: {0}")]
    Sink(E),
}

/// Slices one aligned canvas into the planned pyramid of tiles.
#[derive(Debug)]
pub struct TilePyramid {
    canvas: WorldCanvas,
    plan: ZoomPlan,
}

impl TilePyramid {
    /// # Arguments
    ///
    /// * `canvas` - The grid-aligned canvas at the plan's native zoom.
    /// * `plan` - The zoom plan derived for this run.
    pub fn new(canvas: WorldCanvas, plan: ZoomPlan) -> Self {
        debug_assert_eq!(canvas.zoom(), plan.native_zoom());
        Self { canvas, plan }
    }

    /// Runs the full slice, returning the number of tiles emitted.
    ///
    /// # Errors
    ///
    /// Propagates the first sink or materialization failure; nothing is
    /// retried and the run is considered aborted.
    pub fn slice<S: TileSink>(self, sink: &mut S) -> Result<u64, SliceError<S::Error>> {
        let render = self.plan.render();
        let native = self.plan.native_zoom();
        let mut emitted = 0u64;

        info!(
            min_zoom = render.min_zoom,
            max_zoom = render.max_zoom,
            native,
            "slicing tiles"
        );

        if render.min_zoom <= native && native <= render.max_zoom {
            emitted += slice_level(&self.canvas, sink)?;
        }

        if render.min_zoom < native {
            // Step down one level at a time; slice only once inside the
            // requested range (the range may sit strictly below native).
            let top = render.max_zoom.min(native - 1);
            let mut level = self.canvas.downsample();
            while level.zoom() > top {
                level = level.downsample();
            }
            loop {
                emitted += slice_level(&level, sink)?;
                if level.zoom() == render.min_zoom {
                    break;
                }
                level = level.downsample();
            }
        }

        if render.max_zoom > native {
            let bottom = render.min_zoom.max(native + 1);
            for zoom in bottom..=render.max_zoom {
                let level = self.canvas.upsample_to(zoom);
                emitted += slice_level(&level, sink)?;
            }
        }

        info!(tiles = emitted, "pyramid sliced");
        Ok(emitted)
    }
}

/// Slices a single canvas level: border tiles first (when filling), then
/// data tiles, row-major.
fn slice_level<S: TileSink>(
    canvas: &WorldCanvas,
    sink: &mut S,
) -> Result<u64, SliceError<S::Error>> {
    let range = canvas.tile_range();
    debug!(
        zoom = range.zoom,
        width = canvas.image().width(),
        height = canvas.image().height(),
        "slicing at zoom {}",
        range.zoom
    );

    let mut emitted = 0u64;

    if canvas.fill_borders() {
        for border in range.border_tiles(&canvas.world_range()) {
            sink.save_border(border).map_err(SliceError::Sink)?;
            emitted += 1;
        }
    }

    for row in range.min_row..range.max_row {
        for column in range.min_column..range.max_column {
            let coord = TileCoord::new(range.zoom, column, row);
            let tile = canvas.tile(coord)?;
            sink.save(coord, &tile).map_err(SliceError::Sink)?;
            emitted += 1;
        }
    }

    Ok(emitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Extents, SpatialReference, TILE_SIDE, XY};
    use crate::planner;
    use image::Rgba;
    use std::convert::Infallible;

    /// Sink that records every call; `None` pixels mark border tiles.
    #[derive(Default)]
    struct RecordingSink {
        tiles: Vec<(TileCoord, Option<RgbaImage>)>,
    }

    impl TileSink for RecordingSink {
        type Error = Infallible;

        fn save(&mut self, coord: TileCoord, image: &RgbaImage) -> Result<(), Infallible> {
            self.tiles.push((coord, Some(image.clone())));
            Ok(())
        }

        fn save_border(&mut self, coord: TileCoord) -> Result<(), Infallible> {
            self.tiles.push((coord, None));
            Ok(())
        }
    }

    fn srs() -> SpatialReference {
        SpatialReference::web_mercator()
    }

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

    /// An image whose pixels encode their own coordinates, so reassembly
    /// mistakes are visible.
    fn coordinate_image(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, ((x / 256) * 16 + y / 256) as u8, 255])
        })
    }

    fn build_canvas(zoom: u8, column: u32, row: u32, columns: u32, rows: u32, fill: bool) -> WorldCanvas {
        let extents = tile_block_extents(zoom, column, row, columns, rows);
        let image = coordinate_image(columns * TILE_SIDE, rows * TILE_SIDE);
        WorldCanvas::build(image, &extents, srs(), zoom, fill).unwrap()
    }

    fn native_plan(zoom: u8) -> ZoomPlan {
        planner::plan(srs().pixel_size(zoom), None, None, 0, &srs()).unwrap()
    }

    #[test]
    fn test_native_only_512_input_emits_2x2_block() {
        // A 512x512 raster at native zoom 8 produces exactly the four
        // zoom-8 tiles of its 2x2 block, nothing above or below.
        let canvas = build_canvas(8, 100, 60, 2, 2, false);
        let mut sink = RecordingSink::default();
        let emitted = TilePyramid::new(canvas, native_plan(8)).slice(&mut sink).unwrap();

        assert_eq!(emitted, 4);
        assert_eq!(sink.tiles.len(), 4);
        assert!(sink.tiles.iter().all(|(c, _)| c.zoom == 8));
        let coords: Vec<_> = sink.tiles.iter().map(|(c, _)| (c.column, c.row)).collect();
        assert_eq!(coords, vec![(100, 60), (101, 60), (100, 61), (101, 61)]);
    }

    #[test]
    fn test_slicing_round_trip_reassembles_canvas() {
        let canvas = build_canvas(3, 2, 1, 2, 2, false);
        let original = canvas.image().clone();
        let range = canvas.tile_range();
        let mut sink = RecordingSink::default();
        TilePyramid::new(canvas, native_plan(3)).slice(&mut sink).unwrap();

        let mut reassembled = RgbaImage::new(512, 512);
        for (coord, pixels) in &sink.tiles {
            let tile = pixels.as_ref().expect("no borders expected");
            let x = (coord.column - range.min_column) * TILE_SIDE;
            let y = (coord.row - range.min_row) * TILE_SIDE;
            image::imageops::replace(&mut reassembled, tile, i64::from(x), i64::from(y));
        }
        assert_eq!(reassembled.as_raw(), original.as_raw());
    }

    #[test]
    fn test_fill_borders_emits_full_world_grid() {
        // One data tile at zoom 2 with borders filled: the whole 4x4 world
        // grid is emitted, 15 of them transparent borders.
        let canvas = build_canvas(2, 1, 1, 1, 1, true);
        let mut sink = RecordingSink::default();
        let emitted = TilePyramid::new(canvas, native_plan(2)).slice(&mut sink).unwrap();

        assert_eq!(emitted, 16);
        let borders = sink.tiles.iter().filter(|(_, p)| p.is_none()).count();
        assert_eq!(borders, 15);
        // Borders come first, data last.
        assert!(sink.tiles[15].1.is_some());
        assert_eq!(sink.tiles[15].0, TileCoord::new(2, 1, 1));
    }

    #[test]
    fn test_no_fill_borders_omits_outside_tiles() {
        let canvas = build_canvas(2, 1, 1, 1, 1, false);
        let mut sink = RecordingSink::default();
        let emitted = TilePyramid::new(canvas, native_plan(2)).slice(&mut sink).unwrap();
        assert_eq!(emitted, 1);
    }

    #[test]
    fn test_downsample_pyramid_descends_to_min_zoom() {
        let canvas = build_canvas(3, 0, 0, 2, 2, false);
        let plan = planner::plan(
            srs().pixel_size(3),
            Some(srs().pixel_size(1)),
            None,
            0,
            &srs(),
        )
        .unwrap();
        let mut sink = RecordingSink::default();
        TilePyramid::new(canvas, plan).slice(&mut sink).unwrap();

        let zooms: Vec<u8> = sink.tiles.iter().map(|(c, _)| c.zoom).collect();
        // Native 3 first, then 2, then 1; the block shrinks toward one tile.
        assert_eq!(zooms, vec![3, 3, 3, 3, 2, 1]);
    }

    #[test]
    fn test_downsample_gap_skips_unrequested_levels() {
        // Range strictly below native: native and intermediate levels are
        // rendered for fidelity but never emitted.
        let canvas = build_canvas(4, 0, 0, 4, 4, false);
        let plan = planner::plan(
            srs().pixel_size(4),
            Some(srs().pixel_size(2)),
            Some(srs().pixel_size(2)),
            0,
            &srs(),
        )
        .unwrap();
        let mut sink = RecordingSink::default();
        TilePyramid::new(canvas, plan).slice(&mut sink).unwrap();

        assert!(sink.tiles.iter().all(|(c, _)| c.zoom == 2));
        assert_eq!(sink.tiles.len(), 1);
    }

    #[test]
    fn test_upsample_levels_come_from_native_canvas() {
        let canvas = build_canvas(2, 1, 1, 1, 1, false);
        let plan = planner::plan(
            srs().pixel_size(2),
            None,
            Some(srs().pixel_size(4)),
            0,
            &srs(),
        )
        .unwrap();
        let mut sink = RecordingSink::default();
        TilePyramid::new(canvas, plan).slice(&mut sink).unwrap();

        let per_zoom = |z: u8| sink.tiles.iter().filter(|(c, _)| c.zoom == z).count();
        assert_eq!(per_zoom(2), 1);
        assert_eq!(per_zoom(3), 4);
        assert_eq!(per_zoom(4), 16);
        // Fixed order: native, then ascending upsampled zooms.
        assert_eq!(sink.tiles[0].0.zoom, 2);
        assert_eq!(sink.tiles[1].0.zoom, 3);
        assert_eq!(sink.tiles[5].0.zoom, 4);
    }

    #[test]
    fn test_downsampled_tiles_are_deterministic() {
        let run = || {
            let canvas = build_canvas(3, 2, 2, 2, 2, false);
            let plan = planner::plan(
                srs().pixel_size(3),
                Some(srs().pixel_size(2)),
                None,
                0,
                &srs(),
            )
            .unwrap();
            let mut sink = RecordingSink::default();
            TilePyramid::new(canvas, plan).slice(&mut sink).unwrap();
            sink.tiles
                .into_iter()
                .map(|(c, p)| (c, p.map(|i| i.into_raw())))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_every_tile_is_exactly_256() {
        let canvas = build_canvas(3, 1, 1, 3, 2, false);
        let mut sink = RecordingSink::default();
        TilePyramid::new(canvas, native_plan(3)).slice(&mut sink).unwrap();
        for (_, pixels) in &sink.tiles {
            let tile = pixels.as_ref().unwrap();
            assert_eq!((tile.width(), tile.height()), (TILE_SIDE, TILE_SIDE));
        }
    }
}
