//! Tilepress CLI.
//!
//! Thin wrapper over the `tilepress` library: parse arguments, configure
//! logging, load the input raster, run the conversion, print a summary.

mod args;
mod error;
mod input;

use clap::Parser;
use tilepress::{ConvertConfig, ConvertError, Conversion, SpatialReference, TilesetMeta};

use crate::args::Args;
use crate::error::CliError;

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(error) = run(args) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

/// `-v` enables info logging, `-vv` debug. Silent otherwise.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => return,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn run(args: Args) -> Result<(), CliError> {
    // --coloring and --color only make sense together.
    if args.coloring.is_none() && (!args.colors.is_empty() || args.colorize_band.is_some()) {
        return Err(CliError::Usage("must provide --coloring".to_string()));
    }
    if args.coloring.is_some() && args.colors.is_empty() {
        return Err(CliError::Usage(
            "must provide at least one --color".to_string(),
        ));
    }

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("tilepack"));
    let name = args.name.clone().unwrap_or_else(|| {
        args.input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tileset".to_string())
    });

    let srs = SpatialReference::from_epsg(args.spatial_reference)
        .map_err(|e| CliError::Convert(ConvertError::Config(e)))?;
    let raster = input::load_raster(&args.input, args.bounds.map(|b| b.0), &srs)?;

    let mut meta = TilesetMeta::new(name);
    meta.description = args.description.clone();
    meta.layer_type = args.layer_type.into();
    meta.version = args.version.clone();

    let mut config = ConvertConfig::new(meta)
        .with_spatial_reference(args.spatial_reference)
        .with_resolutions(args.min_resolution, args.max_resolution)
        .with_fill_borders(args.fill_borders())
        .with_zoom_offset(args.zoom_offset)
        .with_format(args.format.into());
    config.resampling = args.resampling.clone();
    if let Some(mode) = args.coloring {
        let colors = args.colors.iter().map(|c| (c.value, c.color)).collect();
        config = config.with_coloring(mode.into(), colors);
    }
    if let Some(band) = args.colorize_band {
        config = config.with_colorize_band(band);
    }
    if let Some(palette_size) = args.png8 {
        config = config.with_png8(palette_size);
    }

    let report = Conversion::new(raster, config).run(&output)?;
    let [left, bottom, right, top] = report.bounds;
    println!(
        "{}: {} tiles, zoom {}-{}, bounds {left:.5},{bottom:.5},{right:.5},{top:.5}",
        output.display(),
        report.tiles_written,
        report.zoom.min_zoom,
        report.zoom.max_zoom,
    );
    Ok(())
}
