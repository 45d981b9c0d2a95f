//! Band-value color mapping.
//!
//! Converts raw single-band values into RGBA pixels through a table of
//! `(band value, color)` entries and one of three strategies:
//!
//! - [`Coloring::Exact`] — only values matching a table entry are colored;
//!   everything else is transparent.
//! - [`Coloring::Palette`] — a step function; each value takes the color of
//!   the nearest table entry at or below it. Values below the smallest entry
//!   are transparent.
//! - [`Coloring::Gradient`] — per-channel linear interpolation (alpha
//!   included) between the bounding entries; values outside the table clamp
//!   to the endpoint colors.
//!
//! The table is sorted internally. Duplicate band values resolve to the
//! last entry given — a documented tie-break, not an accident of ordering.
//! The raster's nodata value, when present, always maps to the transparent
//! background.

use image::RgbaImage;
use rayon::prelude::*;
use tracing::debug;

use crate::error::ConfigError;
use crate::raster::Raster;

/// An RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    /// The transparent background every unmatched value maps to.
    pub const TRANSPARENT: Rgba = Rgba {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Fully opaque color.
    pub fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parses `#rrggbb` or `#rrggbbaa` (leading `#` optional).
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidColor` on anything else.
    pub fn from_hex(text: &str) -> Result<Self, ConfigError> {
        let hex = text.strip_prefix('#').unwrap_or(text);
        let invalid = || ConfigError::InvalidColor(text.to_string());
        let byte = |range: std::ops::Range<usize>| {
            hex.get(range)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(invalid)
        };
        match hex.len() {
            6 => Ok(Self::opaque(byte(0..2)?, byte(2..4)?, byte(4..6)?)),
            8 => Ok(Self::new(byte(0..2)?, byte(2..4)?, byte(4..6)?, byte(6..8)?)),
            _ => Err(invalid()),
        }
    }

    fn channels(&self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Strategy for mapping band values to colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coloring {
    Exact,
    Palette,
    Gradient,
}

/// Ordered `(band value, color)` table.
#[derive(Debug, Clone)]
pub struct ColorTable {
    entries: Vec<(f64, Rgba)>,
}

impl ColorTable {
    /// Builds a table from entries in any order.
    ///
    /// Entries are sorted by band value; duplicates keep the last entry
    /// given (stable sort preserves insertion order within equal keys).
    ///
    /// # Errors
    ///
    /// `ConfigError::EmptyColorTable` for an empty input and
    /// `ConfigError::InvalidColor` for non-finite band values.
    pub fn from_entries(entries: Vec<(f64, Rgba)>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::EmptyColorTable);
        }
        if let Some((value, _)) = entries.iter().find(|(value, _)| !value.is_finite()) {
            return Err(ConfigError::InvalidColor(format!(
                "band value {value} is not finite"
            )));
        }

        let mut sorted = entries;
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
        // Last entry wins for duplicate band values.
        sorted.dedup_by(|next, kept| {
            if next.0 == kept.0 {
                *kept = *next;
                true
            } else {
                false
            }
        });
        Ok(Self { entries: sorted })
    }

    pub fn entries(&self) -> &[(f64, Rgba)] {
        &self.entries
    }

    fn map(&self, value: f64, mode: Coloring) -> Rgba {
        match mode {
            Coloring::Exact => self
                .entries
                .iter()
                .find(|(entry, _)| *entry == value)
                .map(|(_, color)| *color)
                .unwrap_or(Rgba::TRANSPARENT),
            Coloring::Palette => {
                let index = self.entries.partition_point(|(entry, _)| *entry <= value);
                if index == 0 {
                    Rgba::TRANSPARENT
                } else {
                    self.entries[index - 1].1
                }
            }
            Coloring::Gradient => {
                let (first_value, first_color) = self.entries[0];
                let (last_value, last_color) = self.entries[self.entries.len() - 1];
                if value <= first_value {
                    return first_color;
                }
                if value >= last_value {
                    return last_color;
                }
                // partition_point > 0 here because value > first_value.
                let upper = self.entries.partition_point(|(entry, _)| *entry <= value);
                let (v0, c0) = self.entries[upper - 1];
                let (v1, c1) = self.entries[upper];
                if v0 == v1 {
                    return c1;
                }
                let t = (value - v0) / (v1 - v0);
                let lo = c0.channels();
                let hi = c1.channels();
                let mut out = [0u8; 4];
                for (slot, (a, b)) in out.iter_mut().zip(lo.iter().zip(hi.iter())) {
                    let blended = f64::from(*a) + (f64::from(*b) - f64::from(*a)) * t;
                    *slot = blended.round().clamp(0.0, 255.0) as u8;
                }
                Rgba::new(out[0], out[1], out[2], out[3])
            }
        }
    }
}

/// Colors one band of `raster` into an RGBA image.
///
/// # Arguments
///
/// * `raster` - Source raster; any band layout and sample format.
/// * `band` - 1-based band index to read values from.
/// * `table` - The color table.
/// * `mode` - Mapping strategy.
///
/// # Errors
///
/// `ConfigError::BandOutOfRange` when `band` does not exist.
pub fn colorize(
    raster: &Raster,
    band: u8,
    table: &ColorTable,
    mode: Coloring,
) -> Result<RgbaImage, ConfigError> {
    if band == 0 || band > raster.bands() {
        return Err(ConfigError::BandOutOfRange {
            band,
            bands: raster.bands(),
        });
    }
    let band_index = band - 1;
    let nodata = raster.nodata();
    let width = raster.width();
    let height = raster.height();

    debug!(
        width,
        height,
        ?mode,
        entries = table.entries.len(),
        "coloring band {band}"
    );

    let row_stride = width as usize * 4;
    let mut data = vec![0u8; row_stride * height as usize];
    data.par_chunks_mut(row_stride)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width {
                let value = raster.sample(band_index, x, y as u32);
                let color = match nodata {
                    Some(nd) if value == nd => Rgba::TRANSPARENT,
                    _ => table.map(value, mode),
                };
                let offset = x as usize * 4;
                row[offset..offset + 4].copy_from_slice(&color.channels());
            }
        });

    // Length is row_stride * height by construction.
    Ok(RgbaImage::from_raw(width, height, data).expect("buffer sized to dimensions"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{GeoTransform, SampleFormat};

    fn band_raster(values: &[u8], width: u32, height: u32, nodata: Option<f64>) -> Raster {
        Raster::new(
            width,
            height,
            1,
            SampleFormat::U8,
            values.to_vec(),
            GeoTransform::new(0.0, 0.0, 1.0, -1.0),
            nodata,
        )
        .unwrap()
    }

    fn table(entries: &[(f64, Rgba)]) -> ColorTable {
        ColorTable::from_entries(entries.to_vec()).unwrap()
    }

    #[test]
    fn test_from_hex_rgb_and_rgba() {
        assert_eq!(Rgba::from_hex("#ff00ff").unwrap(), Rgba::opaque(255, 0, 255));
        assert_eq!(
            Rgba::from_hex("10203040").unwrap(),
            Rgba::new(0x10, 0x20, 0x30, 0x40)
        );
        assert!(Rgba::from_hex("#abc").is_err());
        assert!(Rgba::from_hex("zzzzzz").is_err());
    }

    #[test]
    fn test_empty_table_rejected() {
        assert!(matches!(
            ColorTable::from_entries(vec![]),
            Err(ConfigError::EmptyColorTable)
        ));
    }

    #[test]
    fn test_table_sorts_unsorted_entries() {
        let t = table(&[
            (10.0, Rgba::opaque(1, 1, 1)),
            (-5.0, Rgba::opaque(2, 2, 2)),
            (0.0, Rgba::opaque(3, 3, 3)),
        ]);
        let values: Vec<f64> = t.entries().iter().map(|(v, _)| *v).collect();
        assert_eq!(values, vec![-5.0, 0.0, 10.0]);
    }

    #[test]
    fn test_duplicate_band_value_last_wins() {
        let t = table(&[
            (0.0, Rgba::opaque(1, 0, 0)),
            (0.0, Rgba::opaque(0, 2, 0)),
            (0.0, Rgba::opaque(0, 0, 3)),
        ]);
        assert_eq!(t.entries().len(), 1);
        assert_eq!(t.entries()[0].1, Rgba::opaque(0, 0, 3));
    }

    #[test]
    fn test_exact_matches_only_table_values() {
        let t = table(&[(10.0, Rgba::opaque(255, 0, 0)), (20.0, Rgba::opaque(0, 255, 0))]);
        let raster = band_raster(&[10, 11, 20, 19], 4, 1, None);
        let image = colorize(&raster, 1, &t, Coloring::Exact).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0, 255]);
        // Adjacent untouched values stay fully transparent.
        assert_eq!(image.get_pixel(1, 0).0, [0, 0, 0, 0]);
        assert_eq!(image.get_pixel(2, 0).0, [0, 255, 0, 255]);
        assert_eq!(image.get_pixel(3, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_palette_steps_between_entries() {
        let t = table(&[(10.0, Rgba::opaque(255, 0, 0)), (20.0, Rgba::opaque(0, 255, 0))]);
        let raster = band_raster(&[5, 10, 15, 20, 25], 5, 1, None);
        let image = colorize(&raster, 1, &t, Coloring::Palette).unwrap();
        // Below the smallest entry: transparent.
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(image.get_pixel(1, 0).0, [255, 0, 0, 255]);
        assert_eq!(image.get_pixel(2, 0).0, [255, 0, 0, 255]);
        assert_eq!(image.get_pixel(3, 0).0, [0, 255, 0, 255]);
        assert_eq!(image.get_pixel(4, 0).0, [0, 255, 0, 255]);
    }

    #[test]
    fn test_gradient_interpolates_channels_and_alpha() {
        let t = table(&[
            (0.0, Rgba::new(0, 0, 0, 0)),
            (100.0, Rgba::new(200, 100, 50, 255)),
        ]);
        let raster = band_raster(&[50], 1, 1, None);
        let image = colorize(&raster, 1, &t, Coloring::Gradient).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [100, 50, 25, 128]);
    }

    #[test]
    fn test_gradient_clamps_outside_table() {
        let t = table(&[
            (10.0, Rgba::opaque(10, 10, 10)),
            (20.0, Rgba::opaque(200, 200, 200)),
        ]);
        let raster = band_raster(&[0, 255], 2, 1, None);
        let image = colorize(&raster, 1, &t, Coloring::Gradient).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [10, 10, 10, 255]);
        assert_eq!(image.get_pixel(1, 0).0, [200, 200, 200, 255]);
    }

    #[test]
    fn test_nodata_always_transparent() {
        let t = table(&[(0.0, Rgba::opaque(9, 9, 9)), (255.0, Rgba::opaque(1, 1, 1))]);
        for mode in [Coloring::Exact, Coloring::Palette, Coloring::Gradient] {
            let raster = band_raster(&[0, 7], 2, 1, Some(7.0));
            let image = colorize(&raster, 1, &t, mode).unwrap();
            assert_eq!(image.get_pixel(1, 0).0, [0, 0, 0, 0], "mode {mode:?}");
        }
    }

    #[test]
    fn test_band_out_of_range() {
        let t = table(&[(0.0, Rgba::opaque(0, 0, 0))]);
        let raster = band_raster(&[0], 1, 1, None);
        assert!(matches!(
            colorize(&raster, 2, &t, Coloring::Exact),
            Err(ConfigError::BandOutOfRange { band: 2, bands: 1 })
        ));
        assert!(colorize(&raster, 0, &t, Coloring::Exact).is_err());
    }

    #[test]
    fn test_gradient_idempotent_with_identity_table() {
        // Coloring a gray ramp with the identity gradient, then re-coloring
        // the output's first band, reproduces the pixels exactly.
        let identity = table(&[
            (0.0, Rgba::opaque(0, 0, 0)),
            (255.0, Rgba::opaque(255, 255, 255)),
        ]);
        let values: Vec<u8> = (0u16..256).map(|v| v as u8).collect();
        let raster = band_raster(&values, 256, 1, None);
        let first = colorize(&raster, 1, &identity, Coloring::Gradient).unwrap();

        let reraster = Raster::from_rgba(first.clone(), GeoTransform::new(0.0, 0.0, 1.0, -1.0));
        let second = colorize(&reraster, 1, &identity, Coloring::Gradient).unwrap();
        assert_eq!(first.as_raw(), second.as_raw());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_gradient_hits_entries_exactly(
                values in proptest::collection::btree_set(-1000i32..1000, 2..8),
                seed in 0u8..=255
            ) {
                let entries: Vec<(f64, Rgba)> = values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| {
                        (f64::from(*v), Rgba::opaque(seed.wrapping_add(i as u8), 0, 0))
                    })
                    .collect();
                let t = ColorTable::from_entries(entries.clone()).unwrap();
                for (value, color) in entries {
                    prop_assert_eq!(t.map(value, Coloring::Gradient), color);
                }
            }

            #[test]
            fn test_palette_only_emits_table_colors(
                sample in -2000i32..2000
            ) {
                let t = ColorTable::from_entries(vec![
                    (-100.0, Rgba::opaque(1, 2, 3)),
                    (0.0, Rgba::opaque(4, 5, 6)),
                    (100.0, Rgba::opaque(7, 8, 9)),
                ]).unwrap();
                let color = t.map(f64::from(sample), Coloring::Palette);
                let allowed = [
                    Rgba::TRANSPARENT,
                    Rgba::opaque(1, 2, 3),
                    Rgba::opaque(4, 5, 6),
                    Rgba::opaque(7, 8, 9),
                ];
                prop_assert!(allowed.contains(&color));
            }
        }
    }
}
