//! Deterministic palette quantization for 8-bit PNG output.
//!
//! Median-cut over the image's distinct RGBA colors. Every choice the
//! algorithm makes — which box to split, where to cut, how the palette is
//! ordered — is a pure function of the pixel data, so the same input always
//! produces the same palette and index map. No dithering, no sampling, no
//! randomized seeding.

use std::collections::{BTreeMap, HashMap};

use image::RgbaImage;

/// Result of quantizing an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantized {
    /// RGBA palette, at most the requested size.
    pub palette: Vec<[u8; 4]>,
    /// One palette index per pixel, row-major.
    pub indices: Vec<u8>,
}

/// A distinct color and how many pixels carry it.
#[derive(Debug, Clone, Copy)]
struct WeightedColor {
    packed: u32,
    count: u64,
}

impl WeightedColor {
    fn channel(&self, index: usize) -> u8 {
        (self.packed >> (24 - index * 8)) as u8
    }
}

fn pack(pixel: [u8; 4]) -> u32 {
    u32::from(pixel[0]) << 24
        | u32::from(pixel[1]) << 16
        | u32::from(pixel[2]) << 8
        | u32::from(pixel[3])
}

fn unpack(packed: u32) -> [u8; 4] {
    [
        (packed >> 24) as u8,
        (packed >> 16) as u8,
        (packed >> 8) as u8,
        packed as u8,
    ]
}

/// Quantizes `image` to at most `max_colors` palette entries.
///
/// Images with no more distinct colors than `max_colors` keep their colors
/// exactly; otherwise boxes are median-cut until the palette is full and
/// each box contributes its pixel-weighted mean color.
pub fn quantize(image: &RgbaImage, max_colors: u16) -> Quantized {
    debug_assert!((2..=256).contains(&max_colors));

    // BTreeMap gives a stable color ordering independent of pixel order.
    let mut counts: BTreeMap<u32, u64> = BTreeMap::new();
    for pixel in image.pixels() {
        *counts.entry(pack(pixel.0)).or_insert(0) += 1;
    }

    let colors: Vec<WeightedColor> = counts
        .iter()
        .map(|(&packed, &count)| WeightedColor { packed, count })
        .collect();

    let boxes = if colors.len() <= max_colors as usize {
        colors.iter().map(|c| vec![*c]).collect()
    } else {
        median_cut(colors, max_colors as usize)
    };

    // Canonical palette order: sorted by the box's mean color.
    let mut palette_boxes: Vec<(u32, Vec<WeightedColor>)> = boxes
        .into_iter()
        .map(|cell| (pack(mean_color(&cell)), cell))
        .collect();
    palette_boxes.sort_by_key(|(mean, _)| *mean);

    let mut palette = Vec::with_capacity(palette_boxes.len());
    let mut lookup: HashMap<u32, u8> = HashMap::new();
    for (index, (mean, cell)) in palette_boxes.iter().enumerate() {
        palette.push(unpack(*mean));
        for color in cell {
            lookup.insert(color.packed, index as u8);
        }
    }

    let indices = image.pixels().map(|pixel| lookup[&pack(pixel.0)]).collect();

    Quantized { palette, indices }
}

/// Splits the color set into `target` boxes.
fn median_cut(colors: Vec<WeightedColor>, target: usize) -> Vec<Vec<WeightedColor>> {
    let mut boxes = vec![colors];

    while boxes.len() < target {
        // Widest box first; ties go to the earliest box so the outcome does
        // not depend on container order quirks.
        let candidate = boxes
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.len() > 1)
            .max_by(|(ia, a), (ib, b)| {
                let (ra, _) = widest_channel(a);
                let (rb, _) = widest_channel(b);
                ra.cmp(&rb).then(ib.cmp(ia))
            })
            .map(|(index, _)| index);

        let Some(index) = candidate else {
            break;
        };

        let mut cell = boxes.swap_remove(index);
        let (_, channel) = widest_channel(&cell);
        cell.sort_by_key(|c| (c.channel(channel), c.packed));

        let total: u64 = cell.iter().map(|c| c.count).sum();
        let mut running = 0u64;
        let mut split = 1;
        for (i, color) in cell.iter().enumerate() {
            running += color.count;
            if running * 2 >= total {
                // Keep both halves non-empty.
                split = (i + 1).clamp(1, cell.len() - 1);
                break;
            }
        }

        let upper = cell.split_off(split);
        boxes.push(cell);
        boxes.push(upper);
    }

    boxes
}

/// Returns (range, channel index) of the channel with the widest spread.
fn widest_channel(cell: &[WeightedColor]) -> (u8, usize) {
    let mut best = (0u8, 0usize);
    for channel in 0..4 {
        let mut min = u8::MAX;
        let mut max = u8::MIN;
        for color in cell {
            let v = color.channel(channel);
            min = min.min(v);
            max = max.max(v);
        }
        let range = max - min;
        if range > best.0 {
            best = (range, channel);
        }
    }
    best
}

/// Pixel-weighted mean color of a box.
fn mean_color(cell: &[WeightedColor]) -> [u8; 4] {
    let total: u64 = cell.iter().map(|c| c.count).sum();
    let mut sums = [0u64; 4];
    for color in cell {
        for (channel, sum) in sums.iter_mut().enumerate() {
            *sum += u64::from(color.channel(channel)) * color.count;
        }
    }
    let mut mean = [0u8; 4];
    for (channel, slot) in mean.iter_mut().enumerate() {
        // Round half up; total is never zero for a non-empty box.
        *slot = ((sums[channel] + total / 2) / total) as u8;
    }
    mean
}
