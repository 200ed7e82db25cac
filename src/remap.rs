//! Nearest-color palette mapping.

use imgref::{Img, ImgRef, ImgVec};
use rgb::RGBA8;
use std::collections::HashMap;

/// An indexed raster: every pixel is an index into `palette`.
#[derive(Debug, Clone)]
pub struct IndexedImage {
    pub palette: Vec<RGBA8>,
    pub indices: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl IndexedImage {
    /// Reconstruct the RGBA raster this indexed image represents.
    pub fn to_rgba(&self) -> ImgVec<RGBA8> {
        let buf: Vec<RGBA8> = self
            .indices
            .iter()
            .map(|&i| self.palette[usize::from(i)])
            .collect();
        Img::new(buf, self.width, self.height)
    }
}

/// Map every pixel to its nearest palette entry by squared RGB distance.
///
/// A `(R, G, B)`-keyed cache skips the linear palette scan for colors seen
/// before; quantized sources repeat colors constantly, so the cache carries
/// most of the work.
pub fn apply_palette(img: ImgRef<'_, RGBA8>, palette: &[RGBA8]) -> IndexedImage {
    debug_assert!(!palette.is_empty() && palette.len() <= 256);

    let (w, h) = (img.width(), img.height());
    let mut indices = Vec::with_capacity(w * h);
    let mut cache: HashMap<(u8, u8, u8), u8> = HashMap::with_capacity(256);

    for row in img.rows() {
        for p in row {
            let key = (p.r, p.g, p.b);
            let idx = *cache
                .entry(key)
                .or_insert_with(|| nearest_entry(palette, p.r, p.g, p.b));
            indices.push(idx);
        }
    }

    IndexedImage {
        palette: palette.to_vec(),
        indices,
        width: w,
        height: h,
    }
}

fn nearest_entry(palette: &[RGBA8], r: u8, g: u8, b: u8) -> u8 {
    let mut best_idx = 0u8;
    let mut best_dist = i32::MAX;
    for (i, c) in palette.iter().enumerate() {
        let dr = i32::from(r) - i32::from(c.r);
        let dg = i32::from(g) - i32::from(c.g);
        let db = i32::from(b) - i32::from(c.b);
        let dist = dr * dr + dg * dg + db * db;
        if dist < best_dist {
            best_dist = dist;
            best_idx = i as u8;
        }
    }
    best_idx
}
