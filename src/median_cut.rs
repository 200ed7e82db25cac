//! Median-cut palette construction for the target-size engine's indexed-PNG
//! strategy.

use imgref::ImgRef;
use rgb::RGBA8;

/// Upper bound on pixels sampled for palette construction. Sampling is
/// uniform over the raster, so large images still see every region.
const MAX_SAMPLES: usize = 100_000;

/// A box of RGB samples pending subdivision.
#[derive(Debug)]
struct ColorBox {
    samples: Vec<[u8; 3]>,
    r_min: u8,
    r_max: u8,
    g_min: u8,
    g_max: u8,
    b_min: u8,
    b_max: u8,
}

impl ColorBox {
    fn new(samples: Vec<[u8; 3]>) -> Self {
        let mut bx = Self {
            samples,
            r_min: 255,
            r_max: 0,
            g_min: 255,
            g_max: 0,
            b_min: 255,
            b_max: 0,
        };
        for s in &bx.samples {
            bx.r_min = bx.r_min.min(s[0]);
            bx.r_max = bx.r_max.max(s[0]);
            bx.g_min = bx.g_min.min(s[1]);
            bx.g_max = bx.g_max.max(s[1]);
            bx.b_min = bx.b_min.min(s[2]);
            bx.b_max = bx.b_max.max(s[2]);
        }
        bx
    }

    /// Axis with the widest range: 0 = R, 1 = G, 2 = B.
    fn longest_axis(&self) -> usize {
        let r = i32::from(self.r_max) - i32::from(self.r_min);
        let g = i32::from(self.g_max) - i32::from(self.g_min);
        let b = i32::from(self.b_max) - i32::from(self.b_min);
        if r >= g && r >= b {
            0
        } else if g >= b {
            1
        } else {
            2
        }
    }

    /// Axis-aligned extent of the box in color space.
    fn volume(&self) -> i64 {
        let r = i64::from(self.r_max) - i64::from(self.r_min) + 1;
        let g = i64::from(self.g_max) - i64::from(self.g_min) + 1;
        let b = i64::from(self.b_max) - i64::from(self.b_min) + 1;
        r * g * b
    }

    /// Split priority: diverse, heavily populated boxes split first.
    fn priority(&self) -> i64 {
        self.volume() * self.samples.len() as i64
    }

    /// Component-wise average of the samples, emitted as an opaque color.
    fn centroid(&self) -> RGBA8 {
        if self.samples.is_empty() {
            return RGBA8::new(0, 0, 0, 255);
        }
        let (mut r, mut g, mut b) = (0u64, 0u64, 0u64);
        for s in &self.samples {
            r += u64::from(s[0]);
            g += u64::from(s[1]);
            b += u64::from(s[2]);
        }
        let n = self.samples.len() as u64;
        RGBA8::new((r / n) as u8, (g / n) as u8, (b / n) as u8, 255)
    }

    /// Sort along the longest axis and split at the median sample.
    fn split(mut self) -> (ColorBox, ColorBox) {
        let axis = self.longest_axis();
        self.samples.sort_unstable_by_key(|s| s[axis]);

        let mid = self.samples.len() / 2;
        let right = self.samples.split_off(mid);
        (ColorBox::new(self.samples), ColorBox::new(right))
    }
}

/// Build a palette of at most `max_colors` opaque entries via median cut.
///
/// Splitting stops early when no remaining box holds two or more samples.
pub fn median_cut(img: ImgRef<'_, RGBA8>, max_colors: usize) -> Vec<RGBA8> {
    let (w, h) = (img.width(), img.height());
    let total = w * h;
    let step = if total > MAX_SAMPLES {
        (total / MAX_SAMPLES).max(1)
    } else {
        1
    };

    let buf = img.buf();
    let stride = img.stride();

    let mut samples = Vec::with_capacity(total / step + 1);
    let mut i = 0;
    while i < total {
        let p = buf[(i / w) * stride + i % w];
        samples.push([p.r, p.g, p.b]);
        i += step;
    }

    if samples.is_empty() {
        return vec![RGBA8::new(0, 0, 0, 255)];
    }

    let mut boxes = vec![ColorBox::new(samples)];

    while boxes.len() < max_colors {
        let best = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.samples.len() >= 2)
            .max_by_key(|(_, b)| b.priority())
            .map(|(i, _)| i);

        let Some(idx) = best else {
            break; // nothing left to split
        };

        let (left, right) = boxes.swap_remove(idx).split();
        boxes.push(left);
        boxes.push(right);
    }

    boxes.iter().map(|b| b.centroid()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgref::{Img, ImgVec};

    fn image_of(colors: &[(u8, u8, u8)], w: usize, h: usize) -> ImgVec<RGBA8> {
        let buf: Vec<RGBA8> = (0..w * h)
            .map(|i| {
                let (r, g, b) = colors[i % colors.len()];
                RGBA8::new(r, g, b, 255)
            })
            .collect();
        Img::new(buf, w, h)
    }

    #[test]
    fn single_color_centroids_are_exact() {
        // Boxes split on sample count, so a solid image may yield duplicate
        // entries; every one of them must still be the input color.
        let img = image_of(&[(128, 128, 128)], 8, 8);
        let palette = median_cut(img.as_ref(), 16);
        assert!(!palette.is_empty() && palette.len() <= 16);
        assert!(palette.iter().all(|&p| p == RGBA8::new(128, 128, 128, 255)));
    }

    #[test]
    fn never_exceeds_max_colors() {
        let mut buf = Vec::new();
        for y in 0..32usize {
            for x in 0..32usize {
                buf.push(RGBA8::new((x * 8) as u8, (y * 8) as u8, 77, 255));
            }
        }
        let img: ImgVec<RGBA8> = Img::new(buf, 32, 32);
        for k in [2, 4, 16, 64, 256] {
            let palette = median_cut(img.as_ref(), k);
            assert!(palette.len() <= k, "{} entries for k={k}", palette.len());
            assert!(!palette.is_empty());
        }
    }

    #[test]
    fn quadrant_mosaic_recovers_colors() {
        // Four solid quadrants; with max_colors = 4 each quadrant should map
        // to a centroid close to its own color.
        let colors = [
            (250u8, 10u8, 10u8),
            (10, 250, 10),
            (10, 10, 250),
            (240, 240, 240),
        ];
        let mut buf = Vec::new();
        for y in 0..200usize {
            for x in 0..200usize {
                let q = (y / 100) * 2 + x / 100;
                let (r, g, b) = colors[q];
                buf.push(RGBA8::new(r, g, b, 255));
            }
        }
        let img: ImgVec<RGBA8> = Img::new(buf, 200, 200);
        let palette = median_cut(img.as_ref(), 4);
        assert_eq!(palette.len(), 4);

        for (r, g, b) in colors {
            let nearest = palette
                .iter()
                .map(|p| {
                    let dr = i32::from(p.r) - i32::from(r);
                    let dg = i32::from(p.g) - i32::from(g);
                    let db = i32::from(p.b) - i32::from(b);
                    ((dr * dr + dg * dg + db * db) as f64).sqrt()
                })
                .fold(f64::MAX, f64::min);
            assert!(nearest <= 10.0, "({r},{g},{b}) off by {nearest}");
        }
    }

    #[test]
    fn large_images_are_subsampled() {
        let img = image_of(&[(1, 2, 3), (200, 100, 50)], 512, 400);
        let palette = median_cut(img.as_ref(), 8);
        assert!(palette.len() <= 8);
        assert!(!palette.is_empty());
    }
}
