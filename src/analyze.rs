//! Content analysis: one cheap statistics pass that drives format and
//! quality recommendations before any encoder runs.

use imgref::ImgRef;
use rgb::RGBA8;
use std::collections::HashSet;

use crate::convert::luminance;
use crate::{Format, Quality};

/// Statistics gathered by [`analyze`]. Produced once, immutable.
#[derive(Debug, Clone)]
pub struct ImageStats {
    /// Width and height in pixels.
    pub width: usize,
    pub height: usize,

    /// Whether any pixel has alpha below 255.
    pub has_alpha: bool,

    /// Whether every pixel satisfies `R == G == B`.
    pub is_grayscale: bool,

    /// Sampled distinct RGBA values, capped at 1024. An estimate bounded
    /// above, which keeps the format thresholds below slightly conservative.
    pub unique_colors: usize,

    /// Shannon entropy of the luminance histogram in bits (0-8).
    /// Low entropy compresses well; high entropy is complex or noisy.
    pub entropy: f64,

    /// Fraction of sampled pixels that are Sobel edges (0-1).
    /// High values indicate text or diagrams, low values photographs.
    pub edge_density: f64,

    /// Mean luminance (0-255).
    pub mean_brightness: f64,

    /// Standard deviation of sampled luminance (0-127.5).
    pub contrast: f64,

    /// Format suggested by the analysis.
    pub recommended_format: Format,

    /// Quality preset suggested by the analysis.
    pub recommended_quality: Quality,

    /// Rough achievable compression ratio.
    pub estimated_compression: f64,
}

impl Default for ImageStats {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            has_alpha: false,
            is_grayscale: false,
            unique_colors: 0,
            entropy: 0.0,
            edge_density: 0.0,
            mean_brightness: 0.0,
            contrast: 0.0,
            recommended_format: Format::Auto,
            recommended_quality: Quality::Balanced,
            estimated_compression: 0.0,
        }
    }
}

/// Analyze an image to inform compression decisions.
pub fn analyze(img: ImgRef<'_, RGBA8>) -> ImageStats {
    let (w, h) = (img.width(), img.height());

    let mut stats = ImageStats {
        width: w,
        height: h,
        ..ImageStats::default()
    };
    if w == 0 || h == 0 {
        return stats;
    }

    // Single pass: histogram, brightness, alpha/grayscale flags, sampled
    // unique colors.
    let mut histogram = [0.0f64; 256];
    let mut bright_sum = 0.0;
    let mut colors: HashSet<u32> = HashSet::new();
    let color_sample_step = if w * h > 50_000 { w * h / 50_000 } else { 1 };

    let mut all_gray = true;
    let mut has_alpha = false;
    let mut idx = 0usize;

    for row in img.rows() {
        for p in row {
            let lum = luminance(p.r, p.g, p.b);
            bright_sum += lum;
            histogram[(lum + 0.5) as usize] += 1.0;

            if p.a < 255 {
                has_alpha = true;
            }
            if p.r != p.g || p.g != p.b {
                all_gray = false;
            }
            if idx % color_sample_step == 0 && colors.len() < 1024 {
                let key = u32::from(p.r) << 24
                    | u32::from(p.g) << 16
                    | u32::from(p.b) << 8
                    | u32::from(p.a);
                colors.insert(key);
            }
            idx += 1;
        }
    }

    let n = (w * h) as f64;
    stats.has_alpha = has_alpha;
    stats.is_grayscale = all_gray;
    stats.unique_colors = colors.len();
    stats.mean_brightness = bright_sum / n;

    // Coarse second pass (~100x100 samples) for contrast.
    let step_y = (h / 100).max(1);
    let step_x = (w / 100).max(1);
    let mut variance_sum = 0.0;
    let mut sample_count = 0usize;
    let buf = img.buf();
    let stride = img.stride();
    let mut y = 0;
    while y < h {
        let mut x = 0;
        while x < w {
            let p = buf[y * stride + x];
            let d = luminance(p.r, p.g, p.b) - stats.mean_brightness;
            variance_sum += d * d;
            sample_count += 1;
            x += step_x;
        }
        y += step_y;
    }
    stats.contrast = (variance_sum / sample_count.max(1) as f64).sqrt();

    stats.entropy = shannon_entropy(&histogram, n);
    stats.edge_density = edge_density(img);

    stats.recommended_format = recommend_format(&stats);
    stats.recommended_quality = recommend_quality(&stats);
    stats.estimated_compression = estimate_compression(&stats);

    stats
}

/// Shannon entropy of a luminance histogram, in bits.
fn shannon_entropy(histogram: &[f64], total: f64) -> f64 {
    if total == 0.0 {
        return 0.0;
    }
    let mut entropy = 0.0;
    for &count in histogram {
        if count > 0.0 {
            let p = count / total;
            entropy -= p * p.log2();
        }
    }
    entropy
}

/// Fraction of sampled interior pixels whose Sobel gradient magnitude
/// exceeds the edge threshold.
fn edge_density(img: ImgRef<'_, RGBA8>) -> f64 {
    let (w, h) = (img.width(), img.height());
    if w < 3 || h < 3 {
        return 0.0;
    }

    let step_x = (w / 200).max(1);
    let step_y = (h / 200).max(1);
    let threshold = 30.0;

    let buf = img.buf();
    let stride = img.stride();
    let lum = |x: usize, y: usize| {
        let p = buf[y * stride + x];
        luminance(p.r, p.g, p.b)
    };

    let mut edges = 0usize;
    let mut total = 0usize;

    let mut y = 1;
    while y < h - 1 {
        let mut x = 1;
        while x < w - 1 {
            // Sobel X: [-1 0 1; -2 0 2; -1 0 1], Sobel Y: [-1 -2 -1; 0 0 0; 1 2 1]
            let gx = lum(x + 1, y - 1) - lum(x - 1, y - 1)
                + 2.0 * lum(x + 1, y)
                - 2.0 * lum(x - 1, y)
                + lum(x + 1, y + 1)
                - lum(x - 1, y + 1);
            let gy = lum(x - 1, y + 1) - lum(x - 1, y - 1)
                + 2.0 * lum(x, y + 1)
                - 2.0 * lum(x, y - 1)
                + lum(x + 1, y + 1)
                - lum(x + 1, y - 1);

            if (gx * gx + gy * gy).sqrt() > threshold {
                edges += 1;
            }
            total += 1;
            x += step_x;
        }
        y += step_y;
    }

    if total == 0 {
        return 0.0;
    }
    edges as f64 / total as f64
}

fn recommend_format(stats: &ImageStats) -> Format {
    if stats.has_alpha {
        return Format::Png;
    }
    if stats.unique_colors <= 256 {
        return Format::Png;
    }
    if stats.edge_density > 0.3 && stats.unique_colors < 1000 {
        // Screenshots, text, diagrams.
        return Format::Png;
    }
    Format::Jpeg
}

fn recommend_quality(stats: &ImageStats) -> Quality {
    // High entropy with few edges reads as photographic content.
    if stats.entropy > 6.0 && stats.edge_density < 0.15 {
        return Quality::Balanced;
    }
    if stats.entropy < 4.0 {
        return Quality::Aggressive;
    }
    if stats.edge_density > 0.25 {
        return Quality::High;
    }
    Quality::Balanced
}

fn estimate_compression(stats: &ImageStats) -> f64 {
    if stats.recommended_format == Format::Png {
        if stats.unique_colors <= 256 {
            return 5.0 + (256.0 - stats.unique_colors as f64) / 50.0;
        }
        if stats.is_grayscale {
            return 3.0;
        }
        return 2.0;
    }

    let mut base = 10.0;
    if stats.entropy > 7.0 {
        base = 5.0;
    } else if stats.entropy > 5.0 {
        base = 8.0;
    }
    if stats.edge_density > 0.2 {
        base *= 0.7;
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgref::{Img, ImgVec};

    fn solid(w: usize, h: usize, p: RGBA8) -> ImgVec<RGBA8> {
        Img::new(vec![p; w * h], w, h)
    }

    #[test]
    fn solid_gray_stats() {
        let img = solid(100, 100, RGBA8::new(128, 128, 128, 255));
        let stats = analyze(img.as_ref());
        assert!(stats.is_grayscale);
        assert!(!stats.has_alpha);
        assert!(stats.entropy <= 0.01, "entropy {}", stats.entropy);
        assert_eq!(stats.unique_colors, 1);
        assert!((stats.mean_brightness - 128.0).abs() < 1.0);
        assert!(stats.contrast < 1e-9);
        assert_eq!(stats.edge_density, 0.0);
        assert_eq!(stats.recommended_format, Format::Png);
        assert_eq!(stats.recommended_quality, Quality::Aggressive);
    }

    #[test]
    fn alpha_forces_png() {
        let mut img = solid(64, 64, RGBA8::new(10, 20, 30, 255));
        img.buf_mut()[5].a = 100;
        let stats = analyze(img.as_ref());
        assert!(stats.has_alpha);
        assert_eq!(stats.recommended_format, Format::Png);
    }

    #[test]
    fn dense_gradient_recommends_jpeg() {
        let mut buf = Vec::new();
        for y in 0..200usize {
            for x in 0..200usize {
                buf.push(RGBA8::new(
                    (x * 255 / 200) as u8,
                    (y * 255 / 200) as u8,
                    ((x * y) % 256) as u8,
                    255,
                ));
            }
        }
        let img: ImgVec<RGBA8> = Img::new(buf, 200, 200);
        let stats = analyze(img.as_ref());
        assert!(!stats.has_alpha);
        assert!(stats.unique_colors > 256);
        assert_eq!(stats.recommended_format, Format::Jpeg);
        assert!(stats.estimated_compression > 0.0);
    }

    #[test]
    fn checkerboard_has_edges() {
        let mut buf = Vec::new();
        for y in 0..64usize {
            for x in 0..64usize {
                let v = if (x + y) % 2 == 0 { 0 } else { 255 };
                buf.push(RGBA8::new(v, v, v, 255));
            }
        }
        let img: ImgVec<RGBA8> = Img::new(buf, 64, 64);
        let stats = analyze(img.as_ref());
        assert!(stats.edge_density > 0.5, "density {}", stats.edge_density);
        // Two luminance values give ~1 bit of entropy, and the low-entropy
        // rule outranks the edge rule.
        assert_eq!(stats.recommended_quality, Quality::Aggressive);
    }

    #[test]
    fn tiny_image_has_zero_edge_density() {
        let img = solid(2, 2, RGBA8::new(0, 0, 0, 255));
        let stats = analyze(img.as_ref());
        assert_eq!(stats.edge_density, 0.0);
    }
}
