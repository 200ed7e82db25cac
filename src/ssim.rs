//! Structural similarity (SSIM) over BT.601 luminance: the perceptual
//! objective every optimizer loop in this crate minimizes against.
//!
//! Three entry points with the same contract (1.0 = identical):
//! [`ssim`] is the full Gaussian-windowed index, [`ssim_fast`] bounds the
//! working size to a 512-pixel box for inner loops, and [`ms_ssim`] is the
//! five-scale weighted variant that tracks human ratings more closely.

use imgref::{ImgRef, ImgVec};
use rayon::prelude::*;
use rgb::RGBA8;

use crate::convert::{luminance, to_owned_buffer};
use crate::resample::{box_downsample, lanczos_resize};

// Constants from Wang et al., "Image Quality Assessment: From Error
// Visibility to Structural Similarity".
const K1: f64 = 0.01;
const K2: f64 = 0.03;
const L: f64 = 255.0;
const C1: f64 = (K1 * L) * (K1 * L);
const C2: f64 = (K2 * L) * (K2 * L);

const WINDOW: usize = 8;

/// Bounding box applied by [`ssim_fast`] before windowing. 512 still catches
/// subtle blocking artifacts that smaller probes miss while staying cheap
/// enough for binary-search inner loops.
const FAST_MAX_DIM: usize = 512;

/// Full windowed SSIM between two images.
///
/// If dimensions differ, `b` is Lanczos-resized to match `a`. Images smaller
/// than the 8x8 window in either dimension fall back to a global
/// mean/variance comparison.
pub fn ssim(a: ImgRef<'_, RGBA8>, b: ImgRef<'_, RGBA8>) -> f64 {
    let (w, h) = (a.width(), a.height());

    let resized;
    let b = if b.width() != w || b.height() != h {
        resized = lanczos_resize(b, w, h);
        resized.as_ref()
    } else {
        b
    };

    if w < WINDOW || h < WINDOW {
        return global_ssim(a, b);
    }

    let lum_a = luminance_plane(a);
    let lum_b = luminance_plane(b);
    windowed_ssim(&lum_a, &lum_b, w, h)
}

/// SSIM after box-downsampling both images into a 512-pixel bounding box.
///
/// The approximation error is small (the downsample is shared by both
/// sides) and the speedup is what makes encode/measure loops practical.
pub fn ssim_fast(a: ImgRef<'_, RGBA8>, b: ImgRef<'_, RGBA8>) -> f64 {
    let (mut w, mut h) = (a.width(), a.height());

    let resized;
    let b = if b.width() != w || b.height() != h {
        resized = lanczos_resize(b, w, h);
        resized.as_ref()
    } else {
        b
    };

    let shrunk: (ImgVec<RGBA8>, ImgVec<RGBA8>);
    let (a, b) = if w > FAST_MAX_DIM || h > FAST_MAX_DIM {
        let scale = FAST_MAX_DIM as f64 / w.max(h) as f64;
        let nw = ((w as f64 * scale).round() as usize).max(WINDOW);
        let nh = ((h as f64 * scale).round() as usize).max(WINDOW);
        shrunk = (box_downsample(a, nw, nh), box_downsample(b, nw, nh));
        w = nw;
        h = nh;
        (shrunk.0.as_ref(), shrunk.1.as_ref())
    } else {
        (a, b)
    };

    if w < WINDOW || h < WINDOW {
        return global_ssim(a, b);
    }

    let lum_a = luminance_plane(a);
    let lum_b = luminance_plane(b);
    windowed_ssim(&lum_a, &lum_b, w, h)
}

/// Multi-scale SSIM: a weighted log-mean of fast SSIM at up to five
/// half-stepped scales.
///
/// Scales whose minimum dimension would drop below the window are skipped
/// and the remaining weights renormalized.
pub fn ms_ssim(a: ImgRef<'_, RGBA8>, b: ImgRef<'_, RGBA8>) -> f64 {
    let (mut w, mut h) = (a.width(), a.height());

    let resized;
    let b = if b.width() != w || b.height() != h {
        resized = lanczos_resize(b, w, h);
        resized.as_ref()
    } else {
        b
    };

    let mut weights = vec![0.0448, 0.2856, 0.3001, 0.2363, 0.1333];

    // Drop the scales this image cannot form, renormalizing the rest.
    let levels = weights.len();
    for i in 0..levels - 1 {
        if w.min(h) < WINDOW {
            weights.truncate(i + 1);
            let sum: f64 = weights.iter().sum();
            for wt in &mut weights {
                *wt /= sum;
            }
            break;
        }
        w /= 2;
        h /= 2;
    }

    let mut cur_a = to_owned_buffer(a);
    let mut cur_b = to_owned_buffer(b);

    let mut acc = 0.0;
    for (i, &wt) in weights.iter().enumerate() {
        let s = ssim_fast(cur_a.as_ref(), cur_b.as_ref());
        acc += wt * s.max(1e-10).ln();

        if i < weights.len() - 1 {
            let nw = cur_a.width() / 2;
            let nh = cur_a.height() / 2;
            if nw < WINDOW || nh < WINDOW {
                break;
            }
            cur_a = box_downsample(cur_a.as_ref(), nw, nh);
            cur_b = box_downsample(cur_b.as_ref(), nw, nh);
        }
    }

    acc.exp()
}

/// Dense BT.601 luminance plane.
fn luminance_plane(img: ImgRef<'_, RGBA8>) -> Vec<f64> {
    let mut lum = Vec::with_capacity(img.width() * img.height());
    for row in img.rows() {
        for p in row {
            lum.push(luminance(p.r, p.g, p.b));
        }
    }
    lum
}

/// Normalized 2D Gaussian kernel over the window's offset grid.
fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f64> {
    let half = (size / 2) as isize;
    let mut kernel = Vec::with_capacity(size * size);
    let mut sum = 0.0;

    for y in -half..half {
        for x in -half..half {
            let v = (-((x * x + y * y) as f64) / (2.0 * sigma * sigma)).exp();
            kernel.push(v);
            sum += v;
        }
    }
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Slide the 8x8 Gaussian window over every interior position and average
/// the per-window indices.
///
/// Rows are processed in parallel; each row yields a `(sum, count)` pair and
/// the pairs are reduced sequentially in row order, so the score does not
/// depend on the worker count.
fn windowed_ssim(lum_a: &[f64], lum_b: &[f64], w: usize, h: usize) -> f64 {
    let half = WINDOW / 2;
    let kernel = gaussian_kernel(WINDOW, 1.5);

    let rows: Vec<(f64, usize)> = (half..h - half)
        .into_par_iter()
        .map(|y| {
            let mut row_sum = 0.0;
            let mut row_count = 0usize;

            for x in half..w - half {
                let (mut mu_a, mut mu_b) = (0.0, 0.0);

                let mut ki = 0;
                for wy in 0..WINDOW {
                    let base = (y - half + wy) * w + (x - half);
                    for wx in 0..WINDOW {
                        let weight = kernel[ki];
                        mu_a += lum_a[base + wx] * weight;
                        mu_b += lum_b[base + wx] * weight;
                        ki += 1;
                    }
                }

                let (mut sig_aa, mut sig_bb, mut sig_ab) = (0.0, 0.0, 0.0);
                ki = 0;
                for wy in 0..WINDOW {
                    let base = (y - half + wy) * w + (x - half);
                    for wx in 0..WINDOW {
                        let weight = kernel[ki];
                        let da = lum_a[base + wx] - mu_a;
                        let db = lum_b[base + wx] - mu_b;
                        sig_aa += da * da * weight;
                        sig_bb += db * db * weight;
                        sig_ab += da * db * weight;
                        ki += 1;
                    }
                }

                let num = (2.0 * mu_a * mu_b + C1) * (2.0 * sig_ab + C2);
                let den = (mu_a * mu_a + mu_b * mu_b + C1) * (sig_aa + sig_bb + C2);
                row_sum += num / den;
                row_count += 1;
            }

            (row_sum, row_count)
        })
        .collect();

    let (total, count) = rows
        .iter()
        .fold((0.0, 0usize), |(s, c), &(rs, rc)| (s + rs, c + rc));

    if count == 0 {
        return 1.0;
    }
    total / count as f64
}

/// Global mean/variance SSIM for images too small to window.
fn global_ssim(a: ImgRef<'_, RGBA8>, b: ImgRef<'_, RGBA8>) -> f64 {
    let n = (a.width() * a.height()) as f64;
    if n == 0.0 {
        return 1.0;
    }

    let lum_a = luminance_plane(a);
    let lum_b = luminance_plane(b);

    let mu_a: f64 = lum_a.iter().sum::<f64>() / n;
    let mu_b: f64 = lum_b.iter().sum::<f64>() / n;

    let (mut sig_aa, mut sig_bb, mut sig_ab) = (0.0, 0.0, 0.0);
    for (&la, &lb) in lum_a.iter().zip(&lum_b) {
        let da = la - mu_a;
        let db = lb - mu_b;
        sig_aa += da * da;
        sig_bb += db * db;
        sig_ab += da * db;
    }
    sig_aa /= n;
    sig_bb /= n;
    sig_ab /= n;

    let num = (2.0 * mu_a * mu_b + C1) * (2.0 * sig_ab + C2);
    let den = (mu_a * mu_a + mu_b * mu_b + C1) * (sig_aa + sig_bb + C2);
    num / den
}
