//! Resampling primitives: separable Lanczos-3 for final output quality and a
//! box filter for fast exploration during target-size search.

use imgref::{Img, ImgRef, ImgVec};
use rayon::prelude::*;
use rgb::RGBA8;

/// Lanczos-3 kernel support.
const LANCZOS_A: f64 = 3.0;

fn lanczos_kernel(x: f64) -> f64 {
    if x == 0.0 {
        return 1.0;
    }
    let x = x.abs();
    if x >= LANCZOS_A {
        return 0.0;
    }
    let xpi = x * std::f64::consts::PI;
    (LANCZOS_A * xpi.sin() * (xpi / LANCZOS_A).sin()) / (xpi * xpi)
}

/// Per-destination-position filter taps: `(source index, normalized weight)`.
///
/// Weights along one axis depend only on the source/destination lengths, so
/// they are computed once and reused across the orthogonal axis.
fn axis_weights(src_len: usize, dst_len: usize) -> Vec<Vec<(usize, f64)>> {
    let ratio = src_len as f64 / dst_len as f64;
    let support = if ratio > 1.0 { LANCZOS_A * ratio } else { LANCZOS_A };

    (0..dst_len)
        .map(|d| {
            let center = (d as f64 + 0.5) * ratio - 0.5;
            let left = ((center - support).ceil() as isize).max(0) as usize;
            let right = ((center + support).floor() as isize).min(src_len as isize - 1) as usize;

            let mut entries = Vec::with_capacity(right - left + 1);
            let mut sum = 0.0;
            for s in left..=right {
                let w = lanczos_kernel((s as f64 - center) / ratio.max(1.0));
                if w != 0.0 {
                    sum += w;
                    entries.push((s, w));
                }
            }
            if sum != 0.0 {
                for e in &mut entries {
                    e.1 /= sum;
                }
            }
            entries
        })
        .collect()
}

/// High-quality Lanczos-3 resize.
///
/// Two-pass separable filter (horizontal, then vertical) accumulating in
/// premultiplied-alpha space so transparency edges do not bleed color. Both
/// passes run row-parallel; each worker writes a disjoint row slice, and the
/// output is independent of the worker count.
///
/// An identity resize returns a byte-identical copy. Dimensions must be
/// non-zero.
pub fn lanczos_resize(src: ImgRef<'_, RGBA8>, dst_w: usize, dst_h: usize) -> ImgVec<RGBA8> {
    let (src_w, src_h) = (src.width(), src.height());
    assert!(src_w > 0 && src_h > 0 && dst_w > 0 && dst_h > 0);

    if src_w == dst_w && src_h == dst_h {
        return crate::convert::to_owned_buffer(src);
    }

    let tmp = resize_horizontal(src, dst_w);
    resize_vertical(tmp.as_ref(), dst_h)
}

fn resize_horizontal(src: ImgRef<'_, RGBA8>, dst_w: usize) -> ImgVec<RGBA8> {
    let (src_w, src_h) = (src.width(), src.height());
    let weights = axis_weights(src_w, dst_w);
    let src_buf = src.buf();
    let src_stride = src.stride();

    let mut buf = vec![RGBA8::new(0, 0, 0, 0); dst_w * src_h];
    buf.par_chunks_mut(dst_w).enumerate().for_each(|(y, out_row)| {
        let row = &src_buf[y * src_stride..y * src_stride + src_w];
        for (dx, out) in out_row.iter_mut().enumerate() {
            *out = filter_taps(&weights[dx], |s| row[s]);
        }
    });

    Img::new(buf, dst_w, src_h)
}

fn resize_vertical(src: ImgRef<'_, RGBA8>, dst_h: usize) -> ImgVec<RGBA8> {
    let (w, src_h) = (src.width(), src.height());
    let weights = axis_weights(src_h, dst_h);
    let src_buf = src.buf();
    let src_stride = src.stride();

    let mut buf = vec![RGBA8::new(0, 0, 0, 0); w * dst_h];
    buf.par_chunks_mut(w).enumerate().for_each(|(dy, out_row)| {
        for (x, out) in out_row.iter_mut().enumerate() {
            *out = filter_taps(&weights[dy], |s| src_buf[s * src_stride + x]);
        }
    });

    Img::new(buf, w, dst_h)
}

/// Accumulate one destination pixel from weighted source taps.
///
/// RGB is premultiplied by alpha before accumulation and re-normalized by the
/// accumulated alpha weight. A destination whose alpha weight is at or below
/// 0.5 is written as transparent black: float round-off in fully transparent
/// regions must not manufacture stray color.
fn filter_taps(taps: &[(usize, f64)], sample: impl Fn(usize) -> RGBA8) -> RGBA8 {
    let (mut r, mut g, mut b, mut a) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
    for &(s, w) in taps {
        let p = sample(s);
        let aw = f64::from(p.a) * w;
        r += f64::from(p.r) * aw;
        g += f64::from(p.g) * aw;
        b += f64::from(p.b) * aw;
        a += aw;
    }
    if a <= 0.5 {
        return RGBA8::new(0, 0, 0, 0);
    }
    let inv = 1.0 / a;
    RGBA8::new(
        clamp_u8(r * inv),
        clamp_u8(g * inv),
        clamp_u8(b * inv),
        clamp_u8(a),
    )
}

fn clamp_u8(x: f64) -> u8 {
    x.round().clamp(0.0, 255.0) as u8
}

/// Fast unweighted area-average resize.
///
/// Each destination pixel averages the source pixels of its axis-aligned
/// cell; degenerate empty spans clamp to a single source pixel. Used for
/// exploration probes and fast SSIM, never for final output.
pub fn box_downsample(src: ImgRef<'_, RGBA8>, dst_w: usize, dst_h: usize) -> ImgVec<RGBA8> {
    let (src_w, src_h) = (src.width(), src.height());
    assert!(src_w > 0 && src_h > 0 && dst_w > 0 && dst_h > 0);

    let src_buf = src.buf();
    let stride = src.stride();
    let x_ratio = src_w as f64 / dst_w as f64;
    let y_ratio = src_h as f64 / dst_h as f64;

    // An empty span (possible when a cell straddles less than one source
    // pixel) clamps to the single nearest pixel.
    let span = |d: usize, ratio: f64, limit: usize| -> (usize, usize) {
        let mut s0 = (d as f64 * ratio) as usize;
        let mut s1 = (((d + 1) as f64 * ratio) as usize).min(limit);
        if s0 >= s1 {
            s0 = s1.saturating_sub(1).min(limit - 1);
            s1 = s0 + 1;
        }
        (s0, s1)
    };

    let mut buf = Vec::with_capacity(dst_w * dst_h);
    for dy in 0..dst_h {
        let (sy0, sy1) = span(dy, y_ratio, src_h);

        for dx in 0..dst_w {
            let (sx0, sx1) = span(dx, x_ratio, src_w);

            let (mut r, mut g, mut b, mut a) = (0.0f64, 0.0, 0.0, 0.0);
            let mut count = 0.0f64;
            for sy in sy0..sy1 {
                for sx in sx0..sx1 {
                    let p = src_buf[sy * stride + sx];
                    r += f64::from(p.r);
                    g += f64::from(p.g);
                    b += f64::from(p.b);
                    a += f64::from(p.a);
                    count += 1.0;
                }
            }

            let inv = 1.0 / count;
            buf.push(RGBA8::new(
                clamp_u8(r * inv),
                clamp_u8(g * inv),
                clamp_u8(b * inv),
                clamp_u8(a * inv),
            ));
        }
    }

    Img::new(buf, dst_w, dst_h)
}

/// Resize to fit within `max_w` x `max_h` preserving aspect ratio.
///
/// A non-positive bound leaves that axis unconstrained. Returns `None` when
/// the image already fits.
pub fn fit_within(src: ImgRef<'_, RGBA8>, max_w: usize, max_h: usize) -> Option<ImgVec<RGBA8>> {
    let (src_w, src_h) = (src.width(), src.height());
    let max_w = if max_w == 0 { src_w } else { max_w };
    let max_h = if max_h == 0 { src_h } else { max_h };

    if src_w <= max_w && src_h <= max_h {
        return None;
    }

    let ratio = (max_w as f64 / src_w as f64).min(max_h as f64 / src_h as f64);
    let dst_w = ((src_w as f64 * ratio).round() as usize).max(1);
    let dst_h = ((src_h as f64 * ratio).round() as usize).max(1);
    Some(lanczos_resize(src, dst_w, dst_h))
}
