//! Multi-strategy search for the smallest encoding that fits a byte budget.
//!
//! Four strategies run in order: plain JPEG quality search, median-cut
//! palette PNG, JPEG quality combined with downscaling, and a last-resort
//! scale search. Their candidates are scored by [`better_fit`] and the winner
//! is emitted. A strategy that errors simply contributes no candidate; only
//! cancellation aborts the whole search.

use imgref::{ImgRef, ImgVec};
use rgb::RGBA8;

use crate::cancel::CancelToken;
use crate::convert::{is_opaque, to_owned_buffer};
use crate::error::CompressError;
use crate::jpeg_backend::{decode_jpeg, encode_jpeg};
use crate::median_cut::median_cut;
use crate::png_backend::{compress_png, encode_indexed_png};
use crate::remap::apply_palette;
use crate::resample::{box_downsample, lanczos_resize};
use crate::ssim::ssim_fast;
use crate::{CompressOptions, Format};

/// Hard floor for JPEG quality at any resolution. Below this, blocking
/// artifacts dominate no matter what SSIM reports, and downscaling wins.
pub(crate) const MIN_JPEG_QUALITY: u8 = 20;

/// One strategy's proposal.
pub(crate) struct SizeCandidate {
    pub data: Vec<u8>,
    pub format: Format,
    /// JPEG quality; 0 for PNG output.
    pub quality: u8,
    pub ssim: f64,
    pub final_w: usize,
    pub final_h: usize,
    pub image: ImgVec<RGBA8>,
}

/// Result of one JPEG quality binary search, without the final image copy.
struct QualityFit {
    data: Vec<u8>,
    quality: u8,
    ssim: f64,
}

pub(crate) fn hit_target_size(
    src: ImgRef<'_, RGBA8>,
    target: usize,
    options: &CompressOptions,
) -> Result<SizeCandidate, CompressError> {
    let cancel = &options.cancel;
    let subsample = options.chroma_subsampling;

    let want_png = options.format == Format::Png;
    let want_jpeg = options.format == Format::Jpeg;
    let can_use_jpeg = !want_png && is_opaque(src);

    let mut candidates: Vec<SizeCandidate> = Vec::new();

    // Strategy 1: JPEG quality binary search at full resolution.
    cancel.check()?;
    if can_use_jpeg || want_jpeg {
        if let Some(fit) = keep(jpeg_quality_search(src, target, false, subsample))? {
            if fit.quality >= MIN_JPEG_QUALITY {
                candidates.push(SizeCandidate {
                    data: fit.data,
                    format: Format::Jpeg,
                    quality: fit.quality,
                    ssim: fit.ssim,
                    final_w: src.width(),
                    final_h: src.height(),
                    image: to_owned_buffer(src),
                });
            }
        }
    }

    // Strategy 2: median-cut quantization to indexed PNG.
    cancel.check()?;
    if !want_jpeg {
        if let Some(c) = keep(quantize_strategy(src, target))? {
            candidates.push(c);
        }
    }

    // Strategy 3: JPEG quality + scale.
    cancel.check()?;
    if can_use_jpeg || want_jpeg {
        if let Some(c) = keep(jpeg_quality_scale_search(src, target, subsample, cancel))? {
            candidates.push(c);
        }
    }

    // Strategy 4: scale search, only when nothing else produced a candidate.
    cancel.check()?;
    if candidates.is_empty() {
        let format = match options.format {
            Format::Auto => {
                if can_use_jpeg {
                    Format::Jpeg
                } else {
                    Format::Png
                }
            }
            f => f,
        };
        if let Some(c) = keep(scale_search(src, target, format, subsample, cancel))? {
            candidates.push(c);
        }
    }

    let mut best: Option<SizeCandidate> = None;
    for c in candidates {
        if best.as_ref().map_or(true, |b| better_fit(&c, b, target)) {
            best = Some(c);
        }
    }

    match best {
        Some(b) => Ok(b),
        None => fallback(src, can_use_jpeg || want_jpeg, subsample),
    }
}

/// Strategy errors become "no candidate"; cancellation still aborts.
fn keep<T>(r: Result<Option<T>, CompressError>) -> Result<Option<T>, CompressError> {
    match r {
        Err(CompressError::Cancelled) => Err(CompressError::Cancelled),
        Err(_) => Ok(None),
        ok => ok,
    }
}

/// Candidate ordering for a byte target: fitting beats not fitting, fitting
/// candidates compete on SSIM then JPEG quality, oversized ones on size.
fn better_fit(candidate: &SizeCandidate, current: &SizeCandidate, target: usize) -> bool {
    let c_under = candidate.data.len() <= target;
    let b_under = current.data.len() <= target;

    if c_under && !b_under {
        return true;
    }
    if !c_under && b_under {
        return false;
    }
    if c_under && b_under {
        if candidate.ssim != current.ssim {
            return candidate.ssim > current.ssim;
        }
        return candidate.quality > current.quality;
    }
    candidate.data.len() < current.data.len()
}

/// Binary-search the largest JPEG quality whose output fits the target.
///
/// Bounds are seeded from the target bits-per-pixel; `skip_ssim` drops the
/// decode/measure step for exploration probes where only the size matters.
fn jpeg_quality_search(
    src: ImgRef<'_, RGBA8>,
    target: usize,
    skip_ssim: bool,
    subsample: bool,
) -> Result<Option<QualityFit>, CompressError> {
    let pixels = src.width() * src.height();
    let target_bpp = (target * 8) as f64 / pixels as f64;

    let (mut lo, mut hi): (i32, i32) = (1, 100);
    if target_bpp < 0.5 {
        hi = 40;
    } else if target_bpp < 1.0 {
        lo = 10;
        hi = 70;
    } else if target_bpp < 2.0 {
        lo = 30;
        hi = 90;
    } else if target_bpp > 4.0 {
        lo = 60;
    }

    let mut best: Option<QualityFit> = None;

    while lo <= hi {
        let mid = (lo + hi) / 2;
        let data = encode_jpeg(src, mid as u8, subsample)?;

        if data.len() <= target {
            let ssim = if skip_ssim {
                0.0
            } else {
                ssim_fast(src, decode_jpeg(&data)?.as_ref())
            };
            best = Some(QualityFit {
                data,
                quality: mid as u8,
                ssim,
            });
            lo = mid + 1;
        } else {
            hi = mid - 1;
        }
    }

    Ok(best)
}

/// Try palettes of shrinking size until one's indexed PNG fits.
fn quantize_strategy(
    src: ImgRef<'_, RGBA8>,
    target: usize,
) -> Result<Option<SizeCandidate>, CompressError> {
    for &max_colors in &[256usize, 128, 64, 32, 16] {
        let palette = median_cut(src, max_colors);
        let indexed = apply_palette(src, &palette);

        let data = match encode_indexed_png(&indexed) {
            Ok(d) => d,
            Err(_) => continue,
        };

        if data.len() <= target {
            let rgba = indexed.to_rgba();
            let ssim = ssim_fast(src, rgba.as_ref());
            return Ok(Some(SizeCandidate {
                data,
                format: Format::Png,
                quality: 0,
                ssim,
                final_w: src.width(),
                final_h: src.height(),
                image: rgba,
            }));
        }
    }

    Ok(None)
}

/// The workhorse: find the largest scale at which some quality >= the floor
/// still fits, then emit a Lanczos resize at that scale.
///
/// Exploration uses the box downsampler and a size-only quality search.
/// JPEG size correlates but is not identical across resamplers, so the final
/// Lanczos output gets a full quality re-search to absorb the difference.
fn jpeg_quality_scale_search(
    src: ImgRef<'_, RGBA8>,
    target: usize,
    subsample: bool,
    cancel: &CancelToken,
) -> Result<Option<SizeCandidate>, CompressError> {
    let (orig_w, orig_h) = (src.width(), src.height());

    let mut best_scale: Option<f64> = None;
    let (mut lo, mut hi) = (0.05f64, 1.0f64);

    for _ in 0..10 {
        cancel.check()?;

        let mid = (lo + hi) / 2.0;
        let new_w = (orig_w as f64 * mid) as usize;
        let new_h = (orig_h as f64 * mid) as usize;
        if new_w < 8 || new_h < 8 {
            lo = mid;
            continue;
        }

        let scaled = box_downsample(src, new_w, new_h);
        match jpeg_quality_search(scaled.as_ref(), target, true, subsample) {
            Ok(Some(fit)) if fit.quality >= MIN_JPEG_QUALITY => {
                best_scale = Some(mid);
                lo = mid;
            }
            Err(CompressError::Cancelled) => return Err(CompressError::Cancelled),
            _ => hi = mid,
        }
    }

    // A few fixed scales catch plateaus the binary search skips over.
    for &scale in &[0.75, 0.50, 0.375, 0.25] {
        cancel.check()?;

        let new_w = (orig_w as f64 * scale) as usize;
        let new_h = (orig_h as f64 * scale) as usize;
        if new_w < 8 || new_h < 8 {
            continue;
        }

        let scaled = box_downsample(src, new_w, new_h);
        match jpeg_quality_search(scaled.as_ref(), target, true, subsample) {
            Ok(Some(fit)) if fit.quality >= MIN_JPEG_QUALITY => {
                if best_scale.map_or(true, |b| scale > b) {
                    best_scale = Some(scale);
                }
            }
            Err(CompressError::Cancelled) => return Err(CompressError::Cancelled),
            _ => {}
        }
    }

    let Some(scale) = best_scale else {
        return Ok(None);
    };

    let final_w = (orig_w as f64 * scale) as usize;
    let final_h = (orig_h as f64 * scale) as usize;
    let final_img = lanczos_resize(src, final_w, final_h);

    let fit = match jpeg_quality_search(final_img.as_ref(), target, false, subsample)? {
        Some(fit) if fit.quality >= MIN_JPEG_QUALITY => fit,
        _ => return Ok(None),
    };

    // Report similarity against the original, not the resized intermediate.
    let ssim = ssim_fast(src, final_img.as_ref());

    Ok(Some(SizeCandidate {
        data: fit.data,
        format: Format::Jpeg,
        quality: fit.quality,
        ssim,
        final_w,
        final_h,
        image: final_img,
    }))
}

/// Last resort: binary-search the largest scale whose encoding fits at all.
fn scale_search(
    src: ImgRef<'_, RGBA8>,
    target: usize,
    format: Format,
    subsample: bool,
    cancel: &CancelToken,
) -> Result<Option<SizeCandidate>, CompressError> {
    let (orig_w, orig_h) = (src.width(), src.height());

    let (mut lo, mut hi) = (0.05f64, 1.0f64);
    let mut best_scale = 0.0f64;
    let mut best_q = 0u8;

    for _ in 0..12 {
        cancel.check()?;

        let mid = (lo + hi) / 2.0;
        let new_w = (orig_w as f64 * mid) as usize;
        let new_h = (orig_h as f64 * mid) as usize;
        if new_w < 1 || new_h < 1 {
            lo = mid;
            continue;
        }

        let scaled = box_downsample(src, new_w, new_h);

        let (fits, q) = match format {
            Format::Jpeg => match jpeg_quality_search(scaled.as_ref(), target, true, subsample) {
                Ok(Some(fit)) if fit.quality >= MIN_JPEG_QUALITY => (true, fit.quality),
                Err(CompressError::Cancelled) => return Err(CompressError::Cancelled),
                _ => (false, 0),
            },
            _ => match compress_png(scaled.as_ref()) {
                Ok(d) => (d.len() <= target, 0),
                Err(_) => (false, 0),
            },
        };

        if fits {
            best_scale = mid;
            best_q = q;
            lo = mid;
        } else {
            hi = mid;
        }
    }

    if best_scale == 0.0 {
        return Ok(None);
    }

    let final_w = (orig_w as f64 * best_scale) as usize;
    let final_h = (orig_h as f64 * best_scale) as usize;
    let scaled = lanczos_resize(src, final_w, final_h);

    match format {
        Format::Jpeg => {
            let (data, quality) =
                match jpeg_quality_search(scaled.as_ref(), target, true, subsample)? {
                    Some(fit) => (fit.data, fit.quality),
                    // The Lanczos output can overshoot where the box probe
                    // fit; fall back to the explored quality.
                    None => (encode_jpeg(scaled.as_ref(), best_q, subsample)?, best_q),
                };
            let ssim = ssim_fast(src, scaled.as_ref());
            Ok(Some(SizeCandidate {
                data,
                format: Format::Jpeg,
                quality,
                ssim,
                final_w,
                final_h,
                image: scaled,
            }))
        }
        _ => {
            let data = compress_png(scaled.as_ref())?;
            let ssim = ssim_fast(src, scaled.as_ref());
            Ok(Some(SizeCandidate {
                data,
                format: Format::Png,
                quality: 0,
                ssim,
                final_w,
                final_h,
                image: scaled,
            }))
        }
    }
}

/// Every strategy failed: emit something usable regardless of fit.
fn fallback(
    src: ImgRef<'_, RGBA8>,
    jpeg_ok: bool,
    subsample: bool,
) -> Result<SizeCandidate, CompressError> {
    let (w, h) = (src.width(), src.height());

    if jpeg_ok {
        let data = encode_jpeg(src, 1, subsample)?;
        let decoded = decode_jpeg(&data)?;
        let ssim = ssim_fast(src, decoded.as_ref());
        return Ok(SizeCandidate {
            data,
            format: Format::Jpeg,
            quality: 1,
            ssim,
            final_w: w,
            final_h: h,
            image: to_owned_buffer(src),
        });
    }

    let data = compress_png(src)?;
    Ok(SizeCandidate {
        data,
        format: Format::Png,
        quality: 0,
        ssim: 1.0,
        final_w: w,
        final_h: h,
        image: to_owned_buffer(src),
    })
}
