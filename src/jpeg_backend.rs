//! Baseline JPEG encode/decode plumbing and the SSIM-guided quality search.

use imgref::{Img, ImgRef, ImgVec};
use jpeg_encoder::{ColorType, Encoder, SamplingFactor};
use rgb::{ComponentBytes, RGBA8};

use crate::convert::to_owned_buffer;
use crate::error::CompressError;
use crate::ssim::ssim_fast;

/// Encode to baseline JPEG at the given quality (1-100).
///
/// The encoder consumes RGBA directly and ignores the alpha byte, so opaque
/// buffers are fed without any channel-stripping copy; only a caller-supplied
/// stride wider than the row forces a compaction first.
pub(crate) fn encode_jpeg(
    img: ImgRef<'_, RGBA8>,
    quality: u8,
    subsample: bool,
) -> Result<Vec<u8>, CompressError> {
    let (w, h) = (img.width(), img.height());
    if w > usize::from(u16::MAX) || h > usize::from(u16::MAX) {
        return Err(CompressError::TooLargeForJpeg { width: w, height: h });
    }

    let mut out = Vec::new();
    let mut encoder = Encoder::new(&mut out, quality);
    encoder.set_sampling_factor(if subsample {
        SamplingFactor::F_2_2 // 4:2:0
    } else {
        SamplingFactor::F_1_1 // 4:4:4
    });

    if img.stride() == w {
        let pixels = &img.buf()[..w * h];
        encoder.encode(pixels.as_bytes(), w as u16, h as u16, ColorType::Rgba)?;
    } else {
        let compact = to_owned_buffer(img);
        encoder.encode(compact.buf().as_bytes(), w as u16, h as u16, ColorType::Rgba)?;
    }

    Ok(out)
}

/// Decode a JPEG stream back to the canonical RGBA buffer.
pub(crate) fn decode_jpeg(data: &[u8]) -> Result<ImgVec<RGBA8>, CompressError> {
    let mut decoder = jpeg_decoder::Decoder::new(data);
    let pixels = decoder.decode()?;
    let info = decoder
        .info()
        .ok_or(CompressError::UnsupportedJpegPixelFormat)?;
    let (w, h) = (usize::from(info.width), usize::from(info.height));

    let buf: Vec<RGBA8> = match info.pixel_format {
        jpeg_decoder::PixelFormat::RGB24 => pixels
            .chunks_exact(3)
            .map(|c| RGBA8::new(c[0], c[1], c[2], 255))
            .collect(),
        jpeg_decoder::PixelFormat::L8 => {
            pixels.iter().map(|&v| RGBA8::new(v, v, v, 255)).collect()
        }
        _ => return Err(CompressError::UnsupportedJpegPixelFormat),
    };

    Ok(Img::new(buf, w, h))
}

/// Outcome of the quality search: the winning probe, bytes included.
pub(crate) struct OptimalJpeg {
    pub quality: u8,
    pub ssim: f64,
    pub data: Vec<u8>,
}

/// Binary-search the lowest JPEG quality whose round-tripped SSIM meets
/// `target_ssim`.
///
/// Every accepted probe caches its encoded bytes, and the winner's bytes are
/// returned as-is: re-encoding at the winning quality is forbidden, since
/// encoders are not guaranteed to reproduce a byte stream.
///
/// If no probe reaches the target, the rejected probe with the best observed
/// SSIM (the highest quality tried) is returned instead.
pub(crate) fn compress_jpeg_optimal(
    src: ImgRef<'_, RGBA8>,
    target_ssim: f64,
    subsample: bool,
) -> Result<OptimalJpeg, CompressError> {
    // Preheat the lower bound: high targets never accept low qualities, so
    // skipping the bottom of the range saves encode/decode round trips.
    let mut lo: i32 = if target_ssim >= 0.99 {
        75
    } else if target_ssim >= 0.97 {
        50
    } else if target_ssim >= 0.94 {
        30
    } else if target_ssim >= 0.90 {
        15
    } else {
        1
    };
    let mut hi: i32 = 100;

    let mut accepted: Option<OptimalJpeg> = None;
    let mut closest: Option<OptimalJpeg> = None;

    while lo <= hi {
        let mid = (lo + hi) / 2;

        let data = encode_jpeg(src, mid as u8, subsample)?;
        let decoded = decode_jpeg(&data)?;
        let measured = ssim_fast(src, decoded.as_ref());

        if measured >= target_ssim {
            accepted = Some(OptimalJpeg {
                quality: mid as u8,
                ssim: measured,
                data,
            });
            hi = mid - 1;
        } else {
            if closest.as_ref().map_or(true, |c| measured > c.ssim) {
                closest = Some(OptimalJpeg {
                    quality: mid as u8,
                    ssim: measured,
                    data,
                });
            }
            lo = mid + 1;
        }
    }

    let Some(result) = accepted.or(closest) else {
        unreachable!("the search probes at least one quality");
    };
    Ok(result)
}
