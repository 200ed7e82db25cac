//! Lossless PNG emission with automatic sub-format selection.
//!
//! Three tiers, cheapest representation first: exact indexed palette when at
//! most 256 distinct RGBA values exist, single-channel grayscale for opaque
//! `R == G == B` images, and full RGBA otherwise. Everything is written at
//! maximum deflate compression with adaptive filtering.

use imgref::ImgRef;
use rgb::{ComponentBytes, RGBA8};
use std::collections::HashMap;

use crate::convert::{is_grayscale, is_opaque, to_owned_buffer};
use crate::error::CompressError;
use crate::remap::IndexedImage;

/// Encode losslessly, picking the cheapest PNG sub-format the pixels allow.
pub(crate) fn compress_png(img: ImgRef<'_, RGBA8>) -> Result<Vec<u8>, CompressError> {
    if let Some(indexed) = try_palettize(img, 256) {
        return encode_indexed_png(&indexed);
    }
    // The grayscale tier drops the alpha channel, so it also requires
    // opacity; a translucent grayscale image falls through to RGBA.
    if is_grayscale(img) && is_opaque(img) {
        return encode_grayscale_png(img);
    }
    encode_rgba_png(img)
}

/// Build an exact color map if the image has at most `max_colors` distinct
/// RGBA values; bail out with `None` the moment one more is seen.
fn try_palettize(img: ImgRef<'_, RGBA8>, max_colors: usize) -> Option<IndexedImage> {
    let mut index_of: HashMap<RGBA8, u8> = HashMap::with_capacity(max_colors);
    let mut palette: Vec<RGBA8> = Vec::with_capacity(max_colors);
    let mut indices = Vec::with_capacity(img.width() * img.height());

    for row in img.rows() {
        for &p in row {
            let next = palette.len() as u8;
            let idx = *index_of.entry(p).or_insert_with(|| {
                palette.push(p);
                next
            });
            if palette.len() > max_colors {
                return None;
            }
            indices.push(idx);
        }
    }

    Some(IndexedImage {
        palette,
        indices,
        width: img.width(),
        height: img.height(),
    })
}

fn new_encoder(out: &mut Vec<u8>, w: usize, h: usize) -> png::Encoder<'static, &mut Vec<u8>> {
    let mut encoder = png::Encoder::new(out, w as u32, h as u32);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(png::Compression::Best);
    encoder.set_adaptive_filter(png::AdaptiveFilterType::Adaptive);
    encoder
}

/// Indexed PNG: `PLTE` holds the exact palette, `tRNS` is emitted only when
/// some entry is not fully opaque.
pub(crate) fn encode_indexed_png(indexed: &IndexedImage) -> Result<Vec<u8>, CompressError> {
    let mut out = Vec::new();
    {
        let mut encoder = new_encoder(&mut out, indexed.width, indexed.height);
        encoder.set_color(png::ColorType::Indexed);

        let flat: Vec<u8> = indexed
            .palette
            .iter()
            .flat_map(|p| [p.r, p.g, p.b])
            .collect();
        encoder.set_palette(flat);

        // Alpha table truncated at the last non-opaque entry; fully opaque
        // palettes need no tRNS chunk at all.
        let alphas: Vec<u8> = indexed.palette.iter().map(|p| p.a).collect();
        if let Some(last) = alphas.iter().rposition(|&a| a != 255) {
            encoder.set_trns(alphas[..=last].to_vec());
        }

        let mut writer = encoder.write_header()?;
        writer.write_image_data(&indexed.indices)?;
        writer.finish()?;
    }
    Ok(out)
}

fn encode_grayscale_png(img: ImgRef<'_, RGBA8>) -> Result<Vec<u8>, CompressError> {
    let mut gray = Vec::with_capacity(img.width() * img.height());
    for row in img.rows() {
        gray.extend(row.iter().map(|p| p.r));
    }

    let mut out = Vec::new();
    {
        let mut encoder = new_encoder(&mut out, img.width(), img.height());
        encoder.set_color(png::ColorType::Grayscale);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&gray)?;
        writer.finish()?;
    }
    Ok(out)
}

fn encode_rgba_png(img: ImgRef<'_, RGBA8>) -> Result<Vec<u8>, CompressError> {
    let (w, h) = (img.width(), img.height());

    let compact;
    let pixels: &[RGBA8] = if img.stride() == w {
        &img.buf()[..w * h]
    } else {
        compact = to_owned_buffer(img);
        compact.buf()
    };

    let mut out = Vec::new();
    {
        let mut encoder = new_encoder(&mut out, w, h);
        encoder.set_color(png::ColorType::Rgba);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(pixels.as_bytes())?;
        writer.finish()?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgref::{Img, ImgVec};

    fn decode_png(data: &[u8]) -> ImgVec<RGBA8> {
        let mut decoder = png::Decoder::new(data);
        decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::ALPHA);
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0u8; reader.output_buffer_size()];
        let frame = reader.next_frame(&mut buf).unwrap();
        buf.truncate(frame.buffer_size());

        let pixels: Vec<RGBA8> = match frame.color_type {
            png::ColorType::Rgba => buf
                .chunks_exact(4)
                .map(|c| RGBA8::new(c[0], c[1], c[2], c[3]))
                .collect(),
            png::ColorType::Rgb => buf
                .chunks_exact(3)
                .map(|c| RGBA8::new(c[0], c[1], c[2], 255))
                .collect(),
            png::ColorType::GrayscaleAlpha => buf
                .chunks_exact(2)
                .map(|c| RGBA8::new(c[0], c[0], c[0], c[1]))
                .collect(),
            png::ColorType::Grayscale => buf
                .iter()
                .map(|&g| RGBA8::new(g, g, g, 255))
                .collect(),
            other => panic!("unexpected decode color type {other:?}"),
        };
        Img::new(pixels, frame.width as usize, frame.height as usize)
    }

    #[test]
    fn few_colors_roundtrip_through_palette() {
        let colors = [
            RGBA8::new(255, 0, 0, 255),
            RGBA8::new(0, 255, 0, 255),
            RGBA8::new(0, 0, 255, 255),
        ];
        let buf: Vec<RGBA8> = (0..30 * 30).map(|i| colors[i % 3]).collect();
        let img: ImgVec<RGBA8> = Img::new(buf, 30, 30);

        let data = compress_png(img.as_ref()).unwrap();
        let back = decode_png(&data);
        assert_eq!(back.buf(), img.buf());
    }

    #[test]
    fn translucent_palette_keeps_alpha() {
        let colors = [RGBA8::new(10, 20, 30, 255), RGBA8::new(200, 100, 0, 80)];
        let buf: Vec<RGBA8> = (0..16 * 16).map(|i| colors[i % 2]).collect();
        let img: ImgVec<RGBA8> = Img::new(buf, 16, 16);

        let data = compress_png(img.as_ref()).unwrap();
        let back = decode_png(&data);
        assert_eq!(back.buf(), img.buf());
    }

    #[test]
    fn many_colors_roundtrip_through_rgba() {
        let mut buf = Vec::new();
        for y in 0..40usize {
            for x in 0..40usize {
                buf.push(RGBA8::new(
                    (x * 6) as u8,
                    (y * 6) as u8,
                    ((x * y) % 251) as u8,
                    255,
                ));
            }
        }
        let img: ImgVec<RGBA8> = Img::new(buf, 40, 40);
        let data = compress_png(img.as_ref()).unwrap();
        let back = decode_png(&data);
        assert_eq!(back.buf(), img.buf());
    }

    #[test]
    fn grayscale_tier_roundtrips_values() {
        let mut buf = Vec::new();
        for y in 0..20usize {
            for x in 0..20usize {
                let v = ((x * 13 + y * 7) % 256) as u8;
                buf.push(RGBA8::new(v, v, v, 255));
            }
        }
        let img: ImgVec<RGBA8> = Img::new(buf, 20, 20);

        let data = encode_grayscale_png(img.as_ref()).unwrap();
        let back = decode_png(&data);
        assert_eq!(back.buf(), img.buf());
    }

    #[test]
    fn translucent_gradient_preserves_alpha() {
        // Grayscale values with a sweeping alpha: more than 256 distinct
        // tuples, so neither the palette nor the grayscale tier may run.
        let mut buf = Vec::new();
        for y in 0..40usize {
            for x in 0..40usize {
                let v = ((x * 6) % 256) as u8;
                buf.push(RGBA8::new(v, v, v, ((y * 6) % 256) as u8));
            }
        }
        let img: ImgVec<RGBA8> = Img::new(buf, 40, 40);
        let data = compress_png(img.as_ref()).unwrap();
        let back = decode_png(&data);
        assert_eq!(back.buf(), img.buf());
    }
}
