use imgref::{Img, ImgVec};
use rgb::RGBA8;
use zenpress::{
    CancelToken, CompressError, CompressOptions, Format, PixelSource, Policy, Quality,
};

fn gradient(w: usize, h: usize) -> ImgVec<RGBA8> {
    let mut buf = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            buf.push(RGBA8::new(
                (x * 255 / w) as u8,
                (y * 255 / h) as u8,
                ((x + y) % 256) as u8,
                255,
            ));
        }
    }
    Img::new(buf, w, h)
}

#[test]
fn smoke_quality_mode() {
    let img = gradient(120, 90);
    let result = zenpress::compress(img.as_ref(), &CompressOptions::default()).unwrap();

    assert!(!result.data.is_empty());
    assert_eq!(result.compressed_size, result.data.len());
    assert_eq!(result.original_dimensions, (120, 90));
    assert_eq!(result.final_dimensions, (120, 90));
    assert!(result.ssim > 0.0 && result.ssim <= 1.0);
    assert_ne!(result.format, Format::Auto, "Auto must be resolved");
}

#[test]
fn smoke_alpha_goes_png() {
    let mut img = gradient(64, 64);
    for p in img.buf_mut() {
        p.a = 180;
    }
    let result = zenpress::compress(img.as_ref(), &CompressOptions::default()).unwrap();
    assert_eq!(result.format, Format::Png);
    assert_eq!(result.ssim, 1.0);
    assert_eq!(result.jpeg_quality, 0);
}

#[test]
fn error_invalid_ssim_target() {
    let img = gradient(16, 16);
    for bad in [0.0, -0.5, 1.5, f64::NAN] {
        let opts = CompressOptions::new().target_ssim(bad);
        assert!(
            matches!(
                zenpress::compress(img.as_ref(), &opts),
                Err(CompressError::InvalidSsimTarget(_))
            ),
            "target {bad} accepted"
        );
    }
}

#[test]
fn error_zero_size_target() {
    let img = gradient(16, 16);
    let opts = CompressOptions::new().target_size(0);
    assert!(matches!(
        zenpress::compress(img.as_ref(), &opts),
        Err(CompressError::InvalidSizeTarget)
    ));
}

#[test]
fn error_empty_source() {
    struct Empty;
    impl PixelSource for Empty {
        fn dimensions(&self) -> (usize, usize) {
            (0, 0)
        }
        fn read_premultiplied(&self, _x: usize, _y: usize) -> [u16; 4] {
            [0; 4]
        }
    }
    assert!(matches!(
        zenpress::compress_source(&Empty, &CompressOptions::default()),
        Err(CompressError::EmptyImage)
    ));
}

#[test]
fn error_forced_jpeg_with_alpha() {
    let mut img = gradient(32, 32);
    img.buf_mut()[10].a = 0;
    let opts = CompressOptions::new().format(Format::Jpeg);
    assert!(matches!(
        zenpress::compress(img.as_ref(), &opts),
        Err(CompressError::UnsupportedFormat)
    ));
}

#[test]
fn error_pre_cancelled() {
    let img = gradient(64, 64);
    let token = CancelToken::new();
    token.cancel();
    let opts = CompressOptions::new().target_size(2000).cancel_token(token);
    assert!(matches!(
        zenpress::compress(img.as_ref(), &opts),
        Err(CompressError::Cancelled)
    ));
}

#[test]
fn preset_targets() {
    assert_eq!(Quality::Lossless.target_ssim(), 1.0);
    assert_eq!(Quality::Ultra.target_ssim(), 0.99);
    assert_eq!(Quality::High.target_ssim(), 0.97);
    assert_eq!(Quality::Balanced.target_ssim(), 0.94);
    assert_eq!(Quality::Aggressive.target_ssim(), 0.90);
    assert_eq!(Quality::Maximum.target_ssim(), 0.85);
    assert_eq!(Quality::default(), Quality::Balanced);
}

#[test]
fn option_defaults() {
    let opts = CompressOptions::default();
    assert_eq!(opts.policy, Policy::QualityTarget(0.94));
    assert_eq!(opts.format, Format::Auto);
    assert_eq!(opts.max_width, 0);
    assert_eq!(opts.max_height, 0);
    assert!(opts.chroma_subsampling);
    assert!(!opts.cancel.is_cancelled());
}

#[test]
fn display_names() {
    assert_eq!(Format::Jpeg.to_string(), "JPEG");
    assert_eq!(Format::Png.to_string(), "PNG");
    assert_eq!(Format::Auto.to_string(), "Auto");
    assert_eq!(Quality::Aggressive.to_string(), "Aggressive");
}

#[test]
fn quality_preset_converts_to_policy() {
    assert_eq!(Policy::from(Quality::High), Policy::QualityTarget(0.97));
    let opts = CompressOptions::new().quality(Quality::Maximum);
    assert_eq!(opts.policy, Policy::QualityTarget(0.85));
}

#[test]
fn result_statistics() {
    let img = gradient(100, 100);
    let result = zenpress::compress(img.as_ref(), &CompressOptions::default())
        .unwrap()
        .with_original_size(40_000);

    assert_eq!(result.original_size, Some(40_000));
    assert!(result.ratio > 0.0);
    assert!((result.savings_percent
        - (1.0 - result.compressed_size as f64 / 40_000.0) * 100.0)
        .abs()
        < 1e-9);

    let mut out = Vec::new();
    let written = result.write_to(&mut out).unwrap();
    assert_eq!(written, result.data.len());
    assert_eq!(out, result.data);
    assert_eq!(result.bytes(), &out[..]);
}
