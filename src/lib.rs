#![forbid(unsafe_code)]

//! SSIM-guided image compression.
//!
//! Given a decoded image and a policy — a perceptual-quality target or a
//! byte-size target — zenpress produces the smallest JPEG or PNG stream that
//! satisfies it, choosing format, encoder quality, and output dimensions
//! automatically:
//!
//! - SSIM-guided quality search: binary search for the smallest file that
//!   still meets a structural-similarity target
//! - Target-size search: quality, palette quantization, and downscaling
//!   strategies competing to fit a byte budget
//! - Adaptive format selection: JPEG or PNG from image content analysis
//! - Perceptual color quantization and indexed PNG output
//! - High-quality Lanczos-3 resizing with premultiplied-alpha handling
//!
//! The engine is a pure, synchronous transformation over in-memory pixel
//! buffers ([`imgref::ImgRef`] of [`rgb::RGBA8`]); decoding files into that
//! form and writing the result out is the caller's business.

use std::fmt;
use std::io;

pub mod analyze;
mod cancel;
pub mod convert;
mod error;
mod jpeg_backend;
pub mod median_cut;
mod png_backend;
pub mod remap;
pub mod resample;
pub mod ssim;
mod target_size;

pub use cancel::CancelToken;
pub use convert::{PixelSource, PremultipliedRgba16};
pub use error::CompressError;

pub use imgref::{Img, ImgRef, ImgVec};
pub use rgb::RGBA8;

use convert::to_owned_buffer;

/// Output image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Choose the best format from image analysis.
    #[default]
    Auto,
    /// JPEG for photographs and complex images.
    Jpeg,
    /// PNG for images with transparency, text, or sharp edges.
    Png,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Auto => "Auto",
            Format::Jpeg => "JPEG",
            Format::Png => "PNG",
        })
    }
}

/// Quality presets, each a named SSIM target.
///
/// The default is `Balanced`, the recommended general-purpose setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    /// SSIM >= 0.94 — great quality, strong compression.
    #[default]
    Balanced,
    /// Every pixel preserved; reaches 1.0 only through PNG.
    Lossless,
    /// SSIM >= 0.99 — visually identical to the original.
    Ultra,
    /// SSIM >= 0.97 — excellent quality, good compression.
    High,
    /// SSIM >= 0.90 — good quality, maximum compression.
    Aggressive,
    /// SSIM >= 0.85 — acceptable quality, extreme compression.
    Maximum,
}

impl Quality {
    /// The SSIM floor this preset promises.
    pub fn target_ssim(self) -> f64 {
        match self {
            Quality::Lossless => 1.0,
            Quality::Ultra => 0.99,
            Quality::High => 0.97,
            Quality::Balanced => 0.94,
            Quality::Aggressive => 0.90,
            Quality::Maximum => 0.85,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Quality::Lossless => "Lossless",
            Quality::Ultra => "Ultra",
            Quality::High => "High",
            Quality::Balanced => "Balanced",
            Quality::Aggressive => "Aggressive",
            Quality::Maximum => "Maximum",
        })
    }
}

/// What the engine optimizes for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Policy {
    /// Produce the smallest output whose measured SSIM meets the target,
    /// which must lie in `(0, 1]`.
    QualityTarget(f64),
    /// Produce an output of at most this many bytes, going over only when
    /// no strategy fits.
    SizeTarget(usize),
}

impl Default for Policy {
    fn default() -> Self {
        Policy::QualityTarget(Quality::Balanced.target_ssim())
    }
}

impl From<Quality> for Policy {
    fn from(q: Quality) -> Self {
        Policy::QualityTarget(q.target_ssim())
    }
}

/// Configuration for a compression run.
#[derive(Debug, Clone)]
pub struct CompressOptions {
    /// Optimization policy (default: the `Balanced` quality preset).
    pub policy: Policy,
    /// Output format. `Auto` resolves via content analysis.
    pub format: Format,
    /// Constrain output width; 0 means unconstrained. Aspect ratio is
    /// always preserved.
    pub max_width: usize,
    /// Constrain output height; 0 means unconstrained.
    pub max_height: usize,
    /// 4:2:0 chroma subsampling for JPEG (default: true). Eyes resolve far
    /// less color detail than luminance detail.
    pub chroma_subsampling: bool,
    /// Cancellation token checked between search steps.
    pub cancel: CancelToken,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            policy: Policy::default(),
            format: Format::Auto,
            max_width: 0,
            max_height: 0,
            chroma_subsampling: true,
            cancel: CancelToken::new(),
        }
    }
}

impl CompressOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target a quality preset.
    pub fn quality(mut self, q: Quality) -> Self {
        self.policy = q.into();
        self
    }

    /// Target a custom SSIM value in `(0, 1]`.
    pub fn target_ssim(mut self, ssim: f64) -> Self {
        self.policy = Policy::QualityTarget(ssim);
        self
    }

    /// Target an output size in bytes.
    pub fn target_size(mut self, bytes: usize) -> Self {
        self.policy = Policy::SizeTarget(bytes);
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn max_width(mut self, px: usize) -> Self {
        self.max_width = px;
        self
    }

    pub fn max_height(mut self, px: usize) -> Self {
        self.max_height = px;
        self
    }

    pub fn chroma_subsampling(mut self, enabled: bool) -> Self {
        self.chroma_subsampling = enabled;
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }
}

/// Compression outcome: the encoded stream plus everything measured along
/// the way.
#[derive(Debug)]
pub struct CompressResult {
    /// The final processed pixels (resized and/or quantized).
    pub image: ImgVec<RGBA8>,
    /// The encoded bytes, exactly as produced by the winning probe.
    pub data: Vec<u8>,
    /// The chosen output format.
    pub format: Format,
    /// Source dimensions before any resize.
    pub original_dimensions: (usize, usize),
    /// Output dimensions.
    pub final_dimensions: (usize, usize),
    /// JPEG quality used; 0 for PNG output.
    pub jpeg_quality: u8,
    /// Measured structural similarity between source and output.
    pub ssim: f64,
    /// Source byte count, if the caller supplied one.
    pub original_size: Option<usize>,
    /// Encoded output size in bytes.
    pub compressed_size: usize,
    /// `original / compressed`, 0 until the original size is known.
    pub ratio: f64,
    /// Percentage of bytes saved, 0 until the original size is known.
    pub savings_percent: f64,
}

impl CompressResult {
    /// The encoded bytes. Writing these verbatim preserves target-size
    /// precision; re-encoding `image` would not.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Write the encoded bytes to `w`.
    pub fn write_to<W: io::Write>(&self, w: &mut W) -> io::Result<usize> {
        w.write_all(&self.data)?;
        Ok(self.data.len())
    }

    /// Attach the source byte count and derive ratio statistics from it.
    pub fn with_original_size(mut self, bytes: usize) -> Self {
        self.original_size = Some(bytes);
        if bytes > 0 && self.compressed_size > 0 {
            self.ratio = bytes as f64 / self.compressed_size as f64;
            self.savings_percent = (1.0 - self.compressed_size as f64 / bytes as f64) * 100.0;
        }
        self
    }
}

/// Compress a canonical RGBA image under the given options.
///
/// The buffer may carry a stride wider than its row; the engine never
/// mutates it.
pub fn compress(
    image: ImgRef<'_, RGBA8>,
    options: &CompressOptions,
) -> Result<CompressResult, CompressError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(CompressError::EmptyImage);
    }
    match options.policy {
        Policy::QualityTarget(t) if !(t > 0.0 && t <= 1.0) => {
            return Err(CompressError::InvalidSsimTarget(t));
        }
        Policy::SizeTarget(0) => return Err(CompressError::InvalidSizeTarget),
        _ => {}
    }
    options.cancel.check()?;

    let original_dimensions = (image.width(), image.height());

    // Constrained dimensions get one aspect-preserving Lanczos resize before
    // any policy runs.
    let resized;
    let src = if options.max_width > 0 || options.max_height > 0 {
        match resample::fit_within(image, options.max_width, options.max_height) {
            Some(r) => {
                resized = r;
                resized.as_ref()
            }
            None => image,
        }
    } else {
        image
    };

    options.cancel.check()?;

    match options.policy {
        Policy::SizeTarget(target) => {
            let c = target_size::hit_target_size(src, target, options)?;
            let compressed_size = c.data.len();
            Ok(CompressResult {
                image: c.image,
                data: c.data,
                format: c.format,
                original_dimensions,
                final_dimensions: (c.final_w, c.final_h),
                jpeg_quality: c.quality,
                ssim: c.ssim,
                original_size: None,
                compressed_size,
                ratio: 0.0,
                savings_percent: 0.0,
            })
        }
        Policy::QualityTarget(target) => {
            if options.format == Format::Jpeg && !convert::is_opaque(src) {
                return Err(CompressError::UnsupportedFormat);
            }

            let format = match options.format {
                Format::Auto => convert::analyze_format(src),
                f => f,
            };
            let final_dimensions = (src.width(), src.height());

            let (data, jpeg_quality, ssim) = if format == Format::Png {
                // PNG is lossless by construction.
                (png_backend::compress_png(src)?, 0, 1.0)
            } else {
                let opt =
                    jpeg_backend::compress_jpeg_optimal(src, target, options.chroma_subsampling)?;
                (opt.data, opt.quality, opt.ssim)
            };

            let compressed_size = data.len();
            Ok(CompressResult {
                image: to_owned_buffer(src),
                data,
                format,
                original_dimensions,
                final_dimensions,
                jpeg_quality,
                ssim,
                original_size: None,
                compressed_size,
                ratio: 0.0,
                savings_percent: 0.0,
            })
        }
    }
}

/// Compress any [`PixelSource`], canonicalizing it first.
///
/// Sources already in canonical form are borrowed, not copied.
pub fn compress_source<S: PixelSource + ?Sized>(
    source: &S,
    options: &CompressOptions,
) -> Result<CompressResult, CompressError> {
    let (w, h) = source.dimensions();
    if w == 0 || h == 0 {
        return Err(CompressError::EmptyImage);
    }

    if let Some(canonical) = source.as_canonical() {
        return compress(canonical, options);
    }

    let owned = convert::to_canonical(source)?;
    compress(owned.as_ref(), options)
}
