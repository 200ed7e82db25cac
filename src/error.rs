use thiserror::Error;

/// Errors produced by the compression engine.
///
/// Strategy failures inside the target-size search are not surfaced through
/// this type; the search records them as "no candidate" and moves on. Only
/// cancellation and failures on the final emit path reach the caller.
#[derive(Debug, Error)]
pub enum CompressError {
    #[error("image dimensions cannot be zero")]
    EmptyImage,

    #[error("SSIM target {0} is outside (0, 1]")]
    InvalidSsimTarget(f64),

    #[error("byte-size target must be positive")]
    InvalidSizeTarget,

    #[error("cannot encode an image with transparency as JPEG")]
    UnsupportedFormat,

    #[error("image is too large for JPEG encoding ({width}x{height}, max 65535)")]
    TooLargeForJpeg { width: usize, height: usize },

    #[error("JPEG encoder: {0}")]
    JpegEncode(#[from] jpeg_encoder::EncodingError),

    #[error("JPEG decoder: {0}")]
    JpegDecode(#[from] jpeg_decoder::Error),

    #[error("JPEG decoder produced an unsupported pixel format")]
    UnsupportedJpegPixelFormat,

    #[error("PNG encoder: {0}")]
    PngEncode(#[from] png::EncodingError),

    #[error("operation cancelled")]
    Cancelled,
}
