//! JPEG codec boundary.
//!
//! This module wraps the external JPEG libraries behind the [`Decompress`]
//! and [`Compress`] traits:
//! - decompression via `jpeg-decoder`
//! - compression via `jpeg-encoder`
//!
//! Colour spaces the libraries do not tag themselves (plain RGB, big-gamut
//! RGB/YCbCr) are handled by retagging the stream markers.

pub mod color;
mod compress;
mod decompress;
mod guard;
pub mod markers;
mod traits;

pub use compress::JpegCompressor;
pub use decompress::JpegDecompressor;
pub use guard::{guarded, FaultContext};
pub use traits::{Compress, CompressParams, Decompress, HeaderInfo};

use thiserror::Error;

/// Largest width or height accepted by the compressor.
pub const MAX_DIMENSION: u32 = 65500;

/// Colour-space enumeration native to the codec layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JpegColorSpace {
    /// Unspecified.
    #[default]
    Unknown,
    /// Monochrome.
    Grayscale,
    /// Red/green/blue.
    Rgb,
    /// Y/Cb/Cr (JFIF).
    YCbCr,
    /// C/M/Y/K.
    Cmyk,
    /// Y/Cb/Cr/K.
    Ycck,
    /// Big-gamut red/green/blue.
    BgRgb,
    /// Big-gamut Y/Cb/Cr.
    BgYcc,
}

/// Result type for codec calls.
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Error raised by a codec call.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The byte stream was rejected while reading its header.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Unrecoverable error; the codec object must be aborted.
    #[error("{0}")]
    Fatal(String),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        CodecError::Fatal(format!("I/O error: {}", err))
    }
}

/// Factory for creating codec objects.
pub struct CodecFactory;

impl CodecFactory {
    /// Default decompression object.
    pub fn decompressor() -> Box<dyn Decompress> {
        Box::new(JpegDecompressor::new())
    }

    /// Default compression object.
    pub fn compressor() -> Box<dyn Compress> {
        Box::new(JpegCompressor::new())
    }
}
