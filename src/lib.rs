//! Streaming JPEG Session Library
//!
//! Scanline-at-a-time JPEG encoding and decoding over an external codec,
//! with three interchangeable I/O bindings (caller memory, seekable stream,
//! file path) and recovery from fatal codec errors.
//!
//! # Features
//!
//! - **Sessions**: reusable [`DecoderSession`] / [`EncoderSession`] state machines
//! - **Conversions**: validated pixel-format to JPEG colour-space tables,
//!   including big-gamut RGB and YCbCr
//! - **Fault recovery**: a codec failure (including a panic) shuts the
//!   session down cleanly and leaves it reusable
//! - **Tooling**: raster pipeline, parallel batch transcoding and the `jsess` CLI
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use jpeg_session::{ColorSpace, DecoderSession, EncoderSession, PixelFormat};
//!
//! let pixels = vec![200u8; 4 * 4 * 3];
//! let mut encoder = EncoderSession::new();
//! encoder.configure_memory(None, 90)?;
//! encoder.encode_whole(PixelFormat::RGB, ColorSpace::YCbCr, &pixels, 12, 4, 4)?;
//!
//! let mut decoder = DecoderSession::new();
//! decoder.configure_memory(encoder.buffered_data())?;
//! let image = decoder.decode_to_vec(PixelFormat::RGB)?;
//! assert_eq!((image.width, image.height), (4, 4));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod binding;
pub mod cli;
pub mod codec;
pub mod config;
pub mod conversion;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod format;
pub mod metrics;
pub mod pipeline;
pub mod rows;

// Re-export commonly used types
pub use binding::{Input, IoMode, Output};
pub use codec::{CodecFactory, MAX_DIMENSION};
pub use config::{DecoderSettings, SessionConfig};
pub use conversion::{DecodeConversion, EncodeConversion};
pub use decoder::{DecodedImage, DecoderSession, ImageInfo};
pub use encoder::{EncoderSession, FinishStatus};
pub use error::{Result, SessionError};
pub use format::{ColorSpace, PixelFormat};

/// Library version information.
pub mod version {
    /// Library version string.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Library name.
    pub const NAME: &str = env!("CARGO_PKG_NAME");

    /// Get full version string.
    pub fn full_version() -> String {
        format!("{} {}", NAME, VERSION)
    }
}
