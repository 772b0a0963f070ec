//! Codec trait definitions.
//!
//! These traits are the boundary between the sessions and the JPEG library.
//! They expose the primitive operations of a scanline codec and nothing more:
//! header parsing, start / transfer rows / finish, and abort.

use std::io::Write;

use super::{CodecResult, JpegColorSpace};

/// Header metadata reported by [`Decompress::read_header`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderInfo {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Number of components in the frame.
    pub components: u8,
    /// Colour space of the stream.
    pub color_space: JpegColorSpace,
}

/// Parameters declared to [`Compress::start_compress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressParams {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Components per input pixel.
    pub input_components: u8,
    /// Colour space of the rows handed to `write_scanlines`.
    pub in_color_space: JpegColorSpace,
    /// Colour space to store in the JPEG stream.
    pub jpeg_color_space: JpegColorSpace,
    /// Quality in `1..=100`.
    pub quality: u8,
}

/// Decompression object.
pub trait Decompress: Send {
    /// Parse markers up to the first scan.
    fn read_header(&mut self, data: &[u8]) -> CodecResult<HeaderInfo>;

    /// Begin decompression of `data` into `out_color_space`.
    ///
    /// `data` must be the same bytes passed to the preceding `read_header`.
    fn start_decompress(&mut self, data: &[u8], out_color_space: JpegColorSpace) -> CodecResult<()>;

    /// Rows delivered so far.
    fn output_scanline(&self) -> u32;

    /// Total rows in the output image.
    fn output_height(&self) -> u32;

    /// Bytes per output row.
    fn output_row_bytes(&self) -> usize;

    /// Fill rows at `rows` offsets of `dest`. May deliver fewer rows than offered.
    fn read_scanlines(&mut self, dest: &mut [u8], rows: &[usize]) -> CodecResult<usize>;

    /// Complete decompression. Errors if rows remain unread.
    fn finish_decompress(&mut self) -> CodecResult<()>;

    /// Drop any in-progress state. Always safe to call.
    fn abort(&mut self);
}

/// Compression object.
pub trait Compress: Send {
    /// Declare the image and begin compression.
    fn start_compress(&mut self, params: &CompressParams) -> CodecResult<()>;

    /// Rows accepted so far.
    fn next_scanline(&self) -> u32;

    /// Total rows declared at start.
    fn image_height(&self) -> u32;

    /// Bytes per input row.
    fn input_row_bytes(&self) -> usize;

    /// Consume rows at `rows` offsets of `src`. May accept fewer rows than offered.
    fn write_scanlines(&mut self, src: &[u8], rows: &[usize]) -> CodecResult<usize>;

    /// Complete compression, writing the stream to `dest`. Returns bytes written.
    fn finish_compress(&mut self, dest: &mut dyn Write) -> CodecResult<u64>;

    /// Drop any in-progress state. Always safe to call.
    fn abort(&mut self);
}
