//! Streaming JPEG decoder session.
//!
//! The session reads a JPEG stream from an [`Input`], optionally reports its
//! header through [`DecoderSession::query_info`], and hands decoded rows to
//! the caller in any supported output [`PixelFormat`].

use std::path::Path;

use serde::Serialize;

use crate::binding::{Input, InputBinding, IoMode, ReadSeek};
use crate::codec::{
    guarded, CodecError, CodecFactory, Decompress, FaultContext, HeaderInfo, JpegColorSpace,
};
use crate::config::DecoderSettings;
use crate::conversion::DecodeConversion;
use crate::error::{Result, SessionError};
use crate::format::{ColorSpace, PixelFormat};
use crate::rows::RowCache;

/// Header metadata of a JPEG stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ImageInfo {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Components in the stream.
    pub components: u8,
    /// Stream colour space.
    pub color_space: ColorSpace,
}

impl From<HeaderInfo> for ImageInfo {
    fn from(header: HeaderInfo) -> Self {
        Self {
            width: header.width,
            height: header.height,
            components: header.components,
            color_space: header.color_space.into(),
        }
    }
}

/// A fully decoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes from one row to the next.
    pub stride: usize,
    /// Layout of `pixels`.
    pub format: PixelFormat,
    /// Top-down rows, `stride` bytes apart.
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Pixel bytes of row `y`, without padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.pixels[start..start + self.format.row_bytes(self.width)]
    }

    /// Rows packed without padding.
    pub fn packed(&self) -> Vec<u8> {
        (0..self.height).flat_map(|y| self.row(y).iter().copied()).collect()
    }
}

/// JPEG decoder session.
pub struct DecoderSession<'io> {
    codec: Box<dyn Decompress>,
    binding: InputBinding<'io>,
    rows: RowCache,
    fault: FaultContext,
    working: bool,
    info: ImageInfo,
    settings: DecoderSettings,
}

impl Default for DecoderSession<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'io> DecoderSession<'io> {
    /// Create an unconfigured session using the default codec.
    pub fn new() -> Self {
        Self::with_codec(CodecFactory::decompressor())
    }

    /// Create an unconfigured session around a specific codec object.
    pub fn with_codec(codec: Box<dyn Decompress>) -> Self {
        Self {
            codec,
            binding: InputBinding::new(),
            rows: RowCache::new(),
            fault: FaultContext::default(),
            working: false,
            info: ImageInfo::default(),
            settings: DecoderSettings::default(),
        }
    }

    /// Replace the settings used by [`DecoderSession::decode_to_vec`].
    pub fn with_settings(mut self, settings: DecoderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Current settings.
    pub fn settings(&self) -> &DecoderSettings {
        &self.settings
    }

    /// Whether an image is in progress.
    pub fn is_working(&self) -> bool {
        self.working
    }

    /// Configured input mode.
    pub fn mode(&self) -> Option<IoMode> {
        self.binding.mode()
    }

    /// Metadata captured by the last header read.
    pub fn info(&self) -> ImageInfo {
        self.info
    }

    /// Message of the most recent codec fault.
    pub fn last_fault(&self) -> Option<&str> {
        self.fault.last()
    }

    /// Bind the input.
    pub fn configure(&mut self, input: Input<'io>) -> Result<()> {
        if self.working {
            return Err(SessionError::SessionBusy);
        }
        self.binding.configure(input)?;
        log::debug!(
            "decoder configured for {} input",
            self.binding.mode().map_or("no".to_string(), |m| m.to_string())
        );
        Ok(())
    }

    /// Decode from an encoded byte slice.
    pub fn configure_memory(&mut self, data: &'io [u8]) -> Result<()> {
        self.configure(Input::Memory(data))
    }

    /// Decode from a seekable stream at its current position.
    pub fn configure_stream(&mut self, stream: &'io mut dyn ReadSeek) -> Result<()> {
        self.configure(Input::Stream(stream))
    }

    /// Decode from a file. The path is copied; the file is opened at start.
    pub fn configure_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.working {
            return Err(SessionError::SessionBusy);
        }
        self.binding.configure_path(path.as_ref())?;
        log::debug!("decoder configured for {}", path.as_ref().display());
        Ok(())
    }

    /// Read only the header of the configured input.
    pub fn query_info(&mut self) -> Result<ImageInfo> {
        if self.binding.mode().is_none() {
            return Err(SessionError::Unconfigured);
        }
        if self.working {
            return Err(SessionError::SessionBusy);
        }
        if let Err(e) = self.binding.activate() {
            self.shutdown();
            return Err(e);
        }

        let header = self.read_header();
        self.shutdown();
        let header = header?;
        self.info = ImageInfo::from(header);
        log::debug!(
            "header: {}x{} {} ({} components)",
            self.info.width,
            self.info.height,
            self.info.color_space,
            self.info.components
        );
        Ok(self.info)
    }

    /// Begin decoding into `format`.
    ///
    /// The stream metadata is available through [`DecoderSession::info`]
    /// even when the conversion is then rejected.
    pub fn start(&mut self, format: PixelFormat) -> Result<ImageInfo> {
        if self.working {
            return Err(SessionError::SessionBusy);
        }
        self.info = ImageInfo::default();
        if self.binding.mode().is_none() {
            return Err(SessionError::Unconfigured);
        }
        if let Err(e) = self.binding.activate() {
            self.shutdown();
            return Err(e);
        }

        let header = match self.read_header() {
            Ok(header) => header,
            Err(e) => {
                self.shutdown();
                return Err(e);
            }
        };
        let info = ImageInfo::from(header);
        if info.color_space != ColorSpace::Unknown {
            self.info = info;
        }

        let Some(conversion) = DecodeConversion::new(format, info.color_space) else {
            self.shutdown();
            return Err(SessionError::UnsupportedConversion(format!(
                "{} => {}",
                info.color_space, format
            )));
        };

        let Self { codec, binding, .. } = self;
        let out: JpegColorSpace = format.color_space().into();
        let started = guarded(|| {
            let data = binding.input()?;
            codec.start_decompress(data, out)
        });
        if let Err(e) = started {
            return Err(self.fail(e));
        }

        self.working = true;
        log::debug!(
            "decoder started: {} {}x{}",
            conversion,
            info.width,
            info.height
        );
        Ok(info)
    }

    /// Read up to `row_count` rows into `dest`, spaced `row_stride` bytes apart.
    ///
    /// Returns the rows delivered; `0` once every row has been read. A
    /// negative stride fills `dest` from its last row upwards.
    pub fn read(&mut self, dest: &mut [u8], row_stride: isize, row_count: usize) -> Result<usize> {
        if !self.working {
            return Err(SessionError::NotStarted);
        }
        let remaining = self
            .codec
            .output_height()
            .saturating_sub(self.codec.output_scanline()) as usize;
        let count = row_count.min(remaining);
        if count == 0 {
            return Ok(0);
        }

        let offsets = self
            .rows
            .layout(count, row_stride, self.codec.output_row_bytes(), dest.len())?;
        let codec = &mut self.codec;
        let delivered = guarded(|| {
            let mut done = 0;
            while done < count {
                let n = codec.read_scanlines(dest, &offsets[done..])?;
                if n == 0 {
                    break;
                }
                done += n;
            }
            Ok(done)
        });

        delivered.map_err(|e| self.fail(e))
    }

    /// Complete decoding and release the input.
    pub fn finish(&mut self) -> Result<()> {
        if !self.working {
            return Err(SessionError::NotStarted);
        }
        let codec = &mut self.codec;
        match guarded(|| codec.finish_decompress()) {
            Ok(()) => {
                self.shutdown();
                log::debug!("decoder finished");
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Abandon the image in progress. Does nothing when idle.
    pub fn abort(&mut self) {
        if self.working {
            log::debug!("decoder aborted");
            self.shutdown();
        }
    }

    /// Decode the whole image into `dest`. Returns the rows delivered.
    pub fn decode_whole(
        &mut self,
        format: PixelFormat,
        dest: &mut [u8],
        row_stride: isize,
    ) -> Result<usize> {
        let info = self.start(format)?;
        let total = self.read_all(dest, row_stride, info.height as usize)?;
        self.finish()?;
        Ok(total)
    }

    /// Decode the whole image into a new buffer laid out per the session settings.
    pub fn decode_to_vec(&mut self, format: PixelFormat) -> Result<DecodedImage> {
        let info = self.start(format)?;
        let stride = self.settings.stride_for(format.row_bytes(info.width));
        let len = stride * info.height as usize;

        let mut pixels = Vec::new();
        if let Err(e) = pixels.try_reserve_exact(len) {
            self.abort();
            return Err(e.into());
        }
        pixels.resize(len, self.settings.pad_value);

        self.read_all(&mut pixels, stride as isize, info.height as usize)?;
        self.finish()?;
        Ok(DecodedImage {
            width: info.width,
            height: info.height,
            stride,
            format,
            pixels,
        })
    }

    fn read_all(&mut self, dest: &mut [u8], row_stride: isize, rows: usize) -> Result<usize> {
        let mut total = 0;
        while total < rows {
            let n = match self.read(dest, row_stride, rows) {
                Ok(n) => n,
                Err(e) => {
                    self.abort();
                    return Err(e);
                }
            };
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    fn read_header(&mut self) -> Result<HeaderInfo> {
        let Self { codec, binding, .. } = self;
        let header = guarded(|| {
            let data = binding.input()?;
            codec.read_header(data)
        });
        match header {
            Ok(header) => Ok(header),
            Err(CodecError::Rejected(m)) => Err(SessionError::HeaderReadFailed(m)),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn shutdown(&mut self) {
        self.codec.abort();
        self.binding.deactivate();
        self.working = false;
    }

    fn fail(&mut self, err: CodecError) -> SessionError {
        let message = match err {
            CodecError::Rejected(m) | CodecError::Fatal(m) => m,
        };
        log::warn!("decoder codec fault: {}", message);
        self.fault.record(&message);
        self.shutdown();
        SessionError::CodecFault(message)
    }
}

impl Drop for DecoderSession<'_> {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecResult;
    use crate::encoder::EncoderSession;
    use std::io::{self, Cursor, Read, Seek, SeekFrom};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Gray image whose row `y` has value `y * 16`.
    fn striped_gray(width: u32, height: u32) -> Vec<u8> {
        let mut session = EncoderSession::new();
        session.configure_memory(None, 95).unwrap();
        let src: Vec<u8> = (0..height)
            .flat_map(|y| std::iter::repeat((y * 16) as u8).take(width as usize))
            .collect();
        session
            .encode_whole(PixelFormat::GRAY, ColorSpace::Gray, &src, width as isize, width, height)
            .unwrap();
        session.buffered_data().to_vec()
    }

    fn solid_rgb(width: u32, height: u32, pixel: [u8; 3]) -> Vec<u8> {
        let mut session = EncoderSession::new();
        session.configure_memory(None, 90).unwrap();
        let src = pixel.repeat((width * height) as usize);
        session
            .encode_whole(PixelFormat::RGB, ColorSpace::YCbCr, &src, width as isize * 3, width, height)
            .unwrap();
        session.buffered_data().to_vec()
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "source went away"))
        }
    }

    impl Seek for FailingReader {
        fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
            Ok(0)
        }
    }

    struct PanickingDecompressor {
        aborts: Arc<AtomicUsize>,
    }

    impl Decompress for PanickingDecompressor {
        fn read_header(&mut self, _data: &[u8]) -> CodecResult<HeaderInfo> {
            panic!("huffman table overrun");
        }
        fn start_decompress(&mut self, _data: &[u8], _out: JpegColorSpace) -> CodecResult<()> {
            Ok(())
        }
        fn output_scanline(&self) -> u32 {
            0
        }
        fn output_height(&self) -> u32 {
            0
        }
        fn output_row_bytes(&self) -> usize {
            0
        }
        fn read_scanlines(&mut self, _dest: &mut [u8], _rows: &[usize]) -> CodecResult<usize> {
            Ok(0)
        }
        fn finish_decompress(&mut self) -> CodecResult<()> {
            Ok(())
        }
        fn abort(&mut self) {
            self.aborts.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_query_info() {
        let jpeg = striped_gray(8, 16);
        let mut session = DecoderSession::new();
        session.configure_memory(&jpeg).unwrap();
        let info = session.query_info().unwrap();
        assert_eq!(
            info,
            ImageInfo {
                width: 8,
                height: 16,
                components: 1,
                color_space: ColorSpace::Gray,
            }
        );
        assert!(!session.is_working());
        assert_eq!(session.info(), info);
    }

    #[test]
    fn test_query_info_rejects_non_jpeg() {
        let mut session = DecoderSession::new();
        assert!(matches!(session.query_info(), Err(SessionError::Unconfigured)));

        session.configure_memory(b"GIF89a not a jpeg").unwrap();
        let err = session.query_info().unwrap_err();
        assert!(matches!(err, SessionError::HeaderReadFailed(_)));
        assert!(!session.is_working());
        assert!(session.last_fault().is_none());
    }

    #[test]
    fn test_most_recent_configure_wins() {
        let jpeg = striped_gray(8, 8);
        let mut session = DecoderSession::new();
        session.configure_memory(b"garbage").unwrap();
        session.configure_memory(&jpeg).unwrap();
        assert_eq!(session.query_info().unwrap().width, 8);

        session.configure_memory(b"garbage").unwrap();
        assert!(session.query_info().is_err());
    }

    #[test]
    fn test_start_reports_info_on_bad_conversion() {
        let jpeg = striped_gray(8, 8);
        let mut session = DecoderSession::new();
        session.configure_memory(&jpeg).unwrap();
        let err = session.start(PixelFormat::CMYK).unwrap_err();
        assert!(matches!(err, SessionError::UnsupportedConversion(_)));
        assert!(!session.is_working());
        assert_eq!(session.info().color_space, ColorSpace::Gray);

        session.start(PixelFormat::RGB).unwrap();
        assert!(matches!(session.start(PixelFormat::RGB), Err(SessionError::SessionBusy)));
        assert!(matches!(session.configure_memory(&jpeg), Err(SessionError::SessionBusy)));
        session.abort();
    }

    #[test]
    fn test_read_clamps_then_returns_zero() {
        let jpeg = striped_gray(8, 16);
        let mut session = DecoderSession::new();
        session.configure_memory(&jpeg).unwrap();
        session.start(PixelFormat::GRAY).unwrap();

        let mut buf = vec![0u8; 8 * 100];
        assert_eq!(session.read(&mut buf, 8, 3).unwrap(), 3);
        assert_eq!(session.read(&mut buf, 8, 100).unwrap(), 13);
        assert_eq!(session.read(&mut buf, 8, 100).unwrap(), 0);
        session.finish().unwrap();
        assert!(matches!(session.read(&mut buf, 8, 1), Err(SessionError::NotStarted)));
    }

    #[test]
    fn test_negative_stride_is_bottom_up() {
        let jpeg = striped_gray(8, 16);
        let mut session = DecoderSession::new();
        session.configure_memory(&jpeg).unwrap();
        let mut buf = vec![0u8; 8 * 16];
        assert_eq!(session.decode_whole(PixelFormat::GRAY, &mut buf, -8).unwrap(), 16);

        let first = buf[15 * 8] as i32;
        let last = buf[0] as i32;
        assert!(first.abs_diff(0) <= 12, "top row {}", first);
        assert!(last.abs_diff(240) <= 12, "bottom row {}", last);
    }

    #[test]
    fn test_finish_early_is_fault_and_recoverable() {
        let jpeg = striped_gray(8, 16);
        let mut session = DecoderSession::new();
        session.configure_memory(&jpeg).unwrap();
        session.start(PixelFormat::GRAY).unwrap();
        let mut buf = vec![0u8; 8];
        session.read(&mut buf, 8, 1).unwrap();
        assert!(session.finish().unwrap_err().is_codec_fault());
        assert!(!session.is_working());

        let image = session.decode_to_vec(PixelFormat::GRAY).unwrap();
        assert_eq!(image.height, 16);
    }

    #[test]
    fn test_reader_failure_is_fault_and_recoverable() {
        let jpeg = solid_rgb(4, 4, [10, 200, 30]);
        let mut broken = FailingReader;
        let mut session = DecoderSession::new();
        session.configure_stream(&mut broken).unwrap();
        let err = session.query_info().unwrap_err();
        assert!(err.is_codec_fault());
        assert!(session.last_fault().unwrap().contains("source went away"));
        assert!(!session.is_working());

        session.configure_memory(&jpeg).unwrap();
        let info = session.start(PixelFormat::RGB).unwrap();
        assert_eq!((info.width, info.height), (4, 4));
        session.abort();
    }

    #[test]
    fn test_codec_panic_aborts_codec() {
        let aborts = Arc::new(AtomicUsize::new(0));
        let mut session = DecoderSession::with_codec(Box::new(PanickingDecompressor {
            aborts: aborts.clone(),
        }));
        session.configure_memory(b"\xFF\xD8\xFF\xD9").unwrap();
        let err = session.query_info().unwrap_err();
        assert!(err.is_codec_fault());
        assert!(aborts.load(Ordering::SeqCst) >= 1);
        assert!(session.last_fault().unwrap().contains("huffman table overrun"));
    }

    #[test]
    fn test_stream_position_restored() {
        let jpeg = striped_gray(8, 8);
        let mut bytes = b"prefix".to_vec();
        bytes.extend_from_slice(&jpeg);
        let mut cursor = Cursor::new(bytes);
        cursor.set_position(6);
        {
            let mut session = DecoderSession::new();
            session.configure_stream(&mut cursor).unwrap();
            let image = session.decode_to_vec(PixelFormat::GRAY).unwrap();
            assert_eq!(image.width, 8);
        }
        assert_eq!(cursor.position(), 6);
    }

    #[test]
    fn test_path_input() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("in.jpg");
        let mut session = DecoderSession::new();
        session.configure_path(&file).unwrap();
        assert!(matches!(session.start(PixelFormat::GRAY), Err(SessionError::OpenFailed(_))));

        std::fs::write(&file, striped_gray(8, 8)).unwrap();
        let info = session.query_info().unwrap();
        assert_eq!(info.color_space, ColorSpace::Gray);
    }

    #[test]
    fn test_decode_to_vec_pads_rows() {
        let jpeg = solid_rgb(3, 2, [0, 0, 255]);
        let mut session = DecoderSession::new();
        session.configure_memory(&jpeg).unwrap();
        let image = session.decode_to_vec(PixelFormat::RGB).unwrap();
        assert_eq!(image.stride, 12);
        assert_eq!(image.pixels.len(), 24);
        assert_eq!(&image.pixels[9..12], &[0xFF, 0xFF, 0xFF]);
        assert_eq!(image.packed().len(), 18);

        let mut session = DecoderSession::new().with_settings(DecoderSettings::packed());
        session.configure_memory(&jpeg).unwrap();
        let image = session.decode_to_vec(PixelFormat::RGB).unwrap();
        assert_eq!(image.stride, 9);
        assert_eq!(image.pixels.len(), 18);
    }
}
