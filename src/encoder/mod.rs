//! Streaming JPEG encoder session.
//!
//! A session is configured with an [`Output`], started with an input pixel
//! format and stream colour space, fed rows with [`EncoderSession::write`]
//! and closed with [`EncoderSession::finish`]. The session can be reused for
//! any number of images.

use std::path::Path;

use crate::binding::{IoMode, Output, OutputBinding, WriteSeek};
use crate::codec::{
    guarded, CodecError, CodecFactory, Compress, CompressParams, FaultContext, MAX_DIMENSION,
};
use crate::config::normalize_quality;
use crate::conversion::EncodeConversion;
use crate::error::{Result, SessionError};
use crate::format::{ColorSpace, PixelFormat};
use crate::rows::RowCache;

/// Where the finished stream ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishStatus {
    /// Stream or path mode: bytes written to the destination.
    Written(u64),
    /// Memory mode: the whole stream fit the caller's buffer.
    InPlace(usize),
    /// Memory mode: the stream is in the session buffer ([`EncoderSession::buffered_data`]).
    Buffered(usize),
}

impl FinishStatus {
    /// Length of the encoded stream.
    pub fn byte_count(&self) -> u64 {
        match *self {
            FinishStatus::Written(n) => n,
            FinishStatus::InPlace(n) | FinishStatus::Buffered(n) => n as u64,
        }
    }
}

/// JPEG encoder session.
pub struct EncoderSession<'io> {
    codec: Box<dyn Compress>,
    binding: OutputBinding<'io>,
    rows: RowCache,
    fault: FaultContext,
    working: bool,
    quality: u8,
    buffered: Vec<u8>,
    conversion: Option<EncodeConversion>,
}

impl Default for EncoderSession<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'io> EncoderSession<'io> {
    /// Create an unconfigured session using the default codec.
    pub fn new() -> Self {
        Self::with_codec(CodecFactory::compressor())
    }

    /// Create an unconfigured session around a specific codec object.
    pub fn with_codec(codec: Box<dyn Compress>) -> Self {
        Self {
            codec,
            binding: OutputBinding::new(),
            rows: RowCache::new(),
            fault: FaultContext::default(),
            working: false,
            quality: normalize_quality(0),
            buffered: Vec::new(),
            conversion: None,
        }
    }

    /// Whether an image is in progress.
    pub fn is_working(&self) -> bool {
        self.working
    }

    /// Configured output mode.
    pub fn mode(&self) -> Option<IoMode> {
        self.binding.mode()
    }

    /// Quality applied at the next start.
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Conversion of the image in progress.
    pub fn conversion(&self) -> Option<EncodeConversion> {
        self.conversion
    }

    /// Message of the most recent codec fault.
    pub fn last_fault(&self) -> Option<&str> {
        self.fault.last()
    }

    /// Bind the output and set the quality (`0` selects the default).
    pub fn configure(&mut self, output: Output<'io>, quality: u8) -> Result<()> {
        if self.working {
            return Err(SessionError::SessionBusy);
        }
        self.binding.configure(output)?;
        self.quality = normalize_quality(quality);
        log::debug!(
            "encoder configured for {} output, quality {}",
            self.binding.mode().map_or("no".to_string(), |m| m.to_string()),
            self.quality
        );
        Ok(())
    }

    /// Encode into `buf`, or into a session buffer when `None`.
    pub fn configure_memory(&mut self, buf: Option<&'io mut [u8]>, quality: u8) -> Result<()> {
        self.configure(Output::Memory(buf), quality)
    }

    /// Encode into a seekable stream at its current position.
    pub fn configure_stream(&mut self, stream: &'io mut dyn WriteSeek, quality: u8) -> Result<()> {
        self.configure(Output::Stream(stream), quality)
    }

    /// Encode into a file. The path is copied; the file is created at start.
    pub fn configure_path(&mut self, path: impl AsRef<Path>, quality: u8) -> Result<()> {
        if self.working {
            return Err(SessionError::SessionBusy);
        }
        self.binding.configure_path(path.as_ref())?;
        self.quality = normalize_quality(quality);
        log::debug!(
            "encoder configured for {}, quality {}",
            path.as_ref().display(),
            self.quality
        );
        Ok(())
    }

    /// Begin an image of `width` x `height` pixels.
    pub fn start(
        &mut self,
        input: PixelFormat,
        color_space: ColorSpace,
        width: u32,
        height: u32,
    ) -> Result<()> {
        if self.working {
            return Err(SessionError::SessionBusy);
        }
        let conversion = EncodeConversion::new(input, color_space).ok_or_else(|| {
            SessionError::UnsupportedConversion(format!("{} => {}", input, color_space))
        })?;
        if width == 0 || height == 0 {
            return Err(SessionError::ZeroSizeImage { width, height });
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(SessionError::OversizeImage {
                width,
                height,
                max: MAX_DIMENSION,
            });
        }
        if self.binding.mode().is_none() {
            return Err(SessionError::Unconfigured);
        }

        self.buffered.clear();
        if let Err(e) = self.binding.activate() {
            self.shutdown();
            return Err(e);
        }

        let params = CompressParams {
            width,
            height,
            input_components: conversion.channels(),
            in_color_space: input.color_space().into(),
            jpeg_color_space: color_space.into(),
            quality: self.quality,
        };
        let codec = &mut self.codec;
        if let Err(e) = guarded(|| codec.start_compress(&params)) {
            return Err(self.fail(e));
        }

        self.conversion = Some(conversion);
        self.working = true;
        log::debug!("encoder started: {} {}x{}", conversion, width, height);
        Ok(())
    }

    /// Feed up to `row_count` rows from `src`, spaced `row_stride` bytes apart.
    ///
    /// Returns the rows accepted; `0` once every row has been written.
    pub fn write(&mut self, src: &[u8], row_stride: isize, row_count: usize) -> Result<usize> {
        if !self.working {
            return Err(SessionError::NotStarted);
        }
        let remaining = self.codec.image_height().saturating_sub(self.codec.next_scanline()) as usize;
        let count = row_count.min(remaining);
        if count == 0 {
            return Ok(0);
        }

        let offsets = self
            .rows
            .layout(count, row_stride, self.codec.input_row_bytes(), src.len())?;
        let codec = &mut self.codec;
        let written = guarded(|| {
            let mut done = 0;
            while done < count {
                let n = codec.write_scanlines(src, &offsets[done..])?;
                if n == 0 {
                    break;
                }
                done += n;
            }
            Ok(done)
        });

        written.map_err(|e| self.fail(e))
    }

    /// Complete the image and flush it to the destination.
    pub fn finish(&mut self) -> Result<FinishStatus> {
        if !self.working {
            return Err(SessionError::NotStarted);
        }

        let Self {
            codec,
            binding,
            buffered,
            ..
        } = self;
        let result = match binding.sink(buffered) {
            Ok(mut sink) => guarded(|| {
                let n = codec.finish_compress(&mut sink)?;
                Ok(sink.status(n))
            }),
            Err(e) => Err(CodecError::from(e)),
        };

        match result {
            Ok(status) => {
                self.shutdown();
                log::debug!("encoder finished: {:?}", status);
                Ok(status)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Abandon the image in progress. Does nothing when idle.
    pub fn abort(&mut self) {
        if self.working {
            log::debug!("encoder aborted");
            self.shutdown();
        }
    }

    /// Session-owned output of the last spilled memory-mode finish.
    pub fn buffered_data(&self) -> &[u8] {
        &self.buffered
    }

    /// Length of [`EncoderSession::buffered_data`].
    pub fn buffered_size(&self) -> usize {
        self.buffered.len()
    }

    /// Encode a whole image held in `src`.
    pub fn encode_whole(
        &mut self,
        input: PixelFormat,
        color_space: ColorSpace,
        src: &[u8],
        row_stride: isize,
        width: u32,
        height: u32,
    ) -> Result<FinishStatus> {
        self.start(input, color_space, width, height)?;
        let mut total = 0usize;
        while total < height as usize {
            let n = match self.write(src, row_stride, height as usize) {
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
        self.finish()
    }

    fn shutdown(&mut self) {
        self.codec.abort();
        self.binding.deactivate();
        self.working = false;
        self.conversion = None;
    }

    fn fail(&mut self, err: CodecError) -> SessionError {
        let message = match err {
            CodecError::Rejected(m) | CodecError::Fatal(m) => m,
        };
        log::warn!("encoder codec fault: {}", message);
        self.fault.record(&message);
        self.shutdown();
        SessionError::CodecFault(message)
    }
}

impl Drop for EncoderSession<'_> {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecResult;
    use std::io::{self, Cursor, Seek, SeekFrom, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn solid(width: u32, height: u32, pixel: &[u8]) -> Vec<u8> {
        pixel.repeat((width * height) as usize)
    }

    struct PanickingCompressor {
        aborts: Arc<AtomicUsize>,
    }

    impl Compress for PanickingCompressor {
        fn start_compress(&mut self, _params: &CompressParams) -> CodecResult<()> {
            Ok(())
        }
        fn next_scanline(&self) -> u32 {
            0
        }
        fn image_height(&self) -> u32 {
            4
        }
        fn input_row_bytes(&self) -> usize {
            4
        }
        fn write_scanlines(&mut self, _src: &[u8], _rows: &[usize]) -> CodecResult<usize> {
            panic!("corrupt state");
        }
        fn finish_compress(&mut self, _dest: &mut dyn Write) -> CodecResult<u64> {
            Ok(0)
        }
        fn abort(&mut self) {
            self.aborts.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for BrokenSink {
        fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn test_quality_defaults() {
        let mut session = EncoderSession::new();
        session.configure_memory(None, 0).unwrap();
        assert_eq!(session.quality(), 75);
        session.configure_memory(None, 250).unwrap();
        assert_eq!(session.quality(), 100);
    }

    #[test]
    fn test_every_table_pair_encodes() {
        for conv in EncodeConversion::ALL {
            let format = conv.input_format();
            let src = solid(8, 8, &vec![100u8; format.channels() as usize]);
            let mut session = EncoderSession::new();
            session.configure_memory(None, 80).unwrap();
            let status = session
                .encode_whole(format, conv.jpeg_color_space(), &src, format.row_bytes(8) as isize, 8, 8)
                .unwrap_or_else(|e| panic!("{}: {}", conv, e));
            assert!(matches!(status, FinishStatus::Buffered(n) if n > 0));
            assert_eq!(&session.buffered_data()[..2], &[0xFF, 0xD8]);
        }
    }

    #[test]
    fn test_pairs_outside_table_rejected() {
        let mut session = EncoderSession::new();
        session.configure_memory(None, 80).unwrap();
        for format in PixelFormat::ALL {
            for cs in ColorSpace::ALL {
                let result = session.start(format, cs, 8, 8);
                if EncodeConversion::new(format, cs).is_some() {
                    assert!(result.is_ok(), "{} => {}", format, cs);
                    session.abort();
                } else {
                    assert!(matches!(result, Err(SessionError::UnsupportedConversion(_))));
                    assert!(!session.is_working());
                }
            }
        }
    }

    #[test]
    fn test_unsupported_before_binding() {
        let mut session = EncoderSession::new();
        let err = session
            .start(PixelFormat::GRAY, ColorSpace::Cmyk, 4, 4)
            .unwrap_err();
        assert!(matches!(err, SessionError::UnsupportedConversion(_)));
        assert!(session.mode().is_none());

        let err = session.start(PixelFormat::GRAY, ColorSpace::Gray, 4, 4).unwrap_err();
        assert!(matches!(err, SessionError::Unconfigured));
    }

    #[test]
    fn test_unsupported_leaves_stream_alone() {
        let mut cursor = Cursor::new(vec![7u8; 3]);
        cursor.set_position(2);
        {
            let mut session = EncoderSession::new();
            session.configure_stream(&mut cursor, 90).unwrap();
            assert!(session.start(PixelFormat::GRAY, ColorSpace::Cmyk, 4, 4).is_err());
        }
        assert_eq!(cursor.position(), 2);
        assert_eq!(cursor.get_ref(), &vec![7u8; 3]);
    }

    #[test]
    fn test_image_size_limits() {
        let mut session = EncoderSession::new();
        session.configure_memory(None, 80).unwrap();
        assert!(matches!(
            session.start(PixelFormat::RGB, ColorSpace::YCbCr, 0, 4),
            Err(SessionError::ZeroSizeImage { width: 0, height: 4 })
        ));
        assert!(matches!(
            session.start(PixelFormat::RGB, ColorSpace::YCbCr, 4, MAX_DIMENSION + 1),
            Err(SessionError::OversizeImage { .. })
        ));
        assert!(!session.is_working());
    }

    #[test]
    fn test_busy_and_not_started() {
        let mut session = EncoderSession::new();
        session.configure_memory(None, 80).unwrap();
        assert!(matches!(session.write(&[0; 4], 4, 1), Err(SessionError::NotStarted)));
        assert!(matches!(session.finish(), Err(SessionError::NotStarted)));

        session.start(PixelFormat::GRAY, ColorSpace::Gray, 4, 4).unwrap();
        assert!(matches!(session.configure_memory(None, 80), Err(SessionError::SessionBusy)));
        assert!(matches!(
            session.start(PixelFormat::GRAY, ColorSpace::Gray, 4, 4),
            Err(SessionError::SessionBusy)
        ));
        session.abort();
        assert!(!session.is_working());
    }

    #[test]
    fn test_write_clamps_then_returns_zero() {
        let src = solid(4, 20, &[50]);
        let mut session = EncoderSession::new();
        session.configure_memory(None, 80).unwrap();
        session.start(PixelFormat::GRAY, ColorSpace::Gray, 4, 20).unwrap();

        assert_eq!(session.write(&src, 4, 3).unwrap(), 3);
        assert_eq!(session.write(&src[12..], 4, 100).unwrap(), 17);
        assert_eq!(session.write(&src, 4, 5).unwrap(), 0);
        session.finish().unwrap();
    }

    #[test]
    fn test_write_rejects_short_source() {
        let mut session = EncoderSession::new();
        session.configure_memory(None, 80).unwrap();
        session.start(PixelFormat::RGB, ColorSpace::YCbCr, 4, 4).unwrap();
        let err = session.write(&[0u8; 20], 12, 2).unwrap_err();
        assert!(matches!(err, SessionError::InvalidParameter(_)));
        assert!(session.is_working());
        session.abort();
    }

    #[test]
    fn test_in_place_and_spilled_memory() {
        let src = solid(16, 16, &[10, 20, 30]);

        let mut big = vec![0u8; 64 * 1024];
        let n = {
            let mut session = EncoderSession::new();
            session.configure_memory(Some(&mut big[..]), 90).unwrap();
            match session
                .encode_whole(PixelFormat::RGB, ColorSpace::YCbCr, &src, 48, 16, 16)
                .unwrap()
            {
                FinishStatus::InPlace(n) => {
                    assert_eq!(session.buffered_size(), 0);
                    n
                }
                other => panic!("expected in-place, got {:?}", other),
            }
        };
        assert_eq!(&big[..2], &[0xFF, 0xD8]);

        let mut small = vec![0u8; 16];
        let mut session = EncoderSession::new();
        session.configure_memory(Some(&mut small[..]), 90).unwrap();
        let status = session
            .encode_whole(PixelFormat::RGB, ColorSpace::YCbCr, &src, 48, 16, 16)
            .unwrap();
        assert_eq!(status, FinishStatus::Buffered(n));
        assert_eq!(session.buffered_data(), &big[..n]);
        drop(session);
        assert_eq!(&small[..], &big[..16]);
    }

    #[test]
    fn test_stream_output_appends() {
        let src = solid(8, 8, &[128]);
        let mut cursor = Cursor::new(b"HEADER".to_vec());
        cursor.seek(SeekFrom::End(0)).unwrap();
        let mut lengths = Vec::new();
        {
            let mut session = EncoderSession::new();
            session.configure_stream(&mut cursor, 85).unwrap();
            for _ in 0..2 {
                let status = session
                    .encode_whole(PixelFormat::GRAY, ColorSpace::Gray, &src, 8, 8, 8)
                    .unwrap();
                let FinishStatus::Written(n) = status else {
                    panic!("expected written, got {:?}", status);
                };
                lengths.push(n);
            }
        }
        let (first, second) = (lengths[0], lengths[1]);
        assert_eq!(cursor.position(), 6 + first + second);
        assert_eq!(cursor.get_ref().len() as u64, 6 + first + second);

        let bytes = cursor.get_ref();
        assert_eq!(&bytes[6..8], &[0xFF, 0xD8]);
        let second_at = (6 + first) as usize;
        assert_eq!(&bytes[second_at - 2..second_at + 2], &[0xFF, 0xD9, 0xFF, 0xD8]);
    }

    #[test]
    fn test_path_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.jpg");
        let src = solid(8, 8, &[1, 2, 3, 4]);

        let mut session = EncoderSession::new();
        session.configure_path(&out, 80).unwrap();
        assert!(!out.exists());
        let status = session
            .encode_whole(PixelFormat::CMYK, ColorSpace::Cmyk, &src, 32, 8, 8)
            .unwrap();
        let written = std::fs::read(&out).unwrap();
        assert_eq!(status, FinishStatus::Written(written.len() as u64));
    }

    #[test]
    fn test_missing_directory_fails_open() {
        let dir = TempDir::new().unwrap();
        let mut session = EncoderSession::new();
        session
            .configure_path(dir.path().join("nope").join("out.jpg"), 80)
            .unwrap();
        let err = session.start(PixelFormat::GRAY, ColorSpace::Gray, 4, 4).unwrap_err();
        assert!(matches!(err, SessionError::OpenFailed(_)));
        assert!(!session.is_working());
    }

    #[test]
    fn test_sink_failure_is_recoverable() {
        let src = solid(8, 8, &[200]);
        let mut broken = BrokenSink;
        let mut session = EncoderSession::new();
        session.configure_stream(&mut broken, 80).unwrap();
        let err = session
            .encode_whole(PixelFormat::GRAY, ColorSpace::Gray, &src, 8, 8, 8)
            .unwrap_err();
        assert!(err.is_codec_fault());
        assert!(!session.is_working());
        assert!(session.last_fault().unwrap().contains("sink closed"));

        session.configure_memory(None, 80).unwrap();
        session
            .encode_whole(PixelFormat::GRAY, ColorSpace::Gray, &src, 8, 8, 8)
            .unwrap();
        assert!(session.buffered_size() > 0);
    }

    #[test]
    fn test_finish_early_is_fault() {
        let mut session = EncoderSession::new();
        session.configure_memory(None, 80).unwrap();
        session.start(PixelFormat::GRAY, ColorSpace::Gray, 4, 4).unwrap();
        session.write(&[0u8; 8], 4, 2).unwrap();
        assert!(session.finish().unwrap_err().is_codec_fault());
        assert!(!session.is_working());
    }

    #[test]
    fn test_codec_panic_aborts_session() {
        let aborts = Arc::new(AtomicUsize::new(0));
        let mut session = EncoderSession::with_codec(Box::new(PanickingCompressor {
            aborts: aborts.clone(),
        }));
        session.configure_memory(None, 80).unwrap();
        session.start(PixelFormat::CMYK, ColorSpace::Cmyk, 1, 4).unwrap();
        let before = aborts.load(Ordering::SeqCst);

        let err = session.write(&[0u8; 16], 4, 4).unwrap_err();
        assert!(err.is_codec_fault());
        assert!(!session.is_working());
        assert_eq!(aborts.load(Ordering::SeqCst), before + 1);
        assert!(session.last_fault().unwrap().contains("corrupt state"));
    }
}
