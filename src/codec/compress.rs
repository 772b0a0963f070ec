//! Compression object backed by `jpeg-encoder`.
//!
//! Rows are converted into the payload layout as they are written and
//! held until `finish_compress`, where the whole image is encoded at once and
//! the stream's colour tags are adjusted for colour spaces the encoder does
//! not label itself.

use std::io::Write;

use jpeg_encoder::{ColorType, Encoder, SamplingFactor};

use super::color::Transform;
use super::markers::{self, Retag, IDS_BG_RGB, IDS_RGB};
use super::traits::{Compress, CompressParams};
use super::{CodecError, CodecResult, JpegColorSpace, MAX_DIMENSION};

/// Rows accepted per `write_scanlines` call.
const ROWS_PER_PASS: usize = 16;

#[derive(Debug, Clone, Copy)]
struct EncodePlan {
    transform: Transform,
    color_type: ColorType,
    full_chroma: bool,
    retag: Option<Retag>,
}

impl EncodePlan {
    fn new(input: JpegColorSpace, stored: JpegColorSpace) -> Option<Self> {
        use JpegColorSpace::*;
        let simple = |transform, color_type| EncodePlan {
            transform,
            color_type,
            full_chroma: false,
            retag: None,
        };
        let plan = match (input, stored) {
            (Grayscale, Grayscale) => simple(Transform::Copy(1), ColorType::Luma),
            (Rgb, Grayscale) => simple(Transform::RgbToGray, ColorType::Luma),
            (YCbCr, Grayscale) | (BgYcc, Grayscale) => simple(Transform::TakeLuma, ColorType::Luma),
            (Rgb, YCbCr) => simple(Transform::Copy(3), ColorType::Rgb),
            (YCbCr, YCbCr) => simple(Transform::Copy(3), ColorType::Ycbcr),
            (Rgb, Rgb) => EncodePlan {
                full_chroma: true,
                retag: Some(Retag::untransformed(IDS_RGB)),
                ..simple(Transform::Copy(3), ColorType::Ycbcr)
            },
            (BgRgb, BgRgb) => EncodePlan {
                full_chroma: true,
                retag: Some(Retag::untransformed(IDS_BG_RGB)),
                ..simple(Transform::Copy(3), ColorType::Ycbcr)
            },
            (BgYcc, BgYcc) | (Rgb, BgYcc) | (YCbCr, BgYcc) => {
                let transform = match input {
                    Rgb => Transform::RgbToBgYcc,
                    YCbCr => Transform::YccToBgYcc,
                    _ => Transform::Copy(3),
                };
                EncodePlan {
                    retag: Some(Retag::BG_YCC),
                    ..simple(transform, ColorType::Ycbcr)
                }
            }
            (Cmyk, Cmyk) => simple(Transform::Copy(4), ColorType::Cmyk),
            (Cmyk, Ycck) => simple(Transform::Copy(4), ColorType::CmykAsYcck),
            (Ycck, Ycck) => simple(Transform::YcckToCmyk, ColorType::CmykAsYcck),
            _ => return None,
        };
        Some(plan)
    }
}

/// `jpeg-encoder` adapter accepting scanline-at-a-time input.
#[derive(Debug, Default)]
pub struct JpegCompressor {
    plan: Option<EncodePlan>,
    quality: u8,
    width: u32,
    height: u32,
    next_scanline: u32,
    payload: Vec<u8>,
    encoded: Vec<u8>,
    tagged: Vec<u8>,
}

impl JpegCompressor {
    /// Create an idle compressor.
    pub fn new() -> Self {
        Self::default()
    }

    fn started(&self) -> CodecResult<EncodePlan> {
        self.plan
            .ok_or_else(|| CodecError::Fatal("compression not started".into()))
    }
}

impl Compress for JpegCompressor {
    fn start_compress(&mut self, params: &CompressParams) -> CodecResult<()> {
        self.abort();

        if params.width == 0
            || params.height == 0
            || params.width > MAX_DIMENSION
            || params.height > MAX_DIMENSION
        {
            return Err(CodecError::Fatal(format!(
                "bad image size {}x{}",
                params.width, params.height
            )));
        }
        let plan = EncodePlan::new(params.in_color_space, params.jpeg_color_space).ok_or_else(|| {
            CodecError::Fatal(format!(
                "no colour conversion {:?} => {:?}",
                params.in_color_space, params.jpeg_color_space
            ))
        })?;
        if plan.transform.src_channels() != params.input_components as usize {
            return Err(CodecError::Fatal(format!(
                "{:?} input needs {} components, got {}",
                params.in_color_space,
                plan.transform.src_channels(),
                params.input_components
            )));
        }

        let total = params.width as usize * params.height as usize * plan.transform.dst_channels();
        self.payload
            .try_reserve(total)
            .map_err(|e| CodecError::Fatal(format!("payload buffer: {}", e)))?;

        self.width = params.width;
        self.height = params.height;
        self.quality = params.quality.clamp(1, 100);
        self.plan = Some(plan);
        Ok(())
    }

    fn next_scanline(&self) -> u32 {
        self.next_scanline
    }

    fn image_height(&self) -> u32 {
        self.height
    }

    fn input_row_bytes(&self) -> usize {
        self.plan
            .map_or(0, |p| self.width as usize * p.transform.src_channels())
    }

    fn write_scanlines(&mut self, src: &[u8], rows: &[usize]) -> CodecResult<usize> {
        let plan = self.started()?;
        let remaining = (self.height - self.next_scanline) as usize;
        let count = rows.len().min(ROWS_PER_PASS).min(remaining);

        let src_bytes = self.input_row_bytes();
        let dst_bytes = self.width as usize * plan.transform.dst_channels();
        for &offset in &rows[..count] {
            let row = src
                .get(offset..offset + src_bytes)
                .ok_or_else(|| CodecError::Fatal("row outside source".into()))?;
            let at = self.payload.len();
            self.payload.resize(at + dst_bytes, 0);
            plan.transform.apply(row, &mut self.payload[at..]);
        }

        self.next_scanline += count as u32;
        Ok(count)
    }

    fn finish_compress(&mut self, dest: &mut dyn Write) -> CodecResult<u64> {
        let plan = self.started()?;
        if self.next_scanline < self.height {
            return Err(CodecError::Fatal(format!(
                "finish with {} of {} scanlines written",
                self.next_scanline, self.height
            )));
        }

        self.encoded.clear();
        let mut encoder = Encoder::new(&mut self.encoded, self.quality);
        if plan.full_chroma {
            encoder.set_sampling_factor(SamplingFactor::F_1_1);
        }
        encoder
            .encode(
                &self.payload,
                self.width as u16,
                self.height as u16,
                plan.color_type,
            )
            .map_err(|e| CodecError::Fatal(e.to_string()))?;

        let stream: &[u8] = match plan.retag {
            Some(retag) => {
                markers::rewrite(&self.encoded, &retag, &mut self.tagged)?;
                &self.tagged
            }
            None => &self.encoded,
        };
        dest.write_all(stream)?;
        dest.flush()?;

        log::debug!(
            "compressed {}x{} {:?} into {} bytes (q={})",
            self.width,
            self.height,
            plan.color_type,
            stream.len(),
            self.quality
        );
        let written = stream.len() as u64;
        self.abort();
        Ok(written)
    }

    fn abort(&mut self) {
        self.plan = None;
        self.payload.clear();
        self.width = 0;
        self.height = 0;
        self.next_scanline = 0;
    }
}
