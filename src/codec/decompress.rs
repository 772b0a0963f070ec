//! Decompression object backed by `jpeg-decoder`.

use jpeg_decoder::{Decoder, PixelFormat as DecodedLayout};

use super::color::Transform;
use super::markers::{self, Retag, StreamProbe};
use super::traits::{Decompress, HeaderInfo};
use super::{CodecError, CodecResult, JpegColorSpace};

/// Pick the transform from decoder output to the requested colour space.
///
/// Three-component streams are decoded as raw planes, so the transform
/// starts from the stored samples.
fn plan(source: JpegColorSpace, out: JpegColorSpace) -> Option<Transform> {
    use JpegColorSpace::*;
    let transform = match (source, out) {
        (Grayscale, Grayscale) => Transform::Copy(1),
        (Grayscale, Rgb) => Transform::GrayToRgb,
        (Rgb, Grayscale) => Transform::RgbToGray,
        (Rgb, Rgb) => Transform::Copy(3),
        (YCbCr, Grayscale) | (BgYcc, Grayscale) => Transform::TakeLuma,
        (YCbCr, Rgb) => Transform::YccToRgb,
        (YCbCr, YCbCr) => Transform::Copy(3),
        (BgYcc, Rgb) => Transform::BgYccToRgb,
        (BgYcc, BgYcc) => Transform::Copy(3),
        (BgRgb, BgRgb) => Transform::Copy(3),
        (Cmyk, Cmyk) | (Ycck, Cmyk) => Transform::Copy(4),
        (Ycck, Ycck) => Transform::CmykToYcck,
        _ => return None,
    };
    Some(transform)
}

fn layout_channels(layout: DecodedLayout) -> Option<usize> {
    match layout {
        DecodedLayout::L8 => Some(1),
        DecodedLayout::RGB24 => Some(3),
        DecodedLayout::CMYK32 => Some(4),
        _ => None,
    }
}

fn header_error(err: jpeg_decoder::Error) -> CodecError {
    match err {
        jpeg_decoder::Error::Format(msg) => CodecError::Rejected(msg),
        jpeg_decoder::Error::Unsupported(feature) => {
            CodecError::Rejected(format!("unsupported feature: {:?}", feature))
        }
        other => CodecError::Fatal(other.to_string()),
    }
}

/// `jpeg-decoder` adapter exposing scanline-at-a-time output.
#[derive(Debug, Default)]
pub struct JpegDecompressor {
    header: Option<StreamProbe>,
    normalized: Vec<u8>,
    decoded: Vec<u8>,
    transform: Option<Transform>,
    width: usize,
    height: u32,
    scanline: u32,
    rows_per_pass: usize,
}

impl JpegDecompressor {
    /// Create an idle decompressor.
    pub fn new() -> Self {
        Self::default()
    }

    fn started(&self) -> CodecResult<Transform> {
        self.transform
            .ok_or_else(|| CodecError::Fatal("decompression not started".into()))
    }
}

impl Decompress for JpegDecompressor {
    fn read_header(&mut self, data: &[u8]) -> CodecResult<HeaderInfo> {
        self.abort();
        let probe = markers::probe(data)?;

        let mut decoder = Decoder::new(data);
        decoder.read_info().map_err(header_error)?;
        let info = decoder
            .info()
            .ok_or_else(|| CodecError::Rejected("no frame header".into()))?;
        if layout_channels(info.pixel_format).is_none() {
            return Err(CodecError::Rejected(format!(
                "unsupported sample layout {:?} ({}-bit precision)",
                info.pixel_format, probe.precision
            )));
        }

        let header = HeaderInfo {
            width: probe.width as u32,
            height: probe.height as u32,
            components: probe.components(),
            color_space: probe.color_space,
        };
        self.header = Some(probe);
        Ok(header)
    }

    fn start_decompress(&mut self, data: &[u8], out_color_space: JpegColorSpace) -> CodecResult<()> {
        let probe = self
            .header
            .clone()
            .ok_or_else(|| CodecError::Fatal("start_decompress before read_header".into()))?;
        let transform = plan(probe.color_space, out_color_space).ok_or_else(|| {
            CodecError::Fatal(format!(
                "no colour conversion {:?} => {:?}",
                probe.color_space, out_color_space
            ))
        })?;

        let bytes: &[u8] = if probe.components() == 3 {
            markers::rewrite(data, &Retag::RAW_PLANES, &mut self.normalized)?;
            &self.normalized
        } else {
            data
        };

        let mut decoder = Decoder::new(bytes);
        let decoded = decoder
            .decode()
            .map_err(|e| CodecError::Fatal(e.to_string()))?;
        let info = decoder
            .info()
            .ok_or_else(|| CodecError::Fatal("decoder lost frame info".into()))?;

        let channels = layout_channels(info.pixel_format).unwrap_or(0);
        if channels != transform.src_channels() {
            return Err(CodecError::Fatal(format!(
                "decoder produced {:?}, expected {} channels",
                info.pixel_format,
                transform.src_channels()
            )));
        }
        let expected = info.width as usize * info.height as usize * channels;
        if decoded.len() < expected {
            return Err(CodecError::Fatal("decoder returned a short image".into()));
        }

        log::debug!(
            "decompressing {}x{} {:?} => {:?} ({} rows per pass)",
            info.width,
            info.height,
            probe.color_space,
            out_color_space,
            8 * probe.max_v_samp as usize
        );

        self.decoded = decoded;
        self.width = info.width as usize;
        self.height = info.height as u32;
        self.scanline = 0;
        self.rows_per_pass = 8 * probe.max_v_samp as usize;
        self.transform = Some(transform);
        Ok(())
    }

    fn output_scanline(&self) -> u32 {
        self.scanline
    }

    fn output_height(&self) -> u32 {
        self.height
    }

    fn output_row_bytes(&self) -> usize {
        self.transform
            .map_or(0, |t| self.width * t.dst_channels())
    }

    fn read_scanlines(&mut self, dest: &mut [u8], rows: &[usize]) -> CodecResult<usize> {
        let transform = self.started()?;
        let remaining = (self.height - self.scanline) as usize;
        let count = rows.len().min(self.rows_per_pass).min(remaining);

        let src_bytes = self.width * transform.src_channels();
        let dst_bytes = self.width * transform.dst_channels();
        for (i, &offset) in rows[..count].iter().enumerate() {
            let y = self.scanline as usize + i;
            let src = &self.decoded[y * src_bytes..(y + 1) * src_bytes];
            let dst = dest
                .get_mut(offset..offset + dst_bytes)
                .ok_or_else(|| CodecError::Fatal("row outside destination".into()))?;
            transform.apply(src, dst);
        }

        self.scanline += count as u32;
        Ok(count)
    }

    fn finish_decompress(&mut self) -> CodecResult<()> {
        self.started()?;
        if self.scanline < self.height {
            return Err(CodecError::Fatal(format!(
                "finish with {} of {} scanlines read",
                self.scanline, self.height
            )));
        }
        self.abort();
        Ok(())
    }

    fn abort(&mut self) {
        self.header = None;
        self.transform = None;
        self.decoded.clear();
        self.width = 0;
        self.height = 0;
        self.scanline = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_covers_decode_table() {
        use crate::conversion::DecodeConversion;
        for conv in DecodeConversion::ALL {
            let source = JpegColorSpace::from(conv.jpeg_color_space());
            let out = JpegColorSpace::from(conv.output_format().color_space());
            let t = plan(source, out).unwrap_or_else(|| panic!("no plan for {}", conv));
            assert_eq!(t.dst_channels(), conv.channels() as usize);
        }
    }

    #[test]
    fn test_rejects_non_jpeg() {
        let mut d = JpegDecompressor::new();
        let err = d.read_header(b"\x89PNG\r\n\x1a\n").unwrap_err();
        assert!(matches!(err, CodecError::Rejected(_)));
    }

    #[test]
    fn test_read_before_start_is_fatal() {
        let mut d = JpegDecompressor::new();
        let mut buf = [0u8; 4];
        assert!(matches!(d.read_scanlines(&mut buf, &[0]), Err(CodecError::Fatal(_))));
        assert!(d.finish_decompress().is_err());
        assert_eq!(d.output_row_bytes(), 0);
    }
}
