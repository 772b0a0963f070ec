//! Raster file <-> JPEG pipeline.
//!
//! This module drives the sessions for whole files: loading a raster image
//! through the `image` crate, encoding it via a path-mode
//! [`EncoderSession`], and decoding a JPEG back to a raster or raw sample file.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::codec::color::Transform;
use crate::config::{normalize_quality, DecoderSettings, SessionConfig};
use crate::conversion::EncodeConversion;
use crate::decoder::{DecodedImage, DecoderSession};
use crate::encoder::EncoderSession;
use crate::error::{Result, SessionError};
use crate::format::{ColorSpace, PixelFormat};
use crate::metrics::{calculate_psnr, PsnrResult};

/// Packed pixels in a given format.
#[derive(Debug, Clone)]
pub struct RasterImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Layout of `pixels`.
    pub format: PixelFormat,
    /// Rows packed top-down without padding.
    pub pixels: Vec<u8>,
}

impl RasterImage {
    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.format.row_bytes(self.width)
    }
}

/// Stream colour space used when none is given for `format`.
pub fn default_color_space(format: PixelFormat) -> ColorSpace {
    match format.color_space() {
        ColorSpace::Rgb => ColorSpace::YCbCr,
        cs => cs,
    }
}

/// Load a raster file and convert it to `format`.
pub fn load_raster(path: &Path, format: PixelFormat) -> Result<RasterImage> {
    let img = image::open(path)?;
    let (width, height) = (img.width(), img.height());

    let pixels = if format.color_space() == ColorSpace::Gray {
        img.to_luma8().into_raw()
    } else {
        let steps: &[Transform] = match format.color_space() {
            ColorSpace::Rgb | ColorSpace::BgRgb => &[],
            ColorSpace::YCbCr => &[Transform::RgbToYcc],
            ColorSpace::BgYcc => &[Transform::RgbToBgYcc],
            ColorSpace::Cmyk => &[Transform::RgbToCmyk],
            ColorSpace::Ycck => &[Transform::RgbToCmyk, Transform::CmykToYcck],
            _ => {
                return Err(SessionError::InvalidParameter(format!(
                    "cannot load a raster as {}",
                    format
                )))
            }
        };
        steps
            .iter()
            .fold(img.to_rgb8().into_raw(), |src, step| convert(&src, *step))
    };

    log::debug!(
        "loaded {} ({}x{}) as {}",
        path.display(),
        width,
        height,
        format
    );
    Ok(RasterImage {
        width,
        height,
        format,
        pixels,
    })
}

fn convert(src: &[u8], transform: Transform) -> Vec<u8> {
    let pixels = src.len() / transform.src_channels();
    let mut dst = vec![0u8; pixels * transform.dst_channels()];
    transform.apply(src, &mut dst);
    dst
}

/// Write a decoded image. GRAY and RGB go through `image` (format chosen by
/// extension); every other format is written as raw packed samples.
pub fn save_decoded(image: &DecodedImage, path: &Path) -> Result<()> {
    let packed = image.packed();
    match image.format.color_space() {
        ColorSpace::Gray => {
            image::save_buffer(path, &packed, image.width, image.height, image::ColorType::L8)?
        }
        ColorSpace::Rgb => {
            image::save_buffer(path, &packed, image.width, image.height, image::ColorType::Rgb8)?
        }
        _ => std::fs::write(path, &packed)?,
    }
    Ok(())
}

/// Options for [`TranscodePipeline::encode_file`].
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    /// Pixel format the raster is converted to before encoding.
    pub format: PixelFormat,
    /// Colour space stored in the JPEG stream.
    pub color_space: ColorSpace,
    /// Quality (0 selects the default).
    pub quality: u8,
    /// Decode the output again and report PSNR.
    pub verify: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            format: PixelFormat::RGB,
            color_space: ColorSpace::YCbCr,
            quality: normalize_quality(0),
            verify: false,
        }
    }
}

/// Result of encoding one file.
#[derive(Debug)]
pub struct EncodeResult {
    /// Raster source.
    pub source_path: PathBuf,
    /// JPEG written.
    pub output_path: PathBuf,
    /// Conversion used.
    pub conversion: EncodeConversion,
    /// Image width.
    pub width: u32,
    /// Image height.
    pub height: u32,
    /// Size of the packed input samples.
    pub raw_size: usize,
    /// Size of the JPEG stream.
    pub compressed_size: u64,
    /// Wall time in milliseconds.
    pub time_ms: u64,
    /// Round-trip quality when verification was requested.
    pub psnr: Option<PsnrResult>,
}

impl EncodeResult {
    /// Raw size over compressed size.
    pub fn compression_ratio(&self) -> f64 {
        if self.compressed_size == 0 {
            0.0
        } else {
            self.raw_size as f64 / self.compressed_size as f64
        }
    }
}

/// Result of decoding one file.
#[derive(Debug)]
pub struct DecodeResult {
    /// JPEG source.
    pub source_path: PathBuf,
    /// File written.
    pub output_path: PathBuf,
    /// Output format.
    pub format: PixelFormat,
    /// Image width.
    pub width: u32,
    /// Image height.
    pub height: u32,
    /// Wall time in milliseconds.
    pub time_ms: u64,
}

/// File-level encode/decode driver.
#[derive(Debug, Clone, Default)]
pub struct TranscodePipeline {
    config: SessionConfig,
}

impl TranscodePipeline {
    /// Create a pipeline with the given settings.
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Settings in use.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Encode an in-memory raster to `output`.
    pub fn encode_raster(
        &self,
        raster: &RasterImage,
        output: &Path,
        color_space: ColorSpace,
        quality: u8,
    ) -> Result<u64> {
        let mut session = EncoderSession::new();
        session.configure_path(output, quality)?;
        let status = session.encode_whole(
            raster.format,
            color_space,
            &raster.pixels,
            raster.stride() as isize,
            raster.width,
            raster.height,
        )?;
        Ok(status.byte_count())
    }

    /// Encode a raster file (PNG, BMP, ...) to a JPEG file.
    pub fn encode_file(&self, input: &Path, output: &Path, options: &EncodeOptions) -> Result<EncodeResult> {
        let start = Instant::now();
        log::info!("Encoding: {} -> {}", input.display(), output.display());

        let conversion = EncodeConversion::new(options.format, options.color_space).ok_or_else(|| {
            SessionError::UnsupportedConversion(format!("{} => {}", options.format, options.color_space))
        })?;
        let raster = load_raster(input, options.format)?;
        let compressed_size = self.encode_raster(&raster, output, options.color_space, options.quality)?;

        let psnr = if options.verify {
            Some(self.verify(&raster, output)?)
        } else {
            None
        };

        Ok(EncodeResult {
            source_path: input.to_path_buf(),
            output_path: output.to_path_buf(),
            conversion,
            width: raster.width,
            height: raster.height,
            raw_size: raster.pixels.len(),
            compressed_size,
            time_ms: start.elapsed().as_millis() as u64,
            psnr,
        })
    }

    /// Decode `jpeg` back to the raster's format and compare.
    fn verify(&self, raster: &RasterImage, jpeg: &Path) -> Result<PsnrResult> {
        let mut session = DecoderSession::new().with_settings(DecoderSettings::packed());
        session.configure_path(jpeg)?;
        let decoded = session.decode_to_vec(raster.format)?;
        let result = calculate_psnr(&raster.pixels, &decoded.pixels, raster.format.channels() as usize)?;
        log::debug!("verification: {}", result);
        Ok(result)
    }

    /// Decode a JPEG file into `format` and write it to `output`.
    pub fn decode_file(&self, input: &Path, output: &Path, format: PixelFormat) -> Result<DecodeResult> {
        let start = Instant::now();
        log::info!("Decoding: {} -> {}", input.display(), output.display());

        let mut session = DecoderSession::new().with_settings(self.config.decoder.clone());
        session.configure_path(input)?;
        let image = session.decode_to_vec(format)?;
        save_decoded(&image, output)?;

        Ok(DecodeResult {
            source_path: input.to_path_buf(),
            output_path: output.to_path_buf(),
            format,
            width: image.width,
            height: image.height,
            time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let img = image::RgbImage::from_fn(16, 8, |x, y| image::Rgb([(x * 15) as u8, (y * 30) as u8, 128]));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_default_color_space() {
        assert_eq!(default_color_space(PixelFormat::RGB), ColorSpace::YCbCr);
        assert_eq!(default_color_space(PixelFormat::GRAY), ColorSpace::Gray);
        assert_eq!(default_color_space(PixelFormat::CMYK), ColorSpace::Cmyk);
        for format in PixelFormat::ALL {
            assert!(EncodeConversion::new(format, default_color_space(format)).is_some());
        }
    }

    #[test]
    fn test_load_raster_formats() {
        let dir = TempDir::new().unwrap();
        let png = write_png(dir.path(), "in.png");

        let gray = load_raster(&png, PixelFormat::GRAY).unwrap();
        assert_eq!(gray.pixels.len(), 16 * 8);
        let ycck = load_raster(&png, PixelFormat::YCCK).unwrap();
        assert_eq!(ycck.pixels.len(), 16 * 8 * 4);
        assert_eq!(ycck.stride(), 64);
        assert!(load_raster(&png, PixelFormat::UNKNOWN).is_err());
    }

    #[test]
    fn test_encode_file_with_verify() {
        let dir = TempDir::new().unwrap();
        let png = write_png(dir.path(), "in.png");
        let jpg = dir.path().join("out.jpg");

        let pipeline = TranscodePipeline::default();
        let options = EncodeOptions {
            quality: 95,
            verify: true,
            ..Default::default()
        };
        let result = pipeline.encode_file(&png, &jpg, &options).unwrap();
        assert_eq!((result.width, result.height), (16, 8));
        assert_eq!(result.compressed_size, std::fs::metadata(&jpg).unwrap().len());
        assert!(result.psnr.unwrap().psnr_db > 30.0);
    }

    #[test]
    fn test_decode_file_to_png_and_raw() {
        let dir = TempDir::new().unwrap();
        let png = write_png(dir.path(), "in.png");
        let jpg = dir.path().join("out.jpg");
        let pipeline = TranscodePipeline::default();
        pipeline
            .encode_file(&png, &jpg, &EncodeOptions::default())
            .unwrap();

        let back = dir.path().join("back.png");
        let result = pipeline.decode_file(&jpg, &back, PixelFormat::GRAY).unwrap();
        assert_eq!((result.width, result.height), (16, 8));
        let reloaded = image::open(&back).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (16, 8));

        let raw = dir.path().join("back.cmyk");
        assert!(pipeline.decode_file(&jpg, &raw, PixelFormat::CMYK).is_err());
        let raw = dir.path().join("back.ycc");
        pipeline.decode_file(&jpg, &raw, PixelFormat::YCC).unwrap();
        assert_eq!(std::fs::read(&raw).unwrap().len(), 16 * 8 * 3);
    }

    #[test]
    fn test_unsupported_pair_before_loading() {
        let dir = TempDir::new().unwrap();
        let options = EncodeOptions {
            format: PixelFormat::GRAY,
            color_space: ColorSpace::Cmyk,
            ..Default::default()
        };
        let err = TranscodePipeline::default()
            .encode_file(&dir.path().join("missing.png"), &dir.path().join("o.jpg"), &options)
            .unwrap_err();
        assert!(matches!(err, SessionError::UnsupportedConversion(_)));
    }
}
