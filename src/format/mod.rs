//! Pixel-format descriptors and colour-space tags.
//!
//! A [`PixelFormat`] packs three fields into a `u32`:
//!
//! | bits   | field               |
//! |--------|---------------------|
//! | 0-7    | bits per pixel      |
//! | 8-15   | channel count       |
//! | 16-23  | [`ColorSpace`] code |
//!
//! The packed value is stable and can be stored or passed across process
//! boundaries; [`PixelFormat::from_raw`] only accepts the canonical formats.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codec::JpegColorSpace;
use crate::error::SessionError;

/// Abstract colour-space tag shared by pixel formats and JPEG streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColorSpace {
    /// Not known or not representable.
    #[default]
    Unknown,
    /// Single-channel luminance.
    Gray,
    /// sRGB.
    Rgb,
    /// JFIF YCbCr.
    YCbCr,
    /// Adobe-style CMYK.
    Cmyk,
    /// YCbCr of inverted CMY, plus K.
    Ycck,
    /// Big-gamut RGB.
    BgRgb,
    /// Big-gamut YCbCr (half-scaled chroma).
    BgYcc,
}

impl ColorSpace {
    /// All tags in code order.
    pub const ALL: [ColorSpace; 8] = [
        ColorSpace::Unknown,
        ColorSpace::Gray,
        ColorSpace::Rgb,
        ColorSpace::YCbCr,
        ColorSpace::Cmyk,
        ColorSpace::Ycck,
        ColorSpace::BgRgb,
        ColorSpace::BgYcc,
    ];

    /// Numeric code stored in bits 16-23 of a [`PixelFormat`].
    pub const fn code(self) -> u8 {
        match self {
            ColorSpace::Unknown => 0,
            ColorSpace::Gray => 1,
            ColorSpace::Rgb => 2,
            ColorSpace::YCbCr => 3,
            ColorSpace::Cmyk => 4,
            ColorSpace::Ycck => 5,
            ColorSpace::BgRgb => 6,
            ColorSpace::BgYcc => 7,
        }
    }

    /// Inverse of [`ColorSpace::code`].
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ColorSpace::Unknown),
            1 => Some(ColorSpace::Gray),
            2 => Some(ColorSpace::Rgb),
            3 => Some(ColorSpace::YCbCr),
            4 => Some(ColorSpace::Cmyk),
            5 => Some(ColorSpace::Ycck),
            6 => Some(ColorSpace::BgRgb),
            7 => Some(ColorSpace::BgYcc),
            _ => None,
        }
    }

    /// Number of components for this colour space (0 for `Unknown`).
    pub const fn channels(self) -> u8 {
        match self {
            ColorSpace::Unknown => 0,
            ColorSpace::Gray => 1,
            ColorSpace::Rgb | ColorSpace::YCbCr | ColorSpace::BgRgb | ColorSpace::BgYcc => 3,
            ColorSpace::Cmyk | ColorSpace::Ycck => 4,
        }
    }

    /// Short upper-case name.
    pub const fn name(self) -> &'static str {
        match self {
            ColorSpace::Unknown => "UNKNOWN",
            ColorSpace::Gray => "GRAY",
            ColorSpace::Rgb => "RGB",
            ColorSpace::YCbCr => "YCC",
            ColorSpace::Cmyk => "CMYK",
            ColorSpace::Ycck => "YCCK",
            ColorSpace::BgRgb => "BG_RGB",
            ColorSpace::BgYcc => "BG_YCC",
        }
    }

    /// Look up a colour space by name. Case-insensitive; `-` may stand in for `_`.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_uppercase().replace('-', "_");
        match normalized.as_str() {
            "UNKNOWN" => Some(ColorSpace::Unknown),
            "GRAY" | "GREY" | "GRAYSCALE" => Some(ColorSpace::Gray),
            "RGB" => Some(ColorSpace::Rgb),
            "YCC" | "YCBCR" => Some(ColorSpace::YCbCr),
            "CMYK" => Some(ColorSpace::Cmyk),
            "YCCK" => Some(ColorSpace::Ycck),
            "BG_RGB" => Some(ColorSpace::BgRgb),
            "BG_YCC" => Some(ColorSpace::BgYcc),
            _ => None,
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColorSpace {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ColorSpace::from_name(s)
            .ok_or_else(|| SessionError::InvalidParameter(format!("unknown colour space '{}'", s)))
    }
}

impl From<ColorSpace> for JpegColorSpace {
    fn from(cs: ColorSpace) -> Self {
        match cs {
            ColorSpace::Unknown => JpegColorSpace::Unknown,
            ColorSpace::Gray => JpegColorSpace::Grayscale,
            ColorSpace::Rgb => JpegColorSpace::Rgb,
            ColorSpace::YCbCr => JpegColorSpace::YCbCr,
            ColorSpace::Cmyk => JpegColorSpace::Cmyk,
            ColorSpace::Ycck => JpegColorSpace::Ycck,
            ColorSpace::BgRgb => JpegColorSpace::BgRgb,
            ColorSpace::BgYcc => JpegColorSpace::BgYcc,
        }
    }
}

impl From<JpegColorSpace> for ColorSpace {
    fn from(jcs: JpegColorSpace) -> Self {
        match jcs {
            JpegColorSpace::Unknown => ColorSpace::Unknown,
            JpegColorSpace::Grayscale => ColorSpace::Gray,
            JpegColorSpace::Rgb => ColorSpace::Rgb,
            JpegColorSpace::YCbCr => ColorSpace::YCbCr,
            JpegColorSpace::Cmyk => ColorSpace::Cmyk,
            JpegColorSpace::Ycck => ColorSpace::Ycck,
            JpegColorSpace::BgRgb => ColorSpace::BgRgb,
            JpegColorSpace::BgYcc => ColorSpace::BgYcc,
        }
    }
}

/// Packed pixel-format descriptor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelFormat(u32);

impl PixelFormat {
    /// Undefined format.
    pub const UNKNOWN: PixelFormat = PixelFormat(0);
    /// 8-bit grayscale.
    pub const GRAY: PixelFormat = PixelFormat::pack(8, 1, ColorSpace::Gray);
    /// 24-bit RGB.
    pub const RGB: PixelFormat = PixelFormat::pack(24, 3, ColorSpace::Rgb);
    /// 24-bit YCbCr.
    pub const YCC: PixelFormat = PixelFormat::pack(24, 3, ColorSpace::YCbCr);
    /// 32-bit CMYK.
    pub const CMYK: PixelFormat = PixelFormat::pack(32, 4, ColorSpace::Cmyk);
    /// 32-bit YCCK.
    pub const YCCK: PixelFormat = PixelFormat::pack(32, 4, ColorSpace::Ycck);
    /// 24-bit big-gamut RGB.
    pub const BG_RGB: PixelFormat = PixelFormat::pack(24, 3, ColorSpace::BgRgb);
    /// 24-bit big-gamut YCbCr.
    pub const BG_YCC: PixelFormat = PixelFormat::pack(24, 3, ColorSpace::BgYcc);

    /// Every defined (non-unknown) format.
    pub const ALL: [PixelFormat; 7] = [
        PixelFormat::GRAY,
        PixelFormat::RGB,
        PixelFormat::YCC,
        PixelFormat::CMYK,
        PixelFormat::YCCK,
        PixelFormat::BG_RGB,
        PixelFormat::BG_YCC,
    ];

    const fn pack(bits: u8, channels: u8, cs: ColorSpace) -> Self {
        PixelFormat((bits as u32) | ((channels as u32) << 8) | ((cs.code() as u32) << 16))
    }

    /// Canonical format for a colour space (`UNKNOWN` for `Unknown`).
    pub const fn for_color_space(cs: ColorSpace) -> Self {
        match cs {
            ColorSpace::Unknown => PixelFormat::UNKNOWN,
            ColorSpace::Gray => PixelFormat::GRAY,
            ColorSpace::Rgb => PixelFormat::RGB,
            ColorSpace::YCbCr => PixelFormat::YCC,
            ColorSpace::Cmyk => PixelFormat::CMYK,
            ColorSpace::Ycck => PixelFormat::YCCK,
            ColorSpace::BgRgb => PixelFormat::BG_RGB,
            ColorSpace::BgYcc => PixelFormat::BG_YCC,
        }
    }

    /// Accept a packed value only if it is one of the canonical formats.
    pub fn from_raw(raw: u32) -> Option<Self> {
        let format = PixelFormat(raw);
        if format == PixelFormat::UNKNOWN || PixelFormat::ALL.contains(&format) {
            Some(format)
        } else {
            None
        }
    }

    /// The packed value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Bits per pixel.
    pub const fn bits_per_pixel(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Channel count.
    pub const fn channels(self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    /// Bytes per pixel.
    pub const fn bytes_per_pixel(self) -> usize {
        (self.bits_per_pixel() as usize + 7) / 8
    }

    /// Colour-space tag.
    pub fn color_space(self) -> ColorSpace {
        ColorSpace::from_code(((self.0 >> 16) & 0xFF) as u8).unwrap_or(ColorSpace::Unknown)
    }

    /// Bytes in one unpadded row of `width` pixels.
    pub fn row_bytes(self, width: u32) -> usize {
        width as usize * self.bytes_per_pixel()
    }

    /// Name of the format, identical to its colour space name.
    pub fn name(self) -> &'static str {
        self.color_space().name()
    }

    /// Look up a canonical format by name.
    pub fn from_name(name: &str) -> Option<Self> {
        ColorSpace::from_name(name).map(PixelFormat::for_color_space)
    }
}

impl fmt::Debug for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PixelFormat({}, {:#010x})", self.name(), self.0)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PixelFormat::from_name(s)
            .ok_or_else(|| SessionError::InvalidParameter(format!("unknown pixel format '{}'", s)))
    }
}
