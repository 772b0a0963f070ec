//! Conversion validity tables.
//!
//! Only the pairs listed here are accepted by the sessions; every other
//! combination of [`PixelFormat`] and JPEG [`ColorSpace`] is rejected before
//! the codec is touched. The packed raw value of a conversion is
//! `(jpeg_color_space << 24) | pixel_format`.

use std::fmt;

use crate::format::{ColorSpace, PixelFormat};

const fn make(format: PixelFormat, jpeg: ColorSpace) -> u32 {
    ((jpeg.code() as u32) << 24) | format.raw()
}

/// A legal (input pixel format -> JPEG stream colour space) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodeConversion {
    /// GRAY => GRAY
    GrayToGray,
    /// RGB => GRAY
    RgbToGray,
    /// YCC => GRAY
    YccToGray,
    /// BG_YCC => GRAY
    BgYccToGray,
    /// RGB => RGB
    RgbToRgb,
    /// BG_RGB => BG_RGB
    BgRgbToBgRgb,
    /// YCC => YCC
    YccToYcc,
    /// RGB => YCC
    RgbToYcc,
    /// BG_YCC => BG_YCC
    BgYccToBgYcc,
    /// RGB => BG_YCC
    RgbToBgYcc,
    /// YCC => BG_YCC
    YccToBgYcc,
    /// CMYK => CMYK
    CmykToCmyk,
    /// YCCK => YCCK
    YcckToYcck,
    /// CMYK => YCCK
    CmykToYcck,
}

impl EncodeConversion {
    /// The full table.
    pub const ALL: [EncodeConversion; 14] = [
        EncodeConversion::GrayToGray,
        EncodeConversion::RgbToGray,
        EncodeConversion::YccToGray,
        EncodeConversion::BgYccToGray,
        EncodeConversion::RgbToRgb,
        EncodeConversion::BgRgbToBgRgb,
        EncodeConversion::YccToYcc,
        EncodeConversion::RgbToYcc,
        EncodeConversion::BgYccToBgYcc,
        EncodeConversion::RgbToBgYcc,
        EncodeConversion::YccToBgYcc,
        EncodeConversion::CmykToCmyk,
        EncodeConversion::YcckToYcck,
        EncodeConversion::CmykToYcck,
    ];

    /// Look up the pair, returning `None` if the table does not contain it.
    pub fn new(input: PixelFormat, jpeg: ColorSpace) -> Option<Self> {
        Self::from_raw(make(input, jpeg))
    }

    /// Decode a packed value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.raw() == raw)
    }

    /// Packed value.
    pub const fn raw(self) -> u32 {
        let (input, jpeg) = self.parts();
        make(input, jpeg)
    }

    /// Caller-side pixel format.
    pub const fn input_format(self) -> PixelFormat {
        self.parts().0
    }

    /// Colour space written into the JPEG stream.
    pub const fn jpeg_color_space(self) -> ColorSpace {
        self.parts().1
    }

    /// Components per input pixel.
    pub const fn channels(self) -> u8 {
        self.input_format().channels()
    }

    /// Display name such as `RGB=>YCC`.
    pub fn name(self) -> String {
        format!("{}=>{}", self.input_format().name(), self.jpeg_color_space().name())
    }

    const fn parts(self) -> (PixelFormat, ColorSpace) {
        match self {
            EncodeConversion::GrayToGray => (PixelFormat::GRAY, ColorSpace::Gray),
            EncodeConversion::RgbToGray => (PixelFormat::RGB, ColorSpace::Gray),
            EncodeConversion::YccToGray => (PixelFormat::YCC, ColorSpace::Gray),
            EncodeConversion::BgYccToGray => (PixelFormat::BG_YCC, ColorSpace::Gray),
            EncodeConversion::RgbToRgb => (PixelFormat::RGB, ColorSpace::Rgb),
            EncodeConversion::BgRgbToBgRgb => (PixelFormat::BG_RGB, ColorSpace::BgRgb),
            EncodeConversion::YccToYcc => (PixelFormat::YCC, ColorSpace::YCbCr),
            EncodeConversion::RgbToYcc => (PixelFormat::RGB, ColorSpace::YCbCr),
            EncodeConversion::BgYccToBgYcc => (PixelFormat::BG_YCC, ColorSpace::BgYcc),
            EncodeConversion::RgbToBgYcc => (PixelFormat::RGB, ColorSpace::BgYcc),
            EncodeConversion::YccToBgYcc => (PixelFormat::YCC, ColorSpace::BgYcc),
            EncodeConversion::CmykToCmyk => (PixelFormat::CMYK, ColorSpace::Cmyk),
            EncodeConversion::YcckToYcck => (PixelFormat::YCCK, ColorSpace::Ycck),
            EncodeConversion::CmykToYcck => (PixelFormat::CMYK, ColorSpace::Ycck),
        }
    }
}

impl fmt::Display for EncodeConversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A legal (JPEG stream colour space -> output pixel format) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeConversion {
    /// GRAY => GRAY
    GrayToGray,
    /// RGB => GRAY
    RgbToGray,
    /// YCC => GRAY
    YccToGray,
    /// BG_YCC => GRAY
    BgYccToGray,
    /// RGB => RGB
    RgbToRgb,
    /// GRAY => RGB
    GrayToRgb,
    /// YCC => RGB
    YccToRgb,
    /// BG_YCC => RGB
    BgYccToRgb,
    /// YCC => YCC
    YccToYcc,
    /// BG_RGB => BG_RGB
    BgRgbToBgRgb,
    /// BG_YCC => BG_YCC
    BgYccToBgYcc,
    /// CMYK => CMYK
    CmykToCmyk,
    /// YCCK => CMYK
    YcckToCmyk,
    /// YCCK => YCCK
    YcckToYcck,
}

impl DecodeConversion {
    /// The full table.
    pub const ALL: [DecodeConversion; 14] = [
        DecodeConversion::GrayToGray,
        DecodeConversion::RgbToGray,
        DecodeConversion::YccToGray,
        DecodeConversion::BgYccToGray,
        DecodeConversion::RgbToRgb,
        DecodeConversion::GrayToRgb,
        DecodeConversion::YccToRgb,
        DecodeConversion::BgYccToRgb,
        DecodeConversion::YccToYcc,
        DecodeConversion::BgRgbToBgRgb,
        DecodeConversion::BgYccToBgYcc,
        DecodeConversion::CmykToCmyk,
        DecodeConversion::YcckToCmyk,
        DecodeConversion::YcckToYcck,
    ];

    /// Look up the pair, returning `None` if the table does not contain it.
    pub fn new(output: PixelFormat, jpeg: ColorSpace) -> Option<Self> {
        Self::from_raw(make(output, jpeg))
    }

    /// Decode a packed value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.raw() == raw)
    }

    /// Packed value.
    pub const fn raw(self) -> u32 {
        let (output, jpeg) = self.parts();
        make(output, jpeg)
    }

    /// Caller-side pixel format.
    pub const fn output_format(self) -> PixelFormat {
        self.parts().0
    }

    /// Colour space of the JPEG stream being read.
    pub const fn jpeg_color_space(self) -> ColorSpace {
        self.parts().1
    }

    /// Components per output pixel.
    pub const fn channels(self) -> u8 {
        self.output_format().channels()
    }

    /// Display name such as `YCC=>RGB`.
    pub fn name(self) -> String {
        format!("{}=>{}", self.jpeg_color_space().name(), self.output_format().name())
    }

    const fn parts(self) -> (PixelFormat, ColorSpace) {
        match self {
            DecodeConversion::GrayToGray => (PixelFormat::GRAY, ColorSpace::Gray),
            DecodeConversion::RgbToGray => (PixelFormat::GRAY, ColorSpace::Rgb),
            DecodeConversion::YccToGray => (PixelFormat::GRAY, ColorSpace::YCbCr),
            DecodeConversion::BgYccToGray => (PixelFormat::GRAY, ColorSpace::BgYcc),
            DecodeConversion::RgbToRgb => (PixelFormat::RGB, ColorSpace::Rgb),
            DecodeConversion::GrayToRgb => (PixelFormat::RGB, ColorSpace::Gray),
            DecodeConversion::YccToRgb => (PixelFormat::RGB, ColorSpace::YCbCr),
            DecodeConversion::BgYccToRgb => (PixelFormat::RGB, ColorSpace::BgYcc),
            DecodeConversion::YccToYcc => (PixelFormat::YCC, ColorSpace::YCbCr),
            DecodeConversion::BgRgbToBgRgb => (PixelFormat::BG_RGB, ColorSpace::BgRgb),
            DecodeConversion::BgYccToBgYcc => (PixelFormat::BG_YCC, ColorSpace::BgYcc),
            DecodeConversion::CmykToCmyk => (PixelFormat::CMYK, ColorSpace::Cmyk),
            DecodeConversion::YcckToCmyk => (PixelFormat::CMYK, ColorSpace::Ycck),
            DecodeConversion::YcckToYcck => (PixelFormat::YCCK, ColorSpace::Ycck),
        }
    }
}

impl fmt::Display for DecodeConversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
