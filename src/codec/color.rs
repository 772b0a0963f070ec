//! Per-pixel colour transforms applied on the way into and out of the codec.
//!
//! YCbCr follows JFIF (full-range BT.601). The big-gamut variant uses the
//! same luma but half-scaled chroma, so its inverse doubles the coefficients.
//! YCCK is the YCbCr of the inverted CMY triple with K carried through.

#[inline]
fn clamp(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// JFIF luma.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    clamp(0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
}

/// RGB to JFIF YCbCr.
#[inline]
pub fn rgb_to_ycc(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    [
        clamp(0.299 * r + 0.587 * g + 0.114 * b),
        clamp(128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b),
        clamp(128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b),
    ]
}

/// JFIF YCbCr to RGB.
#[inline]
pub fn ycc_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y = y as f32;
    let cb = cb as f32 - 128.0;
    let cr = cr as f32 - 128.0;
    [
        clamp(y + 1.402 * cr),
        clamp(y - 0.344_136 * cb - 0.714_136 * cr),
        clamp(y + 1.772 * cb),
    ]
}

/// RGB to big-gamut YCbCr.
#[inline]
pub fn rgb_to_bg_ycc(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    [
        clamp(0.299 * r + 0.587 * g + 0.114 * b),
        clamp(128.0 + 0.5 * (-0.168_736 * r - 0.331_264 * g + 0.5 * b)),
        clamp(128.0 + 0.5 * (0.5 * r - 0.418_688 * g - 0.081_312 * b)),
    ]
}

/// Big-gamut YCbCr to RGB.
#[inline]
pub fn bg_ycc_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y = y as f32;
    let cb = cb as f32 - 128.0;
    let cr = cr as f32 - 128.0;
    [
        clamp(y + 2.804 * cr),
        clamp(y - 0.688_272 * cb - 1.428_272 * cr),
        clamp(y + 3.544 * cb),
    ]
}

/// CMYK to YCCK.
#[inline]
pub fn cmyk_to_ycck(c: u8, m: u8, y: u8, k: u8) -> [u8; 4] {
    let [yy, cb, cr] = rgb_to_ycc(255 - c, 255 - m, 255 - y);
    [yy, cb, cr, k]
}

/// YCCK to CMYK.
#[inline]
pub fn ycck_to_cmyk(y: u8, cb: u8, cr: u8, k: u8) -> [u8; 4] {
    let [r, g, b] = ycc_to_rgb(y, cb, cr);
    [255 - r, 255 - g, 255 - b, k]
}

/// Naive RGB to CMYK with full black extraction.
#[inline]
pub fn rgb_to_cmyk(r: u8, g: u8, b: u8) -> [u8; 4] {
    let k = 255 - r.max(g).max(b);
    if k == 255 {
        return [0, 0, 0, 255];
    }
    let scale = 255.0 / (255 - k) as f32;
    [
        clamp((255 - r - k) as f32 * scale),
        clamp((255 - g - k) as f32 * scale),
        clamp((255 - b - k) as f32 * scale),
        k,
    ]
}

/// Row transform between two pixel layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Byte copy of pixels with the given channel count.
    Copy(u8),
    /// RGB to luma.
    RgbToGray,
    /// Keep the first of three channels (Y of a YCbCr pixel).
    TakeLuma,
    /// Replicate gray into RGB.
    GrayToRgb,
    /// RGB to JFIF YCbCr.
    RgbToYcc,
    /// JFIF YCbCr to RGB.
    YccToRgb,
    /// RGB to big-gamut YCbCr.
    RgbToBgYcc,
    /// Big-gamut YCbCr to RGB.
    BgYccToRgb,
    /// JFIF YCbCr to big-gamut YCbCr.
    YccToBgYcc,
    /// CMYK to YCCK.
    CmykToYcck,
    /// YCCK to CMYK.
    YcckToCmyk,
    /// RGB to CMYK.
    RgbToCmyk,
}

impl Transform {
    /// Channels consumed per pixel.
    pub fn src_channels(self) -> usize {
        match self {
            Transform::Copy(n) => n as usize,
            Transform::GrayToRgb => 1,
            Transform::CmykToYcck | Transform::YcckToCmyk => 4,
            _ => 3,
        }
    }

    /// Channels produced per pixel.
    pub fn dst_channels(self) -> usize {
        match self {
            Transform::Copy(n) => n as usize,
            Transform::RgbToGray | Transform::TakeLuma => 1,
            Transform::CmykToYcck | Transform::YcckToCmyk | Transform::RgbToCmyk => 4,
            _ => 3,
        }
    }

    /// Convert every whole pixel of `src` into `dst`.
    pub fn apply(self, src: &[u8], dst: &mut [u8]) {
        if let Transform::Copy(_) = self {
            let n = src.len().min(dst.len());
            dst[..n].copy_from_slice(&src[..n]);
            return;
        }

        let pixels = src
            .chunks_exact(self.src_channels())
            .zip(dst.chunks_exact_mut(self.dst_channels()));
        for (s, d) in pixels {
            match self {
                Transform::Copy(_) => unreachable!(),
                Transform::RgbToGray => d[0] = luma(s[0], s[1], s[2]),
                Transform::TakeLuma => d[0] = s[0],
                Transform::GrayToRgb => d.fill(s[0]),
                Transform::RgbToYcc => d.copy_from_slice(&rgb_to_ycc(s[0], s[1], s[2])),
                Transform::YccToRgb => d.copy_from_slice(&ycc_to_rgb(s[0], s[1], s[2])),
                Transform::RgbToBgYcc => d.copy_from_slice(&rgb_to_bg_ycc(s[0], s[1], s[2])),
                Transform::BgYccToRgb => d.copy_from_slice(&bg_ycc_to_rgb(s[0], s[1], s[2])),
                Transform::YccToBgYcc => {
                    let [r, g, b] = ycc_to_rgb(s[0], s[1], s[2]);
                    d.copy_from_slice(&rgb_to_bg_ycc(r, g, b));
                }
                Transform::CmykToYcck => d.copy_from_slice(&cmyk_to_ycck(s[0], s[1], s[2], s[3])),
                Transform::YcckToCmyk => d.copy_from_slice(&ycck_to_cmyk(s[0], s[1], s[2], s[3])),
                Transform::RgbToCmyk => d.copy_from_slice(&rgb_to_cmyk(s[0], s[1], s[2])),
            }
        }
    }
}
