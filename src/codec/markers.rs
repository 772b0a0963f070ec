//! JPEG marker inspection and retagging.
//!
//! The entropy-coded data is never touched. [`probe`] reads the frame header
//! and the colour hints a decoder uses to pick the stream's colour space;
//! [`rewrite`] copies a stream while changing those hints.

use byteorder::{BigEndian, ByteOrder};

use super::{CodecError, CodecResult, JpegColorSpace};

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const APP0: u8 = 0xE0;
const APP14: u8 = 0xEE;

/// Adobe APP14 transform flag: no colour transform.
pub const ADOBE_TRANSFORM_NONE: u8 = 0;
/// Adobe APP14 transform flag: YCbCr.
pub const ADOBE_TRANSFORM_YCC: u8 = 1;
/// Adobe APP14 transform flag: YCCK.
pub const ADOBE_TRANSFORM_YCCK: u8 = 2;

/// Component identifiers that tag a stream as RGB.
pub const IDS_RGB: [u8; 3] = [b'R', b'G', b'B'];
/// Component identifiers that tag a stream as big-gamut RGB.
pub const IDS_BG_RGB: [u8; 3] = [b'r', b'g', b'b'];
/// Component identifiers that tag a stream as big-gamut YCbCr.
pub const IDS_BG_YCC: [u8; 3] = [0x01, 0x22, 0x23];

/// Frame and colour information found before the first scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamProbe {
    /// Frame width.
    pub width: u16,
    /// Frame height.
    pub height: u16,
    /// Sample precision in bits.
    pub precision: u8,
    /// Component identifiers in frame order.
    pub component_ids: Vec<u8>,
    /// Largest vertical sampling factor.
    pub max_v_samp: u8,
    /// A JFIF APP0 segment is present.
    pub jfif: bool,
    /// Transform flag of an Adobe APP14 segment, if present.
    pub adobe_transform: Option<u8>,
    /// Colour space implied by the hints above.
    pub color_space: JpegColorSpace,
}

impl StreamProbe {
    /// Number of frame components.
    pub fn components(&self) -> u8 {
        self.component_ids.len() as u8
    }
}

fn is_sof(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

fn is_standalone(marker: u8) -> bool {
    matches!(marker, 0x01 | 0xD0..=0xD7)
}

/// A marker segment located in a byte stream.
struct Segment {
    marker: u8,
    /// Offset of the 0xFF byte.
    start: usize,
    /// Offset just past the segment.
    end: usize,
}

impl Segment {
    fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start + 4..self.end]
    }
}

/// Read the marker segment starting at or after `pos`.
fn next_segment(data: &[u8], mut pos: usize) -> CodecResult<Segment> {
    while pos < data.len() && data[pos] != 0xFF {
        pos += 1;
    }
    let start = pos;
    while pos < data.len() && data[pos] == 0xFF {
        pos += 1;
    }
    let marker = *data
        .get(pos)
        .ok_or_else(|| CodecError::Rejected("truncated stream: no scan found".into()))?;
    let start = start.max(pos - 1);
    pos += 1;

    if is_standalone(marker) || marker == SOI || marker == EOI {
        return Ok(Segment { marker, start, end: pos });
    }

    if pos + 2 > data.len() {
        return Err(CodecError::Rejected(format!("truncated marker 0xFF{:02X}", marker)));
    }
    let length = BigEndian::read_u16(&data[pos..]) as usize;
    if length < 2 || pos + length > data.len() {
        return Err(CodecError::Rejected(format!(
            "bad length {} for marker 0xFF{:02X}",
            length, marker
        )));
    }
    Ok(Segment { marker, start, end: pos + length })
}

/// Skip entropy-coded data, returning the offset of the next real marker.
fn skip_entropy(data: &[u8], mut pos: usize) -> usize {
    while pos + 1 < data.len() {
        if data[pos] == 0xFF {
            let next = data[pos + 1];
            if next != 0x00 && next != 0xFF && !matches!(next, 0xD0..=0xD7) {
                return pos;
            }
        }
        pos += 1;
    }
    data.len()
}

fn detect_color_space(ids: &[u8], jfif: bool, adobe: Option<u8>) -> JpegColorSpace {
    match ids.len() {
        1 => JpegColorSpace::Grayscale,
        3 => match [ids[0], ids[1], ids[2]] {
            [0x01, 0x02, 0x03] => JpegColorSpace::YCbCr,
            IDS_BG_YCC => JpegColorSpace::BgYcc,
            IDS_RGB => JpegColorSpace::Rgb,
            IDS_BG_RGB => JpegColorSpace::BgRgb,
            _ if jfif => JpegColorSpace::YCbCr,
            _ => match adobe {
                Some(ADOBE_TRANSFORM_NONE) => JpegColorSpace::Rgb,
                _ => JpegColorSpace::YCbCr,
            },
        },
        4 => match adobe {
            Some(ADOBE_TRANSFORM_YCCK) => JpegColorSpace::Ycck,
            _ => JpegColorSpace::Cmyk,
        },
        _ => JpegColorSpace::Unknown,
    }
}

/// Parse markers up to the first scan header.
pub fn probe(data: &[u8]) -> CodecResult<StreamProbe> {
    if data.len() < 2 || data[0] != 0xFF || data[1] != SOI {
        return Err(CodecError::Rejected("not a JPEG stream (missing SOI)".into()));
    }

    let mut jfif = false;
    let mut adobe = None;
    let mut frame: Option<(u8, u16, u16, Vec<u8>, u8)> = None;
    let mut pos = 2;

    loop {
        let seg = next_segment(data, pos)?;
        pos = seg.end;
        match seg.marker {
            APP0 => {
                if seg.payload(data).starts_with(b"JFIF\0") {
                    jfif = true;
                }
            }
            APP14 => {
                let payload = seg.payload(data);
                if payload.len() >= 12 && payload.starts_with(b"Adobe") {
                    adobe = Some(payload[11]);
                }
            }
            m if is_sof(m) => {
                if frame.is_some() {
                    return Err(CodecError::Rejected("duplicate frame header".into()));
                }
                let p = seg.payload(data);
                if p.len() < 6 {
                    return Err(CodecError::Rejected("short frame header".into()));
                }
                let count = p[5] as usize;
                if count == 0 || p.len() < 6 + 3 * count {
                    return Err(CodecError::Rejected("frame header component list truncated".into()));
                }
                let ids: Vec<u8> = (0..count).map(|i| p[6 + 3 * i]).collect();
                let max_v = (0..count).map(|i| p[7 + 3 * i] & 0x0F).max().unwrap_or(1).max(1);
                frame = Some((
                    p[0],
                    BigEndian::read_u16(&p[1..3]),
                    BigEndian::read_u16(&p[3..5]),
                    ids,
                    max_v,
                ));
            }
            SOS => break,
            EOI => return Err(CodecError::Rejected("end of image before first scan".into())),
            _ => {}
        }
    }

    let (precision, height, width, component_ids, max_v_samp) =
        frame.ok_or_else(|| CodecError::Rejected("scan without frame header".into()))?;
    if width == 0 || height == 0 {
        return Err(CodecError::Rejected(format!(
            "unsupported frame size {}x{}",
            width, height
        )));
    }

    let color_space = detect_color_space(&component_ids, jfif, adobe);
    Ok(StreamProbe {
        width,
        height,
        precision,
        component_ids,
        max_v_samp,
        jfif,
        adobe_transform: adobe,
        color_space,
    })
}

/// Changes applied by [`rewrite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Retag {
    /// Replace the identifiers of a three-component frame (and its scans).
    pub component_ids: Option<[u8; 3]>,
    /// Remove JFIF APP0 segments.
    pub drop_jfif: bool,
    /// Set the Adobe transform flag, inserting an APP14 segment if none exists.
    pub adobe_transform: Option<u8>,
}

impl Retag {
    /// Make a decoder pass three-component samples through unconverted.
    pub const RAW_PLANES: Retag = Retag {
        component_ids: Some(IDS_RGB),
        drop_jfif: true,
        adobe_transform: Some(ADOBE_TRANSFORM_NONE),
    };

    /// Tags identifying an untransformed stream of the given kind.
    pub const fn untransformed(ids: [u8; 3]) -> Retag {
        Retag {
            component_ids: Some(ids),
            drop_jfif: true,
            adobe_transform: Some(ADOBE_TRANSFORM_NONE),
        }
    }

    /// Tags identifying a big-gamut YCbCr stream.
    pub const BG_YCC: Retag = Retag {
        component_ids: Some(IDS_BG_YCC),
        drop_jfif: false,
        adobe_transform: None,
    };
}

fn write_adobe(out: &mut Vec<u8>, transform: u8) {
    // Marker, length, "Adobe", version 100, flags0, flags1, transform.
    let mut segment = [0u8; 16];
    segment[..2].copy_from_slice(&[0xFF, APP14]);
    BigEndian::write_u16(&mut segment[2..4], 14);
    segment[4..9].copy_from_slice(b"Adobe");
    BigEndian::write_u16(&mut segment[9..11], 100);
    segment[15] = transform;
    out.extend_from_slice(&segment);
}

/// Check that a segment holds `count` entries of `entry` bytes after a
/// count byte at `count_at`, returning the count.
fn component_count(bytes: &[u8], count_at: usize, entry: usize, what: &str) -> CodecResult<usize> {
    let count = *bytes
        .get(count_at)
        .ok_or_else(|| CodecError::Rejected(format!("short {}", what)))? as usize;
    if bytes.len() < count_at + 1 + entry * count {
        return Err(CodecError::Rejected(format!("{} component list truncated", what)));
    }
    Ok(count)
}

/// Copy `data` into `out`, applying `retag`.
pub fn rewrite(data: &[u8], retag: &Retag, out: &mut Vec<u8>) -> CodecResult<()> {
    let probe = probe(data)?;
    let id_map: Option<([u8; 3], [u8; 3])> = match (retag.component_ids, probe.components()) {
        (Some(new), 3) => {
            let old = &probe.component_ids;
            Some(([old[0], old[1], old[2]], new))
        }
        (Some(_), n) => {
            return Err(CodecError::Fatal(format!(
                "cannot retag a {}-component frame",
                n
            )))
        }
        (None, _) => None,
    };
    let map_id = |id: u8| -> u8 {
        match id_map {
            Some((old, new)) => old.iter().position(|&o| o == id).map_or(id, |i| new[i]),
            None => id,
        }
    };

    out.clear();
    out.try_reserve(data.len() + 16)
        .map_err(|e| CodecError::Fatal(e.to_string()))?;
    out.extend_from_slice(&data[..2]);
    if let (Some(transform), None) = (retag.adobe_transform, probe.adobe_transform) {
        write_adobe(out, transform);
    }

    let mut pos = 2;
    while pos < data.len() {
        let seg = next_segment(data, pos)?;
        let bytes = &data[seg.start..seg.end];
        pos = seg.end;

        match seg.marker {
            APP0 if retag.drop_jfif && seg.payload(data).starts_with(b"JFIF\0") => {}
            APP14 if seg.payload(data).starts_with(b"Adobe") && bytes.len() >= 16 => {
                let at = out.len();
                out.extend_from_slice(bytes);
                if let Some(transform) = retag.adobe_transform {
                    out[at + 15] = transform;
                }
            }
            m if is_sof(m) => {
                let count = component_count(bytes, 9, 3, "frame header")?;
                let at = out.len();
                out.extend_from_slice(bytes);
                for i in 0..count {
                    let idx = at + 10 + 3 * i;
                    out[idx] = map_id(out[idx]);
                }
            }
            SOS => {
                let count = component_count(bytes, 4, 2, "scan header")?;
                let at = out.len();
                out.extend_from_slice(bytes);
                for i in 0..count {
                    let idx = at + 5 + 2 * i;
                    out[idx] = map_id(out[idx]);
                }
                let next = skip_entropy(data, pos);
                out.extend_from_slice(&data[pos..next]);
                pos = next;
            }
            EOI => {
                out.extend_from_slice(bytes);
                out.extend_from_slice(&data[pos..]);
                break;
            }
            _ => out.extend_from_slice(bytes),
        }
    }
    Ok(())
}
