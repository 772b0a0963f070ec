//! Configuration types for encoder, decoder and batch settings.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Quality used when a caller passes `0`.
pub const DEFAULT_QUALITY: u8 = 75;

/// Map a requested quality into `1..=100`, substituting the default for `0`.
pub fn normalize_quality(quality: u8) -> u8 {
    match quality {
        0 => DEFAULT_QUALITY,
        q if q > 100 => {
            log::debug!("quality {} clamped to 100", q);
            100
        }
        q => q,
    }
}

/// Encoder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// JPEG quality (0 selects the default).
    pub quality: u8,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
        }
    }
}

/// Decoder settings applied by [`crate::DecoderSession::decode_to_vec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderSettings {
    /// Pad each output row to a multiple of `row_alignment` bytes.
    pub align_rows: bool,
    /// Row alignment in bytes when `align_rows` is set.
    pub row_alignment: usize,
    /// Value written into row padding.
    pub pad_value: u8,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            align_rows: true,
            row_alignment: 4,
            pad_value: 0xFF,
        }
    }
}

impl DecoderSettings {
    /// Tightly packed rows, no padding.
    pub fn packed() -> Self {
        Self {
            align_rows: false,
            ..Default::default()
        }
    }

    /// Row stride for `row_bytes` of pixel data.
    pub fn stride_for(&self, row_bytes: usize) -> usize {
        if self.align_rows && self.row_alignment > 1 {
            row_bytes.next_multiple_of(self.row_alignment)
        } else {
            row_bytes
        }
    }
}

/// Batch transcoding settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BatchSettings {
    /// Worker threads (0 = one per CPU).
    pub threads: usize,
    /// Descend into subdirectories.
    pub recursive: bool,
}

impl BatchSettings {
    /// Worker count after resolving `0`.
    pub fn resolved_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}

/// Top-level settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SessionConfig {
    /// Encoder settings.
    pub encoder: EncoderSettings,
    /// Decoder settings.
    pub decoder: DecoderSettings,
    /// Batch settings.
    pub batch: BatchSettings,
}

impl SessionConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: SessionConfig = toml::from_str(s)?;
        config.validated()
    }

    /// Load a TOML settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validated(mut self) -> Result<Self> {
        let q = normalize_quality(self.encoder.quality);
        if q != self.encoder.quality {
            log::warn!("encoder quality {} adjusted to {}", self.encoder.quality, q);
            self.encoder.quality = q;
        }
        if self.decoder.row_alignment == 0 {
            log::warn!("decoder row_alignment 0 treated as 1");
            self.decoder.row_alignment = 1;
        }
        Ok(self)
    }
}
