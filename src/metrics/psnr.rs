//! PSNR (Peak Signal-to-Noise Ratio) over 8-bit samples.
//!
//! - Identical buffers: PSNR = infinity (MSE = 0)
//! - High quality JPEG: PSNR > 40 dB
//! - Typical web quality: PSNR 30-40 dB

use std::fmt;

use crate::error::{Result, SessionError};

const MAX_VALUE: f64 = 255.0;

/// Result of a PSNR calculation.
#[derive(Debug, Clone)]
pub struct PsnrResult {
    /// PSNR in decibels; `f64::INFINITY` for identical buffers.
    pub psnr_db: f64,
    /// Mean squared error over all samples.
    pub mse: f64,
    /// Per-channel PSNR when `channels > 1`.
    pub per_channel: Option<Vec<f64>>,
}

impl PsnrResult {
    /// Whether both buffers were identical.
    pub fn is_identical(&self) -> bool {
        self.mse == 0.0
    }

    /// Coarse quality label.
    pub fn quality_rating(&self) -> &'static str {
        if self.psnr_db.is_infinite() {
            "Identical"
        } else if self.psnr_db > 50.0 {
            "Excellent"
        } else if self.psnr_db > 40.0 {
            "Very Good"
        } else if self.psnr_db > 30.0 {
            "Good"
        } else if self.psnr_db > 20.0 {
            "Fair"
        } else {
            "Poor"
        }
    }
}

impl fmt::Display for PsnrResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.psnr_db.is_infinite() {
            write!(f, "PSNR: Infinity (identical)")
        } else {
            write!(f, "PSNR: {:.2} dB ({})", self.psnr_db, self.quality_rating())
        }
    }
}

fn to_psnr(mse: f64) -> f64 {
    if mse == 0.0 {
        f64::INFINITY
    } else {
        10.0 * (MAX_VALUE * MAX_VALUE / mse).log10()
    }
}

fn check(original: &[u8], decoded: &[u8], channels: usize) -> Result<()> {
    if original.len() != decoded.len() {
        return Err(SessionError::InvalidParameter(format!(
            "sample count mismatch: {} vs {}",
            original.len(),
            decoded.len()
        )));
    }
    if channels == 0 || original.len() % channels != 0 {
        return Err(SessionError::InvalidParameter(format!(
            "{} samples do not divide into {} channels",
            original.len(),
            channels
        )));
    }
    Ok(())
}

fn mse<'a>(pairs: impl Iterator<Item = (&'a u8, &'a u8)>) -> f64 {
    let (sum, n) = pairs.fold((0.0f64, 0usize), |(sum, n), (&a, &b)| {
        let diff = a as f64 - b as f64;
        (sum + diff * diff, n + 1)
    });
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// PSNR between two packed sample buffers of `channels` interleaved channels.
pub fn calculate_psnr(original: &[u8], decoded: &[u8], channels: usize) -> Result<PsnrResult> {
    check(original, decoded, channels)?;

    let per_channel = (channels > 1).then(|| {
        (0..channels)
            .map(|c| {
                let a = original.iter().skip(c).step_by(channels);
                let b = decoded.iter().skip(c).step_by(channels);
                to_psnr(mse(a.zip(b)))
            })
            .collect()
    });

    let mse = mse(original.iter().zip(decoded));
    Ok(PsnrResult {
        psnr_db: to_psnr(mse),
        mse,
        per_channel,
    })
}

/// Largest absolute sample difference.
pub fn max_abs_diff(original: &[u8], decoded: &[u8]) -> Result<u8> {
    check(original, decoded, 1)?;
    Ok(original
        .iter()
        .zip(decoded)
        .map(|(&a, &b)| a.abs_diff(b))
        .max()
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psnr_identical() {
        let data = vec![128u8; 64];
        let result = calculate_psnr(&data, &data, 1).unwrap();
        assert!(result.psnr_db.is_infinite());
        assert!(result.is_identical());
        assert_eq!(result.to_string(), "PSNR: Infinity (identical)");
    }

    #[test]
    fn test_psnr_constant_offset() {
        let a = vec![100u8; 64];
        let b = vec![110u8; 64];
        let result = calculate_psnr(&a, &b, 1).unwrap();
        assert!((result.mse - 100.0).abs() < 1e-9);
        // 10 * log10(255^2 / 100) ~= 28.13 dB
        assert!(result.psnr_db > 28.0 && result.psnr_db < 29.0);
        assert_eq!(result.quality_rating(), "Fair");
    }

    #[test]
    fn test_per_channel() {
        let a = [10u8, 20, 30, 10, 20, 30];
        let b = [10u8, 20, 40, 10, 20, 40];
        let result = calculate_psnr(&a, &b, 3).unwrap();
        let per = result.per_channel.unwrap();
        assert!(per[0].is_infinite());
        assert!(per[1].is_infinite());
        assert!(per[2].is_finite());
    }

    #[test]
    fn test_mismatch_rejected() {
        assert!(calculate_psnr(&[1, 2, 3], &[1, 2], 1).is_err());
        assert!(calculate_psnr(&[1, 2, 3, 4], &[1, 2, 3, 4], 3).is_err());
    }

    #[test]
    fn test_max_abs_diff() {
        assert_eq!(max_abs_diff(&[0, 200, 7], &[3, 190, 7]).unwrap(), 10);
        assert_eq!(max_abs_diff(&[], &[]).unwrap(), 0);
    }
}
