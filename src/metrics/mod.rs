//! Round-trip quality metrics.
//!
//! Used by `encode --verify` and by tests to check that a decoded image is
//! within lossy-compression tolerance of its source.

mod psnr;

pub use psnr::{calculate_psnr, max_abs_diff, PsnrResult};
