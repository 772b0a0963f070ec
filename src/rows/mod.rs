//! Row-buffer cache shared by scanline reads and writes.

use crate::error::{Result, SessionError};

/// Reusable array of row start offsets into a caller buffer.
///
/// Capacity only grows. Offsets are rewritten on every [`RowCache::layout`].
#[derive(Debug, Default)]
pub struct RowCache {
    offsets: Vec<usize>,
}

impl RowCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest batch laid out so far.
    pub fn capacity(&self) -> usize {
        self.offsets.capacity()
    }

    /// Compute offsets for `count` rows of `row_bytes` spaced by `stride`.
    ///
    /// A negative stride stores the first row at the end of the buffer and
    /// walks upwards, matching bottom-up raster layouts.
    pub fn layout(
        &mut self,
        count: usize,
        stride: isize,
        row_bytes: usize,
        buf_len: usize,
    ) -> Result<&[usize]> {
        let step = stride.unsigned_abs();
        if step < row_bytes {
            return Err(SessionError::InvalidParameter(format!(
                "row stride {} is smaller than a row ({} bytes)",
                stride, row_bytes
            )));
        }

        let span = match count {
            0 => 0,
            n => (n - 1)
                .checked_mul(step)
                .and_then(|v| v.checked_add(row_bytes))
                .ok_or_else(|| SessionError::InvalidParameter("row span overflows".into()))?,
        };
        if span > buf_len {
            return Err(SessionError::InvalidParameter(format!(
                "buffer holds {} bytes, {} rows need {}",
                buf_len, count, span
            )));
        }

        if self.offsets.capacity() < count {
            self.offsets.try_reserve_exact(count - self.offsets.len())?;
        }
        self.offsets.clear();

        if stride >= 0 {
            self.offsets.extend((0..count).map(|i| i * step));
        } else {
            let last = span - row_bytes;
            self.offsets.extend((0..count).map(|i| last - i * step));
        }

        Ok(&self.offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_down_layout() {
        let mut cache = RowCache::new();
        let offsets = cache.layout(3, 12, 10, 34).unwrap();
        assert_eq!(offsets, &[0, 12, 24]);
    }

    #[test]
    fn test_bottom_up_layout() {
        let mut cache = RowCache::new();
        let offsets = cache.layout(3, -12, 12, 36).unwrap();
        assert_eq!(offsets, &[24, 12, 0]);
    }

    #[test]
    fn test_capacity_never_shrinks() {
        let mut cache = RowCache::new();
        cache.layout(16, 4, 4, 64).unwrap();
        let grown = cache.capacity();
        assert!(grown >= 16);

        let offsets = cache.layout(2, 4, 4, 8).unwrap();
        assert_eq!(offsets.len(), 2);
        assert_eq!(cache.capacity(), grown);
    }

    #[test]
    fn test_rejects_short_buffer() {
        let mut cache = RowCache::new();
        let result = cache.layout(4, 10, 10, 39);
        assert!(matches!(result, Err(SessionError::InvalidParameter(_))));
    }

    #[test]
    fn test_rejects_narrow_stride() {
        let mut cache = RowCache::new();
        assert!(cache.layout(2, 2, 3, 100).is_err());
        assert!(cache.layout(2, -2, 3, 100).is_err());
    }

    #[test]
    fn test_empty_batch() {
        let mut cache = RowCache::new();
        assert!(cache.layout(0, 4, 4, 0).unwrap().is_empty());
    }
}
