//! Parallel JPEG transcoding.
//!
//! Every worker thread owns one [`DecoderSession`] / [`EncoderSession`] pair
//! and reuses it for each file it picks up, so sessions are never shared.
//!
//! # Example
//!
//! ```rust,ignore
//! use jpeg_session::batch::{BatchOptions, BatchTranscoder};
//! use std::path::Path;
//!
//! let transcoder = BatchTranscoder::new(BatchOptions::default()).threads(4);
//! let stats = transcoder.process_directory(Path::new("in"), Path::new("out"))?;
//! println!("{} of {} files transcoded", stats.successful, stats.total_files);
//! ```

mod file_discovery;

pub use file_discovery::FileDiscovery;

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;

use crate::config::{normalize_quality, BatchSettings};
use crate::decoder::DecoderSession;
use crate::encoder::EncoderSession;
use crate::error::{Result, SessionError};
use crate::format::{ColorSpace, PixelFormat};
use crate::pipeline::default_color_space;

/// What each file is transcoded to.
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Quality of the re-encoded stream (0 selects the default).
    pub quality: u8,
    /// Intermediate pixel format; `None` keeps the stream's own colour space.
    pub format: Option<PixelFormat>,
    /// Stored colour space; `None` derives it from the pixel format.
    pub color_space: Option<ColorSpace>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            quality: normalize_quality(0),
            format: None,
            color_space: None,
        }
    }
}

/// Outcome of one file.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    /// Input JPEG.
    pub source: PathBuf,
    /// Output JPEG.
    pub output: PathBuf,
    /// Input size in bytes.
    pub input_size: u64,
    /// Output size in bytes, on success.
    pub output_size: Option<u64>,
    /// Error message, on failure.
    pub error: Option<String>,
    /// Processing time in milliseconds.
    pub duration_ms: u64,
}

impl FileOutcome {
    /// Whether the file was transcoded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated batch statistics.
#[derive(Debug, Default, Clone)]
pub struct BatchStats {
    /// Files attempted.
    pub total_files: usize,
    /// Files transcoded.
    pub successful: usize,
    /// Files that failed.
    pub failed: usize,
    /// Sum of input sizes.
    pub total_input_bytes: u64,
    /// Sum of output sizes.
    pub total_output_bytes: u64,
    /// Wall time in milliseconds.
    pub total_time_ms: u64,
}

impl BatchStats {
    /// Input bytes over output bytes for the successful files.
    pub fn overall_ratio(&self) -> f64 {
        if self.total_output_bytes == 0 {
            0.0
        } else {
            self.total_input_bytes as f64 / self.total_output_bytes as f64
        }
    }

    fn add(&mut self, outcome: &FileOutcome) {
        self.total_files += 1;
        match outcome.output_size {
            Some(size) => {
                self.successful += 1;
                self.total_input_bytes += outcome.input_size;
                self.total_output_bytes += size;
            }
            None => self.failed += 1,
        }
    }
}

/// Parallel transcoder for a set of JPEG files.
pub struct BatchTranscoder {
    options: BatchOptions,
    threads: usize,
    recursive: bool,
}

type Workers = (DecoderSession<'static>, EncoderSession<'static>);

impl BatchTranscoder {
    /// Create a transcoder using one thread per CPU.
    pub fn new(options: BatchOptions) -> Self {
        Self::from_settings(options, &BatchSettings::default())
    }

    /// Create a transcoder from the `[batch]` settings.
    pub fn from_settings(options: BatchOptions, settings: &BatchSettings) -> Self {
        Self {
            options,
            threads: settings.resolved_threads(),
            recursive: settings.recursive,
        }
    }

    /// Set the worker count (0 = one per CPU).
    pub fn threads(mut self, n: usize) -> Self {
        self.threads = if n == 0 { num_cpus::get() } else { n };
        self
    }

    /// Descend into subdirectories.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Transcode every JPEG under `input_dir` into `output_dir`, keeping the
    /// relative layout.
    pub fn process_directory(&self, input_dir: &Path, output_dir: &Path) -> Result<BatchStats> {
        self.process_directory_with(input_dir, output_dir, |_| {})
    }

    /// As [`BatchTranscoder::process_directory`], calling `on_file` as each
    /// file completes.
    pub fn process_directory_with<F>(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        on_file: F,
    ) -> Result<BatchStats>
    where
        F: Fn(&FileOutcome) + Sync,
    {
        let files = self.discover(input_dir)?;
        if files.is_empty() {
            return Err(SessionError::InvalidParameter(format!(
                "no JPEG files found in {}",
                input_dir.display()
            )));
        }
        let jobs: Vec<(PathBuf, PathBuf)> = files
            .into_iter()
            .map(|file| {
                let out = output_path(&file, input_dir, output_dir);
                (file, out)
            })
            .collect();
        self.process_jobs(&jobs, on_file)
    }

    /// Files that [`BatchTranscoder::process_directory`] would pick up.
    pub fn discover(&self, input_dir: &Path) -> Result<Vec<PathBuf>> {
        FileDiscovery::new().recursive(self.recursive).discover(input_dir)
    }

    /// Transcode explicit `(input, output)` pairs.
    pub fn process_jobs<F>(&self, jobs: &[(PathBuf, PathBuf)], on_file: F) -> Result<BatchStats>
    where
        F: Fn(&FileOutcome) + Sync,
    {
        let start = Instant::now();
        log::info!("Transcoding {} files on {} threads", jobs.len(), self.threads);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| SessionError::Internal(e.to_string()))?;

        let outcomes: Vec<FileOutcome> = pool.install(|| {
            jobs.par_iter()
                .map_init(
                    || -> Workers { (DecoderSession::new(), EncoderSession::new()) },
                    |workers, (input, output)| {
                        let outcome = self.transcode_one(workers, input, output);
                        on_file(&outcome);
                        outcome
                    },
                )
                .collect()
        });

        let mut stats = BatchStats::default();
        for outcome in &outcomes {
            stats.add(outcome);
            if let Some(ref e) = outcome.error {
                log::warn!("{}: {}", outcome.source.display(), e);
            }
        }
        stats.total_time_ms = start.elapsed().as_millis() as u64;
        log::info!(
            "Batch complete: {} ok, {} failed, ratio {:.2}",
            stats.successful,
            stats.failed,
            stats.overall_ratio()
        );
        Ok(stats)
    }

    fn transcode_one(&self, workers: &mut Workers, input: &Path, output: &Path) -> FileOutcome {
        let start = Instant::now();
        let input_size = std::fs::metadata(input).map(|m| m.len()).unwrap_or(0);
        let result = self.transcode(workers, input, output);
        FileOutcome {
            source: input.to_path_buf(),
            output: output.to_path_buf(),
            input_size,
            output_size: result.as_ref().ok().copied(),
            error: result.err().map(|e| e.to_string()),
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn transcode(&self, workers: &mut Workers, input: &Path, output: &Path) -> Result<u64> {
        let (decoder, encoder) = workers;

        decoder.configure_path(input)?;
        let info = decoder.query_info()?;
        let format = self
            .options
            .format
            .unwrap_or_else(|| PixelFormat::for_color_space(info.color_space));
        let color_space = self
            .options
            .color_space
            .unwrap_or_else(|| default_color_space(format));

        let row_bytes = format.row_bytes(info.width);
        let mut pixels = Vec::new();
        pixels.try_reserve_exact(row_bytes * info.height as usize)?;
        pixels.resize(row_bytes * info.height as usize, 0);
        decoder.decode_whole(format, &mut pixels, row_bytes as isize)?;

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        encoder.configure_path(output, self.options.quality)?;
        let status = encoder.encode_whole(
            format,
            color_space,
            &pixels,
            row_bytes as isize,
            info.width,
            info.height,
        )?;
        log::debug!("{} -> {} ({} bytes)", input.display(), output.display(), status.byte_count());
        Ok(status.byte_count())
    }
}

/// Output location of `file`: its path relative to `base`, under `output_dir`.
fn output_path(file: &Path, base: &Path, output_dir: &Path) -> PathBuf {
    let relative = file
        .strip_prefix(base)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| file.file_name().map(PathBuf::from).unwrap_or_default());
    output_dir.join(relative).with_extension("jpg")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn write_jpeg(path: &Path, format: PixelFormat, color_space: ColorSpace) {
        let src = vec![90u8; format.row_bytes(16) * 16];
        let mut session = EncoderSession::new();
        session.configure_path(path, 90).unwrap();
        session
            .encode_whole(format, color_space, &src, format.row_bytes(16) as isize, 16, 16)
            .unwrap();
    }

    fn create_test_directory() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_jpeg(&dir.path().join("gray.jpg"), PixelFormat::GRAY, ColorSpace::Gray);
        write_jpeg(&dir.path().join("color.jpeg"), PixelFormat::RGB, ColorSpace::YCbCr);
        std::fs::write(dir.path().join("broken.jpg"), b"not a jpeg").unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        write_jpeg(&sub.join("cmyk.jpg"), PixelFormat::CMYK, ColorSpace::Cmyk);
        dir
    }

    #[test]
    fn test_output_path_keeps_layout() {
        let out = output_path(Path::new("/in/a/b.jpeg"), Path::new("/in"), Path::new("/out"));
        assert_eq!(out, PathBuf::from("/out/a/b.jpg"));
    }

    #[test]
    fn test_stats_ratio() {
        let mut stats = BatchStats::default();
        stats.add(&FileOutcome {
            source: PathBuf::from("a.jpg"),
            output: PathBuf::from("b.jpg"),
            input_size: 200,
            output_size: Some(100),
            error: None,
            duration_ms: 1,
        });
        assert_eq!(stats.successful, 1);
        assert!((stats.overall_ratio() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_process_directory() {
        let input = create_test_directory();
        let output = TempDir::new().unwrap();
        let seen = AtomicUsize::new(0);

        let stats = BatchTranscoder::new(BatchOptions::default())
            .threads(2)
            .recursive(true)
            .process_directory_with(input.path(), output.path(), |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(stats.total_files, 4);
        assert_eq!(stats.successful, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 4);
        assert!(output.path().join("sub").join("cmyk.jpg").exists());
        assert!(output.path().join("color.jpg").exists());
    }

    #[test]
    fn test_forced_gray_output() {
        let input = create_test_directory();
        let output = TempDir::new().unwrap();
        let options = BatchOptions {
            format: Some(PixelFormat::GRAY),
            ..Default::default()
        };
        let stats = BatchTranscoder::new(options)
            .threads(1)
            .process_directory(input.path(), output.path())
            .unwrap();
        assert_eq!(stats.successful, 2);

        let mut decoder = DecoderSession::new();
        decoder.configure_path(output.path().join("color.jpg")).unwrap();
        assert_eq!(decoder.query_info().unwrap().color_space, ColorSpace::Gray);
    }

    #[test]
    fn test_empty_directory() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        assert!(BatchTranscoder::new(BatchOptions::default())
            .process_directory(input.path(), output.path())
            .is_err());
    }
}
