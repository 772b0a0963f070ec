//! JPEG file discovery for batch transcoding.

use std::path::{Path, PathBuf};

use crate::error::{Result, SessionError};

/// Finds JPEG files under a directory.
pub struct FileDiscovery {
    recursive: bool,
    /// Lower-case extensions, without the dot.
    extensions: Vec<String>,
    /// Maximum depth for recursive scanning (None = unlimited).
    max_depth: Option<usize>,
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl FileDiscovery {
    /// Match `*.jpg` and `*.jpeg`, non-recursively.
    pub fn new() -> Self {
        Self {
            recursive: false,
            extensions: vec!["jpg".to_string(), "jpeg".to_string()],
            max_depth: None,
        }
    }

    /// Enable recursive scanning.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Limit recursion depth (0 = top level only).
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Replace the accepted extensions.
    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Sorted list of matching files under `dir`.
    pub fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(SessionError::InvalidParameter(format!(
                "not a directory: {}",
                dir.display()
            )));
        }

        let mut files = Vec::new();
        self.walk(dir, 0, &mut files)?;
        files.sort();
        log::debug!("found {} files under {}", files.len(), dir.display());
        Ok(files)
    }

    fn walk(&self, dir: &Path, depth: usize, files: &mut Vec<PathBuf>) -> Result<()> {
        if self.max_depth.is_some_and(|max| depth > max) {
            return Ok(());
        }

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let Ok(metadata) = std::fs::symlink_metadata(&path) else {
                continue;
            };

            if metadata.is_dir() {
                if self.recursive {
                    self.walk(&path, depth + 1, files)?;
                }
            } else if metadata.is_file() && self.matches(&path) {
                files.push(path);
            }
        }
        Ok(())
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }
}
