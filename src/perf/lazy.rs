//! Deferred text loading with size estimates and previews.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default large-content threshold: 1 MB.
pub const DEFAULT_LARGE_THRESHOLD: u64 = 1024 * 1024;

type Thunk = Box<dyn Fn() -> Result<String>>;

/// Wraps a thunk that materializes text, deferring the load until demanded.
///
/// File-backed loaders answer `size_estimate` from a stat without reading;
/// other loaders fall back to a sampled estimate. Once the thunk has run,
/// the full content is cached and every accessor is cheap.
pub struct LazyLoader {
    thunk: Thunk,
    content: Option<String>,
    size_estimate: Option<u64>,
    threshold: u64,
    source_path: Option<PathBuf>,
}

impl LazyLoader {
    /// Wrap an arbitrary loading thunk.
    pub fn new(thunk: impl Fn() -> Result<String> + 'static) -> Self {
        Self {
            thunk: Box::new(thunk),
            content: None,
            size_estimate: None,
            threshold: DEFAULT_LARGE_THRESHOLD,
            source_path: None,
        }
    }

    /// Wrap a UTF-8 file; the size estimate comes from the file stat.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let thunk_path = path.clone();
        let mut loader = Self::new(move || {
            std::fs::read_to_string(&thunk_path).map_err(Error::Io)
        });
        loader.size_estimate = std::fs::metadata(&path).ok().map(|m| m.len());
        loader.source_path = Some(path);
        loader
    }

    /// Override the large-content threshold.
    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Path of the backing file, when constructed via [`LazyLoader::from_file`].
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Estimated content size in bytes, obtained without a full load when
    /// possible.
    pub fn size_estimate(&mut self) -> u64 {
        if let Some(estimate) = self.size_estimate {
            return estimate;
        }
        if let Some(content) = &self.content {
            let exact = content.len() as u64;
            self.size_estimate = Some(exact);
            return exact;
        }
        // No stat available: sample the first kilobyte and extrapolate.
        let estimate = match (self.thunk)() {
            Ok(full) => {
                let sample_len = full.chars().take(1000).map(char::len_utf8).sum::<usize>();
                if full.len() <= sample_len {
                    full.len() as u64
                } else {
                    (sample_len as u64) * 10
                }
            }
            Err(_) => 0,
        };
        self.size_estimate = Some(estimate);
        estimate
    }

    /// Whether the content counts as large for display purposes.
    pub fn is_large(&mut self) -> bool {
        self.size_estimate() > self.threshold
    }

    /// The full content; loads once and caches.
    pub fn content(&mut self) -> Result<&str> {
        if self.content.is_none() {
            let loaded = (self.thunk)()?;
            self.size_estimate = Some(loaded.len() as u64);
            self.content = Some(loaded);
        }
        Ok(self.content.as_deref().unwrap_or_default())
    }

    /// First `n_lines` of the content.
    ///
    /// Small content is cached as a side effect; large content is read but
    /// deliberately not retained.
    pub fn preview(&mut self, n_lines: usize) -> Result<String> {
        if let Some(content) = &self.content {
            return Ok(take_lines(content, n_lines));
        }
        let full = (self.thunk)()?;
        let preview = take_lines(&full, n_lines);
        self.size_estimate = Some(full.len() as u64);
        if full.len() as u64 <= self.threshold {
            self.content = Some(full);
        }
        Ok(preview)
    }
}

fn take_lines(content: &str, n_lines: usize) -> String {
    content
        .lines()
        .take(n_lines)
        .collect::<Vec<_>>()
        .join("\n")
}
