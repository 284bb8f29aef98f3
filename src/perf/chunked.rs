//! Fixed-window iteration over large sequences with inter-chunk memory
//! checks.

use tracing::{debug, warn};

use super::MemoryProbe;
use crate::error::Result;

/// Default window size.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Default RSS ceiling in megabytes.
pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 500;

/// Iterates sequences in fixed-size windows, consulting a memory probe
/// between windows.
///
/// When RSS exceeds the ceiling, the reclaim hook runs before the next
/// window (the controller wires it to `ContentCache::clear`). A window
/// handler that fails is logged and skipped; traversal continues.
pub struct ChunkedProcessor {
    chunk_size: usize,
    memory_limit_bytes: u64,
    probe: MemoryProbe,
    reclaim: Option<Box<dyn Fn()>>,
}

impl ChunkedProcessor {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CHUNK_SIZE, DEFAULT_MEMORY_LIMIT_MB)
    }

    pub fn with_limits(chunk_size: usize, memory_limit_mb: u64) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            memory_limit_bytes: memory_limit_mb * 1024 * 1024,
            probe: MemoryProbe::new(),
            reclaim: None,
        }
    }

    /// Install the hook invoked when the memory ceiling is breached.
    pub fn with_reclaim(mut self, reclaim: impl Fn() + 'static) -> Self {
        self.reclaim = Some(Box::new(reclaim));
        self
    }

    /// Process `items` window by window, collecting handler output.
    pub fn process_chunks<T, R, F>(&self, items: &[T], mut handler: F) -> Vec<R>
    where
        F: FnMut(&[T]) -> Result<Vec<R>>,
    {
        let mut results = Vec::new();
        let total = items.len();

        for (index, chunk) in items.chunks(self.chunk_size).enumerate() {
            let chunk_start = index * self.chunk_size + 1;
            let chunk_end = (chunk_start + chunk.len()).saturating_sub(1);
            debug!(chunk_start, chunk_end, total, "processing chunk");

            match handler(chunk) {
                Ok(chunk_results) => results.extend(chunk_results),
                Err(err) => {
                    warn!(chunk_start, chunk_end, %err, "chunk handler failed, skipping");
                    continue;
                }
            }

            let rss = self.probe.rss_bytes();
            if rss > self.memory_limit_bytes {
                warn!(
                    rss_mb = rss / 1024 / 1024,
                    limit_mb = self.memory_limit_bytes / 1024 / 1024,
                    "memory ceiling exceeded between chunks"
                );
                if let Some(reclaim) = &self.reclaim {
                    reclaim();
                }
            }
        }

        results
    }
}

impl Default for ChunkedProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_processes_all_items_in_windows() {
        let processor = ChunkedProcessor::with_limits(3, DEFAULT_MEMORY_LIMIT_MB);
        let items: Vec<u32> = (0..10).collect();
        let sizes = Rc::new(Cell::new(Vec::new()));

        let sizes_ref = Rc::clone(&sizes);
        let doubled = processor.process_chunks(&items, move |chunk| {
            let mut seen = sizes_ref.take();
            seen.push(chunk.len());
            sizes_ref.set(seen);
            Ok(chunk.iter().map(|x| x * 2).collect())
        });

        assert_eq!(doubled, (0..10).map(|x| x * 2).collect::<Vec<_>>());
        assert_eq!(sizes.take(), vec![3, 3, 3, 1]);
    }

    #[test]
    fn test_failed_chunk_is_skipped() {
        let processor = ChunkedProcessor::with_limits(2, DEFAULT_MEMORY_LIMIT_MB);
        let items: Vec<u32> = (0..6).collect();

        let results = processor.process_chunks(&items, |chunk| {
            if chunk.contains(&2) {
                Err(Error::Internal("poison chunk".into()))
            } else {
                Ok(chunk.to_vec())
            }
        });

        // The window [2, 3] is dropped; the rest survives.
        assert_eq!(results, vec![0, 1, 4, 5]);
    }

    #[test]
    fn test_reclaim_hook_runs_on_tiny_ceiling() {
        let reclaimed = Rc::new(Cell::new(false));
        let flag = Rc::clone(&reclaimed);
        // 0 MB ceiling: every inter-chunk check breaches.
        let processor =
            ChunkedProcessor::with_limits(1, 0).with_reclaim(move || flag.set(true));

        processor.process_chunks(&[1, 2], |chunk| Ok(chunk.to_vec()));
        assert!(reclaimed.get());
    }
}
