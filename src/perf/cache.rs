//! Bounded LRU cache for code bodies and rendered diffs.

use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Default item cap.
pub const DEFAULT_MAX_ITEMS: usize = 1000;

/// Default aggregate size cap in megabytes.
pub const DEFAULT_MAX_SIZE_MB: u64 = 100;

/// Cache statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub items: usize,
    pub size_mb: f64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Puts declined because the entry alone exceeded the size cap.
    pub declined_writes: u64,
}

impl CacheStats {
    /// Hit rate over all lookups; 0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheEntry {
    content: String,
    size_bytes: u64,
}

struct CacheInner {
    entries: LruCache<String, CacheEntry>,
    total_bytes: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    declined_writes: u64,
}

/// Synchronized LRU keyed by string, bounded by two independent caps:
/// item count and aggregate size.
///
/// The engine is single-threaded; the internal lock exists so a future
/// implementation may offload I/O to a worker without changing callers.
pub struct ContentCache {
    inner: Mutex<CacheInner>,
    max_items: usize,
    max_size_bytes: u64,
}

impl ContentCache {
    /// Create a cache with the default caps (1000 items, 100 MB).
    pub fn new() -> Self {
        Self::with_caps(DEFAULT_MAX_ITEMS, DEFAULT_MAX_SIZE_MB)
    }

    /// Create a cache with explicit caps.
    pub fn with_caps(max_items: usize, max_size_mb: u64) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::unbounded(),
                total_bytes: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                declined_writes: 0,
            }),
            max_items: max_items.max(1),
            max_size_bytes: max_size_mb * 1024 * 1024,
        }
    }

    /// Look up a key, promoting it to most-recently-used.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock().expect("content cache lock poisoned");
        let found = inner.entries.get(key).map(|entry| entry.content.clone());
        match found {
            Some(content) => {
                inner.hits += 1;
                Some(content)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert a value, evicting LRU entries until both caps admit it.
    ///
    /// An entry that alone exceeds the size cap is declined silently; the
    /// `declined_writes` counter records the skip.
    pub fn put(&self, key: impl Into<String>, content: impl Into<String>) {
        let key = key.into();
        let content = content.into();
        let size_bytes = content.len() as u64;

        let mut inner = self.inner.lock().expect("content cache lock poisoned");
        if size_bytes > self.max_size_bytes {
            inner.declined_writes += 1;
            return;
        }

        // Replacing an existing key must not double-count its size.
        if let Some(old) = inner.entries.pop(&key) {
            inner.total_bytes -= old.size_bytes;
        }

        while inner.entries.len() >= self.max_items
            || inner.total_bytes + size_bytes > self.max_size_bytes
        {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => {
                    inner.total_bytes -= evicted.size_bytes;
                    inner.evictions += 1;
                }
                None => break,
            }
        }

        inner.total_bytes += size_bytes;
        inner
            .entries
            .push(key, CacheEntry {
                content,
                size_bytes,
            });
    }

    /// Drop every entry, keeping counters.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("content cache lock poisoned");
        inner.entries.clear();
        inner.total_bytes = 0;
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("content cache lock poisoned");
        CacheStats {
            items: inner.entries.len(),
            size_mb: inner.total_bytes as f64 / 1024.0 / 1024.0,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            declined_writes: inner.declined_writes,
        }
    }
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::new()
    }
}
