//! Line metadata cache
//!
//! Process-local map from line identifier to [`LineInfo`]. Entries are
//! inserted once and never expire or get replaced; the key space is the set
//! of transit lines, which is small and stable. Concurrent misses on one
//! line share a single lookup.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use moka::future::Cache;
use tracing::debug;

use crate::error::IdfmError;
use crate::models::LineInfo;

/// Line cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineCacheStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Current number of entries
    pub entries: u64,
}

/// Insert-if-absent cache of resolved line metadata
///
/// Cloning is cheap and every clone shares the same entries and counters.
#[derive(Clone)]
pub struct LineCache {
    cache: Cache<String, LineInfo>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl std::fmt::Debug for LineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineCache")
            .field("entries", &self.cache.entry_count())
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for LineCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCache {
    /// Create an empty, unbounded cache without expiry
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().name("line-info").build(),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Look up a line
    pub async fn get(&self, line_id: &str) -> Option<LineInfo> {
        let cached = self.cache.get(line_id).await;
        if cached.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(%line_id, "Line cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(%line_id, "Line cache miss");
        }
        cached
    }

    /// Return the cached line, or run `init` and cache its result
    ///
    /// An existing entry is never replaced. Concurrent callers missing on the
    /// same line wait for one `init` instead of running their own. Errors are
    /// returned to every waiting caller and nothing is cached.
    pub async fn try_get_with<F>(&self, line_id: &str, init: F) -> Result<LineInfo, IdfmError>
    where
        F: Future<Output = Result<LineInfo, IdfmError>>,
    {
        if let Some(line) = self.get(line_id).await {
            return Ok(line);
        }

        let line = self
            .cache
            .try_get_with(line_id.to_string(), init)
            .await
            .map_err(Arc::unwrap_or_clone)?;
        debug!(%line_id, "Line cached");
        Ok(line)
    }

    /// Current statistics
    pub fn stats(&self) -> LineCacheStats {
        LineCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.entry_count(),
        }
    }

    /// Whether a line is cached, without touching the hit/miss counters
    pub fn contains(&self, line_id: &str) -> bool {
        self.cache.contains_key(line_id)
    }
}
