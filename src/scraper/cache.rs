//! Most-recently-used page cache.
//!
//! Decoding one entity often touches the same page more than once (a horse
//! page feeds both the profile and the history decoders); the cache keeps
//! the last few rendered pages so those reads skip the browser.

use std::num::NonZeroUsize;

use lru::LruCache;

use super::session::RenderedPage;

/// Bounded LRU cache keyed by URL. A capacity of zero disables caching.
pub struct PageCache {
    inner: Option<LruCache<String, RenderedPage>>,
}

impl PageCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(max_entries).map(LruCache::new),
        }
    }

    /// Get a page and mark it most recently used.
    pub fn get(&mut self, url: &str) -> Option<RenderedPage> {
        self.inner.as_mut()?.get(url).cloned()
    }

    /// Insert a page, evicting the least recently used one when full.
    pub fn insert(&mut self, page: RenderedPage) {
        if let Some(cache) = self.inner.as_mut() {
            cache.put(page.url().to_string(), page);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        if let Some(cache) = self.inner.as_mut() {
            cache.clear();
        }
    }
}
