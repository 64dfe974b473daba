//! LRU cache of compiled policy patterns
//!
//! Filters repeat across requests, so compiled regexes are kept keyed by their
//! source. The cache holds no identity data and may be shared between
//! request-scoped engines.

use crate::error::Result;
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// A compiled, shareable policy pattern
pub type CompiledPattern = Arc<Regex>;

/// Default number of cached patterns
pub const DEFAULT_CAPACITY: usize = 256;

/// LRU cache of compiled patterns
pub struct PatternCache {
    cache: Mutex<LruCache<String, CompiledPattern>>,
}

impl PatternCache {
    /// Create a new pattern cache with given capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        PatternCache {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Create a pattern cache with the default capacity
    pub fn new_default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Compiled regex for `source`, compiling on first use
    pub fn compile(&self, source: &str) -> Result<CompiledPattern> {
        let mut cache = self.cache.lock();
        if let Some(pattern) = cache.get(source) {
            return Ok(Arc::clone(pattern));
        }

        let pattern = Arc::new(Regex::new(source)?);
        cache.put(source.to_string(), Arc::clone(&pattern));
        Ok(pattern)
    }

    pub fn contains(&self, source: &str) -> bool {
        self.cache.lock().contains(source)
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new_default()
    }
}
