// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Composition caching.
//!
//! Resolving a composition loads and parses every document it touches. A
//! resolved [`Composition`] is immutable, so it can be cached and shared as
//! an `Arc` between concurrent renders of the same root.
//!
//! # Cache Implementations
//!
//! - [`MemoryCache`]: In-memory LRU cache
//! - [`NoOpCache`]: Never stores anything (development mode)
//!
//! # Custom Caches
//!
//! Implement the [`CompositionCache`] trait for other strategies.

use crate::composition::Composition;
use crate::error::{Result, SkeinError};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

/// Trait for composition caches.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait CompositionCache: Send + Sync + std::fmt::Debug {
    /// Retrieves a composition from the cache.
    fn get(&self, key: &str) -> Result<Option<Arc<Composition>>>;
    /// Stores a composition in the cache.
    fn set(&self, key: &str, composition: Arc<Composition>) -> Result<()>;
    /// Removes a composition from the cache.
    fn remove(&self, key: &str) -> Result<()>;
    /// Clears all cached compositions.
    fn clear(&self) -> Result<()>;
    /// Checks if a key exists in the cache.
    fn contains_key(&self, key: &str) -> bool;
}

/// In-memory LRU (Least Recently Used) cache.
///
/// Clones share the same storage.
///
/// # Examples
///
/// ```
/// use skein::cache::{CompositionCache, MemoryCache};
///
/// let cache = MemoryCache::new(100);
/// assert!(!cache.contains_key("pages/home"));
/// ```
#[derive(Debug, Clone)]
pub struct MemoryCache {
    cache: Arc<Mutex<LruCache<String, Arc<Composition>>>>,
}

impl MemoryCache {
    /// Creates a new memory cache holding at most `capacity` compositions.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LruCache<String, Arc<Composition>>>> {
        self.cache
            .lock()
            .map_err(|_| SkeinError::Cache("Failed to acquire cache lock".to_string()))
    }

    /// Number of cached compositions.
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |cache| cache.len())
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CompositionCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Arc<Composition>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, composition: Arc<Composition>) -> Result<()> {
        self.lock()?.put(key.to_string(), composition);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.pop(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    fn contains_key(&self, key: &str) -> bool {
        self.lock().map_or(false, |cache| cache.contains(key))
    }
}

/// No-op cache that never stores or retrieves anything.
///
/// Useful for development mode where every render should see fresh sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCache;

impl NoOpCache {
    /// Creates a new no-op cache.
    pub fn new() -> Self {
        Self
    }
}

impl CompositionCache for NoOpCache {
    fn get(&self, _key: &str) -> Result<Option<Arc<Composition>>> {
        Ok(None)
    }

    fn set(&self, _key: &str, _composition: Arc<Composition>) -> Result<()> {
        Ok(())
    }

    fn remove(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }

    fn contains_key(&self, _key: &str) -> bool {
        false
    }
}
