//! LRU cache of (parent id, child name) to child id lookups.
//!
//! Remote drives resolve paths one segment at a time; caching each hop
//! collapses repeated traversals of the same directories into a single
//! request per segment.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

pub const DEFAULT_PATH_CACHE_CAPACITY: usize = 512;

pub struct PathCache {
    inner: Mutex<LruCache<(String, String), String>>,
}

impl PathCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_PATH_CACHE_CAPACITY).unwrap());
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, parent_id: &str, name: &str) -> Option<String> {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .get(&(parent_id.to_string(), name.to_string()))
            .cloned()
    }

    pub fn insert(&self, parent_id: &str, name: &str, child_id: &str) {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.put(
            (parent_id.to_string(), name.to_string()),
            child_id.to_string(),
        );
    }

    /// Drop a single entry, after a cached id turned out to be stale.
    pub fn invalidate(&self, parent_id: &str, name: &str) {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.pop(&(parent_id.to_string(), name.to_string()));
    }

    pub fn clear(&self) {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.clear();
    }
}

impl Default for PathCache {
    fn default() -> Self {
        Self::new(DEFAULT_PATH_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_invalidate() {
        let cache = PathCache::new(4);
        cache.insert("root", "images", "id-1");
        assert_eq!(cache.get("root", "images").as_deref(), Some("id-1"));
        assert_eq!(cache.get("root", "other"), None);

        cache.invalidate("root", "images");
        assert_eq!(cache.get("root", "images"), None);
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let cache = PathCache::new(2);
        cache.insert("p", "a", "1");
        cache.insert("p", "b", "2");
        // Touch "a" so "b" is the eviction candidate.
        cache.get("p", "a");
        cache.insert("p", "c", "3");

        assert_eq!(cache.get("p", "a").as_deref(), Some("1"));
        assert_eq!(cache.get("p", "b"), None);
        assert_eq!(cache.get("p", "c").as_deref(), Some("3"));
    }
}
