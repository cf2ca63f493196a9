//! Classification result cache
//!
//! Re-classifying the same finished message is common (message re-render,
//! session reload), so results are cached under an LRU eviction strategy.
//! Keys include a fingerprint of the extraction flags: the same text
//! classified under different toggles is a different entry.

use lru::LruCache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;

use super::Classification;

/// Maximum cache entries
const CACHE_SIZE: usize = 100;

/// Cache for classification results
pub struct ClassificationCache {
    cache: LruCache<u64, Classification>,
}

impl ClassificationCache {
    /// Create a new classification cache
    pub fn new() -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(CACHE_SIZE).unwrap()),
        }
    }

    /// Get a cached classification
    pub fn get(&mut self, text: &str, fingerprint: &str) -> Option<Classification> {
        self.cache.get(&Self::key(text, fingerprint)).cloned()
    }

    /// Store a classification result
    pub fn insert(&mut self, text: &str, fingerprint: &str, classification: Classification) {
        self.cache.put(Self::key(text, fingerprint), classification);
    }

    /// Clear the cache
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.cache.len(),
            capacity: self.cache.cap().get(),
        }
    }

    fn key(text: &str, fingerprint: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        fingerprint.hash(&mut hasher);
        hasher.finish()
    }
}

impl Default for ClassificationCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_classification() -> Classification {
        Classification {
            artifacts: Vec::new(),
            cleaned_text: "hello".to_string(),
            confidence: 0.0,
        }
    }

    #[test]
    fn test_hit_and_miss() {
        let mut cache = ClassificationCache::new();
        cache.insert("hello", "all", empty_classification());

        assert!(cache.get("hello", "all").is_some());
        assert!(cache.get("hello", "code-only").is_none());
        assert!(cache.get("other", "all").is_none());
    }

    #[test]
    fn test_clear_and_stats() {
        let mut cache = ClassificationCache::new();
        cache.insert("a", "f", empty_classification());
        cache.insert("b", "f", empty_classification());

        let stats = cache.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.capacity, CACHE_SIZE);

        cache.clear();
        assert_eq!(cache.stats().size, 0);
    }
}
