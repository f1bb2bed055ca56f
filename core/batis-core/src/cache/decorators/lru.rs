//! Bounded least-recently-used eviction
//!
//! The decorator keeps its own access-ordered key index (an `lru::LruCache`
//! of keys only) and uses it purely to pick a victim; values stay in the
//! delegate. The index sits behind a mutex, so the decorator is safe to use
//! without an outer BlockingCache, although per-key population still needs
//! one to avoid duplicate work.

use crate::cache::{Cache, CacheKey};
use crate::error::{BatisError, BatisResult};
use crate::value::Value;
use lru::LruCache as KeyIndex;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

pub const DEFAULT_LRU_SIZE: usize = 1024;

pub struct LruCache {
    delegate: Arc<dyn Cache>,
    key_map: Mutex<KeyIndex<CacheKey, ()>>,
}

impl LruCache {
    /// Wraps `delegate` with the default size of 1024 keys.
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self {
            delegate,
            key_map: Mutex::new(KeyIndex::new(default_capacity())),
        }
    }

    pub fn with_size(delegate: Arc<dyn Cache>, size: usize) -> BatisResult<Self> {
        let cache = Self::new(delegate);
        cache.set_size(size)?;
        Ok(cache)
    }

    /// Rebuilds the key index with a new bound; prior recency is forgotten.
    pub fn set_size(&self, size: usize) -> BatisResult<()> {
        let capacity = NonZeroUsize::new(size)
            .ok_or_else(|| BatisError::Config("LRU cache size must be > 0".to_string()))?;
        *self.key_map.lock() = KeyIndex::new(capacity);
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.key_map.lock().cap().get()
    }

    /// Number of keys currently tracked for recency.
    pub fn tracked(&self) -> usize {
        self.key_map.lock().len()
    }

    /// Marks `key` most recently used and returns the evicted key, if any.
    fn cycle_key_list(&self, key: CacheKey) -> Option<CacheKey> {
        let mut key_map = self.key_map.lock();
        match key_map.push(key.clone(), ()) {
            // push hands back the old entry when the key was already present
            Some((eldest, _)) if eldest != key => Some(eldest),
            _ => None,
        }
    }
}

fn default_capacity() -> NonZeroUsize {
    NonZeroUsize::new(DEFAULT_LRU_SIZE).unwrap_or(NonZeroUsize::MIN)
}

impl Cache for LruCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: Value) -> BatisResult<()> {
        self.delegate.put(key.clone(), value)?;
        if let Some(eldest) = self.cycle_key_list(key) {
            tracing::trace!(target: "cache", id = self.id(), key = %eldest, "evicting least recently used entry");
            self.delegate.remove(&eldest)?;
        }
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> BatisResult<Option<Value>> {
        // touch
        self.key_map.lock().get(key);
        self.delegate.get(key)
    }

    fn remove(&self, key: &CacheKey) -> BatisResult<Option<Value>> {
        self.key_map.lock().pop(key);
        self.delegate.remove(key)
    }

    fn release(&self, key: &CacheKey) -> BatisResult<()> {
        self.delegate.release(key)
    }

    fn clear(&self) {
        self.delegate.clear();
        self.key_map.lock().clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PerpetualCache;

    fn key(n: i64) -> CacheKey {
        CacheKey::from_components([Value::Int(n)])
    }

    fn lru(size: usize) -> (Arc<PerpetualCache>, LruCache) {
        let backing = Arc::new(PerpetualCache::new("lru"));
        let cache = LruCache::with_size(backing.clone(), size).unwrap();
        (backing, cache)
    }

    #[test]
    fn evicts_least_recently_used() {
        let (backing, cache) = lru(2);
        cache.put(key(1), Value::Int(1)).unwrap();
        cache.put(key(2), Value::Int(2)).unwrap();
        cache.put(key(3), Value::Int(3)).unwrap();

        assert_eq!(cache.size(), 2);
        assert!(!backing.contains(&key(1)));
        assert!(backing.contains(&key(2)));
        assert!(backing.contains(&key(3)));
    }

    #[test]
    fn get_refreshes_recency() {
        let (backing, cache) = lru(2);
        cache.put(key(1), Value::Int(1)).unwrap();
        cache.put(key(2), Value::Int(2)).unwrap();
        assert_eq!(cache.get(&key(1)).unwrap(), Some(Value::Int(1)));
        cache.put(key(3), Value::Int(3)).unwrap();

        assert!(backing.contains(&key(1)));
        assert!(!backing.contains(&key(2)));
    }

    #[test]
    fn get_touches_even_when_backing_value_is_gone() {
        let (backing, cache) = lru(2);
        cache.put(key(1), Value::Int(1)).unwrap();
        cache.put(key(2), Value::Int(2)).unwrap();
        backing.remove(&key(1)).unwrap();

        assert_eq!(cache.get(&key(1)).unwrap(), None);
        cache.put(key(3), Value::Int(3)).unwrap();
        // key 2 was least recently touched
        assert!(!backing.contains(&key(2)));
    }

    #[test]
    fn re_put_does_not_evict() {
        let (_, cache) = lru(2);
        cache.put(key(1), Value::Int(1)).unwrap();
        cache.put(key(2), Value::Int(2)).unwrap();
        cache.put(key(2), Value::Int(20)).unwrap();
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.get(&key(1)).unwrap(), Some(Value::Int(1)));
    }

    #[test]
    fn remove_untracks_key() {
        let (_, cache) = lru(2);
        cache.put(key(1), Value::Int(1)).unwrap();
        cache.remove(&key(1)).unwrap();
        assert_eq!(cache.tracked(), 0);
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn set_size_forgets_recency() {
        let (backing, cache) = lru(2);
        cache.put(key(1), Value::Int(1)).unwrap();
        cache.put(key(2), Value::Int(2)).unwrap();
        cache.set_size(1).unwrap();
        assert_eq!(cache.tracked(), 0);
        assert_eq!(cache.capacity(), 1);

        cache.put(key(3), Value::Int(3)).unwrap();
        cache.put(key(4), Value::Int(4)).unwrap();
        assert!(!backing.contains(&key(3)));
        // untracked entries are left alone
        assert!(backing.contains(&key(1)));
    }

    #[test]
    fn zero_size_is_rejected() {
        let (_, cache) = lru(2);
        assert!(matches!(cache.set_size(0), Err(BatisError::Config(_))));
    }

    #[test]
    fn default_size() {
        let cache = LruCache::new(Arc::new(PerpetualCache::new("d")));
        assert_eq!(cache.capacity(), DEFAULT_LRU_SIZE);
        assert_eq!(cache.id(), "d");
    }
}
