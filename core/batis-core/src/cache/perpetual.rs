//! Unbounded hash-map backing cache

use super::{Cache, CacheKey};
use crate::error::BatisResult;
use crate::value::Value;
use ahash::AHashMap;
use parking_lot::Mutex;

/// Plain key/value store; eviction and locking come from decorators.
pub struct PerpetualCache {
    id: String,
    entries: Mutex<AHashMap<CacheKey, Value>>,
}

impl PerpetualCache {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: Mutex::new(AHashMap::new()),
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains_key(key)
    }
}

impl Cache for PerpetualCache {
    fn id(&self) -> &str {
        &self.id
    }

    fn put(&self, key: CacheKey, value: Value) -> BatisResult<()> {
        self.entries.lock().insert(key, value);
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> BatisResult<Option<Value>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn remove(&self, key: &CacheKey) -> BatisResult<Option<Value>> {
        Ok(self.entries.lock().remove(key))
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }

    fn size(&self) -> usize {
        self.entries.lock().len()
    }
}
