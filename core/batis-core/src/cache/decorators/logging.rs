//! Hit-ratio tracking decorator

use crate::cache::{Cache, CacheKey};
use crate::error::BatisResult;
use crate::value::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct LoggingCache {
    delegate: Arc<dyn Cache>,
    requests: AtomicU64,
    hits: AtomicU64,
}

impl LoggingCache {
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self {
            delegate,
            requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Fraction of `get` calls that found a value; 0.0 before any request.
    pub fn hit_ratio(&self) -> f64 {
        let requests = self.requests();
        if requests == 0 {
            0.0
        } else {
            self.hits() as f64 / requests as f64
        }
    }
}

impl Cache for LoggingCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: Value) -> BatisResult<()> {
        self.delegate.put(key, value)
    }

    fn get(&self, key: &CacheKey) -> BatisResult<Option<Value>> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let value = self.delegate.get(key)?;
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!(
            target: "cache",
            id = self.id(),
            hit = value.is_some(),
            hit_ratio = self.hit_ratio(),
            "Cache Hit Ratio [{}]: {}",
            self.id(),
            self.hit_ratio()
        );
        Ok(value)
    }

    fn remove(&self, key: &CacheKey) -> BatisResult<Option<Value>> {
        self.delegate.remove(key)
    }

    fn release(&self, key: &CacheKey) -> BatisResult<()> {
        self.delegate.release(key)
    }

    fn clear(&self) {
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }
}
