//! Second-level cache in front of another executor

use super::{Executor, MappedStatement, RowBounds};
use crate::cache::{Cache, CacheKey};
use crate::error::BatisResult;
use crate::scripting::BoundSql;
use crate::value::{Row, Value, rows_to_value, value_to_rows};
use std::sync::Arc;

/// A cache miss the caller is responsible for populating.
///
/// Under a blocking cache the miss holds the key lock; dropping the entry
/// without [`PendingEntry::fill`] releases it, so every exit path (errors
/// and panics included) frees the key.
struct PendingEntry<'a> {
    cache: &'a dyn Cache,
    key: Option<CacheKey>,
}

impl<'a> PendingEntry<'a> {
    fn new(cache: &'a dyn Cache, key: CacheKey) -> Self {
        Self {
            cache,
            key: Some(key),
        }
    }

    fn fill(mut self, value: Value) -> BatisResult<()> {
        match self.key.take() {
            Some(key) => self.cache.put(key, value),
            None => Ok(()),
        }
    }
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            if let Err(e) = self.cache.release(&key) {
                tracing::warn!(target: "cache", id = self.cache.id(), error = %e, "failed to release cache key");
            }
        }
    }
}

pub struct CachingExecutor {
    delegate: Arc<dyn Executor>,
}

impl CachingExecutor {
    pub fn new(delegate: Arc<dyn Executor>) -> Self {
        Self { delegate }
    }

    fn flush_cache_if_required(ms: &MappedStatement) {
        if let Some(cache) = ms.cache() {
            if ms.is_flush_cache_required() {
                tracing::debug!(target: "cache", id = cache.id(), statement = ms.id(), "flushing cache");
                cache.clear();
            }
        }
    }
}

impl Executor for CachingExecutor {
    fn query_bound(
        &self,
        ms: &MappedStatement,
        bound: &BoundSql,
        bounds: RowBounds,
    ) -> BatisResult<Vec<Row>> {
        Self::flush_cache_if_required(ms);
        let cache = match ms.cache() {
            Some(cache) if ms.is_use_cache() => cache,
            _ => return self.delegate.query_bound(ms, bound, bounds),
        };

        let key = self.delegate.create_cache_key(ms, bound, bounds);
        if let Some(cached) = cache.get(&key)? {
            tracing::trace!(target: "cache", id = cache.id(), statement = ms.id(), "cache hit");
            return Ok(value_to_rows(&cached));
        }

        let pending = PendingEntry::new(cache.as_ref(), key);
        let rows = self.delegate.query_bound(ms, bound, bounds)?;
        pending.fill(rows_to_value(&rows))?;
        Ok(rows)
    }

    /// Runs the write, then flushes the statement cache whether or not the
    /// write succeeded.
    fn update(&self, ms: &MappedStatement, parameter: &Value) -> BatisResult<u64> {
        let result = self.delegate.update(ms, parameter);
        Self::flush_cache_if_required(ms);
        result
    }

    fn create_cache_key(
        &self,
        ms: &MappedStatement,
        bound: &BoundSql,
        bounds: RowBounds,
    ) -> CacheKey {
        self.delegate.create_cache_key(ms, bound, bounds)
    }
}
