//! Assembles the standard decorator stack for one cache id

use super::{BlockingCache, Cache, LoggingCache, LruCache, PerpetualCache};
use crate::error::{BatisError, BatisResult};
use std::sync::Arc;
use std::time::Duration;

/// Builder for `perpetual → lru → logging → blocking`.
///
/// ```rust
/// use batis_core::cache::{Cache, CacheBuilder};
///
/// let cache = CacheBuilder::new("users")
///     .size(256)
///     .blocking(true)
///     .build()
///     .unwrap();
/// assert_eq!(cache.id(), "users");
/// ```
pub struct CacheBuilder {
    id: String,
    implementation: Option<Arc<dyn Cache>>,
    size: Option<usize>,
    logging: bool,
    blocking: bool,
    blocking_timeout: Option<Duration>,
}

impl CacheBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            implementation: None,
            size: None,
            logging: true,
            blocking: false,
            blocking_timeout: None,
        }
    }

    /// Replaces the default [`PerpetualCache`] backing store.
    pub fn implementation(mut self, cache: Arc<dyn Cache>) -> Self {
        self.implementation = Some(cache);
        self
    }

    /// LRU bound; defaults to 1024.
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn logging(mut self, enabled: bool) -> Self {
        self.logging = enabled;
        self
    }

    pub fn blocking(mut self, enabled: bool) -> Self {
        self.blocking = enabled;
        self
    }

    /// Lock wait bound for the blocking layer; implies `blocking(true)`.
    pub fn blocking_timeout(mut self, timeout: Duration) -> Self {
        self.blocking = true;
        self.blocking_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> BatisResult<Arc<dyn Cache>> {
        let base: Arc<dyn Cache> = match self.implementation {
            Some(cache) => cache,
            None => Arc::new(PerpetualCache::new(self.id.clone())),
        };
        if base.id() != self.id {
            return Err(BatisError::Config(format!(
                "cache implementation id '{}' does not match '{}'",
                base.id(),
                self.id
            )));
        }

        let lru = match self.size {
            Some(size) => LruCache::with_size(base, size)?,
            None => LruCache::new(base),
        };
        let mut cache: Arc<dyn Cache> = Arc::new(lru);

        if self.logging {
            cache = Arc::new(LoggingCache::new(cache));
        }
        if self.blocking {
            let mut blocking = BlockingCache::new(cache);
            blocking.set_timeout(self.blocking_timeout);
            cache = Arc::new(blocking);
        }

        tracing::debug!(
            target: "cache",
            id = %self.id,
            logging = self.logging,
            blocking = self.blocking,
            "cache built"
        );
        Ok(cache)
    }
}
