//! Result cache and its decorator stack
//!
//! A backing [`Cache`] stores values; decorators wrap another `Arc<dyn Cache>`
//! and add one behavior each while forwarding `id`, `size` and `clear`:
//!
//! ```text
//! BlockingCache (single flight per key)
//!   └─ LoggingCache (hit ratio)
//!        └─ LruCache (bounded, access ordered)
//!             └─ PerpetualCache (hash map)
//! ```
//!
//! 캐시 미스 시 BlockingCache가 잡은 키 락은 반드시 `put` 또는 `release`로
//! 풀어야 한다. 그렇지 않으면 같은 키에 대한 이후 접근이 영구히 블록된다.

pub mod builder;
pub mod decorators;
pub mod key;
pub mod perpetual;

pub use builder::CacheBuilder;
pub use decorators::{BlockingCache, LoggingCache, LruCache};
pub use key::CacheKey;
pub use perpetual::PerpetualCache;

use crate::error::BatisResult;
use crate::value::Value;

/// Minimal key/value cache contract shared by backing caches and decorators.
pub trait Cache: Send + Sync {
    /// Stable identifier, usually the statement namespace.
    fn id(&self) -> &str;

    fn put(&self, key: CacheKey, value: Value) -> BatisResult<()>;

    fn get(&self, key: &CacheKey) -> BatisResult<Option<Value>>;

    /// Removes an entry. Under a [`BlockingCache`] this releases the key lock
    /// instead and never touches the stored value.
    fn remove(&self, key: &CacheKey) -> BatisResult<Option<Value>>;

    /// Releases any per-key lock taken by a `get` miss without writing a
    /// value. A no-op for caches that do not lock.
    fn release(&self, _key: &CacheKey) -> BatisResult<()> {
        Ok(())
    }

    fn clear(&self);

    /// Number of entries held by the backing cache.
    fn size(&self) -> usize;
}
