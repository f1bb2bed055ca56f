//! Decorators layered over a backing cache

pub mod blocking;
pub mod logging;
pub mod lru;

pub use blocking::BlockingCache;
pub use logging::LoggingCache;
pub use lru::{DEFAULT_LRU_SIZE, LruCache};
