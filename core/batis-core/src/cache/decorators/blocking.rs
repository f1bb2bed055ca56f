//! Single-flight per key
//!
//! A `get` takes a per-key lock. A hit releases it right away; a miss keeps
//! it, and the caller must then `put` (or `release`) the key. Other threads
//! asking for the same key wait until then and see the populated value, so
//! the database is queried once per miss.
//!
//! Locks are latches kept in a concurrent map: the holder removes its latch
//! and opens it, and every waiter retries the insert.

use crate::cache::{Cache, CacheKey};
use crate::error::{BatisError, BatisResult};
use crate::value::Value;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Latch {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    fn count_down(&self) {
        *self.open.lock() = true;
        self.cond.notify_all();
    }

    /// Returns false when `deadline` passed before the latch opened.
    fn wait(&self, deadline: Option<Instant>) -> bool {
        let mut open = self.open.lock();
        while !*open {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut open, deadline).timed_out() {
                        return *open;
                    }
                }
                None => self.cond.wait(&mut open),
            }
        }
        true
    }
}

pub struct BlockingCache {
    delegate: Arc<dyn Cache>,
    timeout: Option<Duration>,
    locks: DashMap<CacheKey, Arc<Latch>>,
}

impl BlockingCache {
    /// Waits for a key lock without a bound.
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self {
            delegate,
            timeout: None,
            locks: DashMap::new(),
        }
    }

    /// Bounds how long a `get` waits for another thread's lock on the same key.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Number of keys currently locked by a pending miss.
    pub fn locked_keys(&self) -> usize {
        self.locks.len()
    }

    fn acquire_lock(&self, key: &CacheKey) -> BatisResult<()> {
        // a timeout past the clock's range waits without a bound
        let deadline = self.timeout.and_then(|t| Instant::now().checked_add(t));
        loop {
            let latch = match self.locks.entry(key.clone()) {
                Entry::Vacant(vacant) => {
                    vacant.insert(Arc::new(Latch::default()));
                    return Ok(());
                }
                Entry::Occupied(occupied) => occupied.get().clone(),
            };
            // shard guard is dropped here; wait outside the map

            if !latch.wait(deadline) {
                let timeout_ms = self.timeout.map(|t| t.as_millis() as u64).unwrap_or(0);
                tracing::debug!(target: "cache", id = self.id(), key = %key, timeout_ms, "lock wait timed out");
                return Err(BatisError::LockTimeout {
                    key: key.to_string(),
                    cache_id: self.id().to_string(),
                    timeout_ms,
                });
            }
        }
    }

    fn release_lock(&self, key: &CacheKey) -> BatisResult<()> {
        match self.locks.remove(key) {
            Some((_, latch)) => {
                latch.count_down();
                Ok(())
            }
            None => Err(BatisError::IllegalState(format!(
                "Detected an attempt at releasing unacquired lock. This should never happen. (key {key})"
            ))),
        }
    }
}

impl Cache for BlockingCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: Value) -> BatisResult<()> {
        let stored = self.delegate.put(key.clone(), value);
        let released = self.release_lock(&key);
        stored.and(released)
    }

    fn get(&self, key: &CacheKey) -> BatisResult<Option<Value>> {
        self.acquire_lock(key)?;
        match self.delegate.get(key) {
            Ok(Some(value)) => {
                self.release_lock(key)?;
                Ok(Some(value))
            }
            // lock stays held until the caller populates the key
            Ok(None) => Ok(None),
            Err(e) => {
                let _ = self.release_lock(key);
                Err(e)
            }
        }
    }

    /// Only releases the lock; the stored value is left in place.
    fn remove(&self, key: &CacheKey) -> BatisResult<Option<Value>> {
        self.release_lock(key)?;
        Ok(None)
    }

    fn release(&self, key: &CacheKey) -> BatisResult<()> {
        self.release_lock(key)
    }

    fn clear(&self) {
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PerpetualCache;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn key(name: &str) -> CacheKey {
        CacheKey::from_components([name])
    }

    fn blocking() -> BlockingCache {
        BlockingCache::new(Arc::new(PerpetualCache::new("blocking")))
    }

    #[test]
    fn hit_releases_lock() {
        let cache = blocking();
        let k = key("a");
        assert_eq!(cache.get(&k).unwrap(), None);
        cache.put(k.clone(), Value::Int(1)).unwrap();

        assert_eq!(cache.get(&k).unwrap(), Some(Value::Int(1)));
        assert_eq!(cache.locked_keys(), 0);
    }

    #[test]
    fn miss_holds_lock_until_put() {
        let cache = blocking();
        let k = key("a");
        assert_eq!(cache.get(&k).unwrap(), None);
        assert_eq!(cache.locked_keys(), 1);
        cache.put(k, Value::Int(1)).unwrap();
        assert_eq!(cache.locked_keys(), 0);
    }

    #[test]
    fn huge_timeout_waits_like_no_timeout() {
        let cache = Arc::new(blocking().with_timeout(Duration::MAX));
        let k = key("a");
        assert_eq!(cache.get(&k).unwrap(), None);

        let waiter = {
            let cache = cache.clone();
            let k = k.clone();
            thread::spawn(move || cache.get(&k))
        };
        thread::sleep(Duration::from_millis(20));
        cache.put(k.clone(), Value::Int(7)).unwrap();

        assert_eq!(waiter.join().unwrap().unwrap(), Some(Value::Int(7)));
        assert_eq!(cache.get(&k).unwrap(), Some(Value::Int(7)));
        assert_eq!(cache.locked_keys(), 0);
    }

    #[test]
    fn releasing_unacquired_lock_is_illegal_state() {
        let cache = blocking();
        let k = key("a");
        assert!(matches!(cache.release(&k), Err(BatisError::IllegalState(_))));

        assert_eq!(cache.get(&k).unwrap(), None);
        cache.release(&k).unwrap();
        assert!(matches!(cache.release(&k), Err(BatisError::IllegalState(_))));
    }

    #[test]
    fn remove_releases_without_deleting() {
        let cache = blocking();
        let k = key("a");
        cache.get(&k).unwrap();
        cache.put(k.clone(), Value::Int(1)).unwrap();

        cache.get(&key("b")).unwrap();
        assert_eq!(cache.remove(&key("b")).unwrap(), None);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.locked_keys(), 0);
    }

    #[test]
    fn put_without_lock_still_stores_but_reports() {
        let cache = blocking();
        let result = cache.put(key("a"), Value::Int(1));
        assert!(matches!(result, Err(BatisError::IllegalState(_))));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn wait_times_out() {
        let cache = blocking().with_timeout(Duration::from_millis(30));
        let k = key("a");
        assert_eq!(cache.get(&k).unwrap(), None);

        let started = Instant::now();
        let err = cache.get(&k).unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(30));
        match err {
            BatisError::LockTimeout { cache_id, timeout_ms, .. } => {
                assert_eq!(cache_id, "blocking");
                assert_eq!(timeout_ms, 30);
            }
            other => panic!("unexpected error: {other}"),
        }
        // original holder can still release
        cache.release(&k).unwrap();
    }

    #[test]
    fn concurrent_miss_runs_loader_once() {
        let cache = Arc::new(blocking());
        let misses = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));
        let k = key("hot");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let misses = misses.clone();
                let barrier = barrier.clone();
                let k = k.clone();
                thread::spawn(move || {
                    barrier.wait();
                    match cache.get(&k).unwrap() {
                        Some(value) => value,
                        None => {
                            misses.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            let value = Value::from("loaded");
                            cache.put(k, value.clone()).unwrap();
                            value
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Value::from("loaded"));
        }
        assert_eq!(misses.load(Ordering::SeqCst), 1);
        assert_eq!(cache.locked_keys(), 0);
    }

    #[test]
    fn release_lets_next_waiter_load() {
        let cache = Arc::new(blocking());
        let k = key("a");
        assert_eq!(cache.get(&k).unwrap(), None);

        let waiter = {
            let cache = cache.clone();
            let k = k.clone();
            thread::spawn(move || cache.get(&k).unwrap())
        };
        thread::sleep(Duration::from_millis(20));
        cache.release(&k).unwrap();

        // waiter observes a miss and now owns the lock
        assert_eq!(waiter.join().unwrap(), None);
        assert_eq!(cache.locked_keys(), 1);
        cache.release(&k).unwrap();
    }
}
