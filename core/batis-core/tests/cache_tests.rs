// 캐시 데코레이터 스택 통합 테스트

use batis_core::cache::{BlockingCache, Cache, CacheBuilder, CacheKey, LruCache, PerpetualCache};
use batis_core::{BatisError, BatisResult, Value};
use proptest::prelude::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn key(n: u8) -> CacheKey {
    CacheKey::from_components([Value::from("users.find"), Value::Int(i64::from(n))])
}

#[test]
fn concurrent_misses_load_once() -> BatisResult<()> {
    let cache = CacheBuilder::new("users")
        .blocking_timeout(Duration::from_secs(5))
        .build()?;
    let loads = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let loads = loads.clone();
            let barrier = barrier.clone();
            thread::spawn(move || -> BatisResult<Value> {
                barrier.wait();
                if let Some(hit) = cache.get(&key(1))? {
                    return Ok(hit);
                }
                loads.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                let loaded = Value::from("kim");
                cache.put(key(1), loaded.clone())?;
                Ok(loaded)
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().expect("reader panicked")?, Value::from("kim"));
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(cache.size(), 1);
    Ok(())
}

#[test]
fn miss_holder_blocks_other_readers_until_release() -> BatisResult<()> {
    let cache = CacheBuilder::new("users")
        .blocking_timeout(Duration::from_millis(40))
        .build()?;

    assert!(cache.get(&key(2))?.is_none());
    let other = {
        let cache = cache.clone();
        thread::spawn(move || cache.get(&key(2)))
    };
    match other.join().expect("reader panicked") {
        Err(BatisError::LockTimeout { cache_id, timeout_ms, .. }) => {
            assert_eq!(cache_id, "users");
            assert_eq!(timeout_ms, 40);
        }
        other => panic!("expected a lock timeout, got {other:?}"),
    }

    cache.release(&key(2))?;
    assert!(cache.get(&key(2))?.is_none());
    cache.remove(&key(2))?;
    Ok(())
}

#[test]
fn blocking_over_lru_keeps_bound() -> BatisResult<()> {
    let backing = Arc::new(PerpetualCache::new("orders"));
    let lru: Arc<dyn Cache> = Arc::new(LruCache::with_size(backing.clone(), 2)?);
    let cache = BlockingCache::new(lru);

    for n in 0..5 {
        assert!(cache.get(&key(n))?.is_none());
        cache.put(key(n), Value::Int(i64::from(n)))?;
    }
    assert_eq!(cache.locked_keys(), 0);
    assert_eq!(backing.size(), 2);
    assert!(backing.contains(&key(3)));
    assert!(backing.contains(&key(4)));
    Ok(())
}

#[derive(Debug, Clone)]
enum Op {
    Put(u8),
    Get(u8),
    Remove(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..12).prop_map(Op::Put),
        3 => (0u8..12).prop_map(Op::Get),
        1 => (0u8..12).prop_map(Op::Remove),
    ]
}

fn touch(order: &mut VecDeque<u8>, n: u8) -> bool {
    match order.iter().position(|k| *k == n) {
        Some(i) => {
            order.remove(i);
            order.push_back(n);
            true
        }
        None => false,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn lru_evicts_least_recently_used(
        capacity in 1usize..6,
        ops in prop::collection::vec(op(), 1..80),
    ) {
        let backing = Arc::new(PerpetualCache::new("lru"));
        let cache = LruCache::with_size(backing.clone(), capacity).unwrap();
        let mut order: VecDeque<u8> = VecDeque::new();

        for op in ops {
            match op {
                Op::Put(n) => {
                    cache.put(key(n), Value::Int(i64::from(n))).unwrap();
                    if !touch(&mut order, n) {
                        order.push_back(n);
                        if order.len() > capacity {
                            order.pop_front();
                        }
                    }
                }
                Op::Get(n) => {
                    let hit = cache.get(&key(n)).unwrap();
                    let expected = touch(&mut order, n);
                    prop_assert_eq!(hit.is_some(), expected);
                }
                Op::Remove(n) => {
                    cache.remove(&key(n)).unwrap();
                    order.retain(|k| *k != n);
                }
            }

            prop_assert_eq!(backing.size(), order.len());
            prop_assert_eq!(cache.tracked(), order.len());
            for n in &order {
                prop_assert!(backing.contains(&key(*n)));
            }
        }
    }
}
