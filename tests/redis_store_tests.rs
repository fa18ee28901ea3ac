//! Live-server tests. Run with `cargo test -- --ignored` against a Redis
//! reachable at `REDIS_URI` (default `redis://127.0.0.1/`).
#![cfg(feature = "redis")]

mod common;

use common::test_utils::{EXECUTORS, measure_error_rate, test_config};
use dotenvy::dotenv;
use redis_bloom_rs::{BitStore, BloomFilter, ExecutorKind, RedisStore};
use std::env;

fn get_redis_url() -> String {
    dotenv().ok();
    env::var("REDIS_URI").unwrap_or_else(|_| "redis://127.0.0.1/".to_string())
}

fn redis_filter(
    capacity: usize,
    kind: ExecutorKind,
    key_name: &str,
) -> BloomFilter<RedisStore> {
    let store = RedisStore::new(&get_redis_url()).expect("Failed to connect to Redis");
    let mut bf = BloomFilter::new(test_config(capacity, 0.01, key_name, kind), store)
        .expect("Failed to create filter");
    bf.clear().expect("Failed to clear filter");
    bf
}

#[test]
#[ignore]
fn test_redis_supports_scripting() {
    let mut store = RedisStore::new(&get_redis_url()).unwrap();
    assert!(store.supports_scripting().unwrap());
}

#[test]
#[ignore]
fn test_redis_insert_contains_remove() {
    for kind in EXECUTORS {
        let mut bf = redis_filter(1000, kind, &format!("__test_bf_{kind}"));

        assert!(!bf.contains("hij").unwrap());
        bf.insert_all(&["abc", "xyz", "123"]).unwrap();
        bf.insert("hij").unwrap();
        assert!(bf.contains("hij").unwrap());
        assert_eq!(
            bf.contains_all(&["hij", "456", "abc"]).unwrap(),
            vec![&"hij", &"abc"]
        );

        bf.remove("hij").unwrap();
        assert!(!bf.contains("hij").unwrap());

        bf.clear().unwrap();
        assert!(bf.contains_all(&["abc", "xyz", "123"]).unwrap().is_empty());
    }
}

#[test]
#[ignore]
fn test_redis_lua_matches_native_bits() {
    // the same value must land on the same bits whether Redis or the
    // in-memory store evaluated the insert program
    let mut remote = redis_filter(1000, ExecutorKind::Atomic, "__test_bf_lua");
    let mut local = BloomFilter::new(
        test_config(1000, 0.01, "__test_bf_lua", ExecutorKind::Atomic),
        redis_bloom_rs::InMemoryStore::new(),
    )
    .unwrap();

    remote.insert("hij").unwrap();
    local.insert("hij").unwrap();

    let generation = redis_bloom_rs::growth::Generation::new(1, 1000, 0.01);
    let words = redis_bloom_rs::hash::sha1_words("hij");
    for offset in generation.positions(&words) {
        assert!(remote.store_mut().get_bit("__test_bf_lua:1", offset).unwrap());
        assert!(local.store_mut().get_bit("__test_bf_lua:1", offset).unwrap());
    }
    remote.clear().unwrap();
}

#[test]
#[ignore]
fn test_redis_scaling_error_rate() {
    let mut bf = redis_filter(100, ExecutorKind::Atomic, "__test_bf_scaling");
    let rate = measure_error_rate(&mut bf, 10_000, 42);
    assert!(rate < 0.01, "observed error rate {rate}");
    bf.clear().unwrap();
}
