use rand::{Rng, SeedableRng, rngs::StdRng};
use redis_bloom_rs::{
    BitStore, BloomFilter, Command, ExecutorKind, FilterConfig,
    FilterConfigBuilder, FilterError, InMemoryStore, Reply, Result,
};
use std::collections::HashSet;

/// Both built-in executors, for tests that must hold for each of them
#[allow(dead_code)]
pub const EXECUTORS: [ExecutorKind; 2] =
    [ExecutorKind::Atomic, ExecutorKind::Orchestrated];

pub fn test_config(
    capacity: usize,
    fpr: f64,
    key_name: &str,
    executor: ExecutorKind,
) -> FilterConfig {
    FilterConfigBuilder::default()
        .capacity(capacity)
        .false_positive_rate(fpr)
        .key_name(key_name)
        .executor(executor)
        .build()
        .expect("Failed to build test config")
}

/// Filter over a fresh in-memory store
#[allow(dead_code)]
pub fn create_test_filter(
    capacity: usize,
    fpr: f64,
    executor: ExecutorKind,
) -> BloomFilter<InMemoryStore> {
    BloomFilter::new(
        test_config(capacity, fpr, "__test_bf", executor),
        InMemoryStore::new(),
    )
    .expect("Failed to create test filter")
}

/// Randomized trial: look up a random value, compare against what was really
/// inserted, then insert it. Returns mismatches / trials.
#[allow(dead_code)]
pub fn measure_error_rate<S: BitStore>(
    filter: &mut BloomFilter<S>,
    trials: usize,
    seed: u64,
) -> f64 {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut visited = HashSet::new();
    let mut errors = 0;

    for _ in 0..trials {
        let value = rng.random_range(0..trials);
        let present = filter.contains(&value).expect("Contains should succeed");
        if present != visited.contains(&value) {
            errors += 1;
        }
        visited.insert(value);
        filter.insert(&value).expect("Insert should succeed");
    }

    errors as f64 / trials as f64
}

/// Delegating store that records the size of every pipelined batch
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingStore {
    pub inner: InMemoryStore,
    pub batches: Vec<usize>,
    /// Fail every pipelined batch, like a dropped connection
    pub fail: bool,
}

impl BitStore for RecordingStore {
    fn incr(&mut self, key: &str) -> Result<i64> {
        self.inner.incr(key)
    }

    fn get_int(&mut self, key: &str) -> Result<Option<i64>> {
        self.inner.get_int(key)
    }

    fn get_bit(&mut self, key: &str, offset: u64) -> Result<bool> {
        self.inner.get_bit(key, offset)
    }

    fn set_bit(&mut self, key: &str, offset: u64, value: bool) -> Result<bool> {
        self.inner.set_bit(key, offset, value)
    }

    fn keys(&mut self, pattern: &str) -> Result<Vec<String>> {
        self.inner.keys(pattern)
    }

    fn delete(&mut self, keys: &[String]) -> Result<usize> {
        self.inner.delete(keys)
    }

    fn pipeline(&mut self, commands: &[Command]) -> Result<Vec<Reply>> {
        self.batches.push(commands.len());
        if self.fail {
            return Err(FilterError::StorageError(
                "connection reset by peer".to_string(),
            ));
        }
        self.inner.pipeline(commands)
    }

    fn supports_scripting(&mut self) -> Result<bool> {
        self.inner.supports_scripting()
    }

    fn script_exists(&mut self, digests: &[String]) -> Result<Vec<bool>> {
        self.inner.script_exists(digests)
    }

    fn script_load(&mut self, source: &str) -> Result<String> {
        self.inner.script_load(source)
    }
}
