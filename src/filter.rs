use crate::error::{FilterError, Result};
use crate::executor::{AtomicExecutor, Executor, ExecutorKind, OrchestratedExecutor};
use crate::growth::generation_for;
use crate::hash::{HashEngine, optimal_bits, optimal_hash_count};
use crate::store::BitStore;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use tracing::{debug, info};

pub const DEFAULT_KEY_NAME: &str = "bloomfilter";

fn default_key_name() -> String {
    DEFAULT_KEY_NAME.to_string()
}

/// Configuration for a backend-resident Bloom filter
#[derive(Clone, Debug, PartialEq, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct FilterConfig {
    /// Expected number of elements (per generation for scaling filters)
    pub capacity: usize,

    /// Target false positive rate (0.0 to 1.0, exclusive)
    pub false_positive_rate: f64,

    /// Name of the filter in the backend
    #[builder(default = "default_key_name()", setter(into))]
    #[serde(default = "default_key_name")]
    pub key_name: String,

    #[builder(default)]
    #[serde(default)]
    pub hash_engine: HashEngine,

    /// Executor to use, `None` to pick one from the backend's capabilities
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub executor: Option<ExecutorKind>,

    /// Forces the bit-array length, for tests and benchmarks only
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub bits_override: Option<u64>,

    /// Forces the probe count, for tests and benchmarks only
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub hashes_override: Option<usize>,
}

impl From<FilterConfigBuilderError> for FilterError {
    fn from(err: FilterConfigBuilderError) -> Self {
        FilterError::InvalidConfig(err.to_string())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| FilterError::EnvParseError {
        var_name: name.to_string(),
        value: raw.to_string(),
        error: e.to_string(),
    })
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(FilterError::InvalidConfig(
                "Capacity must be > 0".into(),
            ));
        }
        if !(self.false_positive_rate > 0.0 && self.false_positive_rate < 1.0) {
            return Err(FilterError::InvalidConfig(format!(
                "FPR must be between 0 and 1, got {}",
                self.false_positive_rate
            )));
        }
        if self.key_name.is_empty() {
            return Err(FilterError::InvalidConfig(
                "Key name must not be empty".into(),
            ));
        }
        if self.bits_override == Some(0) {
            return Err(FilterError::InvalidConfig(
                "Bit override must be > 0".into(),
            ));
        }
        if self.hashes_override == Some(0) {
            return Err(FilterError::InvalidConfig(
                "Hash override must be > 0".into(),
            ));
        }
        if self.executor == Some(ExecutorKind::Atomic)
            && self.hash_engine != HashEngine::Sha1
        {
            return Err(FilterError::InvalidConfig(format!(
                "The atomic executor only supports sha1, got {}",
                self.hash_engine
            )));
        }
        Ok(())
    }

    /// Reads the configuration from `BLOOM_*` environment variables,
    /// loading a `.env` file first when present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = FilterConfigBuilder::default();
        if let Some(raw) = env_var("BLOOM_CAPACITY") {
            builder = builder.capacity(parse_env("BLOOM_CAPACITY", &raw)?);
        }
        if let Some(raw) = env_var("BLOOM_FALSE_POSITIVE_RATE") {
            builder = builder
                .false_positive_rate(parse_env("BLOOM_FALSE_POSITIVE_RATE", &raw)?);
        }
        if let Some(raw) = env_var("BLOOM_KEY_NAME") {
            builder = builder.key_name(raw);
        }
        if let Some(raw) = env_var("BLOOM_HASH_ENGINE") {
            builder = builder.hash_engine(raw.parse()?);
        }
        if let Some(raw) = env_var("BLOOM_EXECUTOR") {
            builder = builder.executor(raw.parse()?);
        }

        let config = builder.build()?;
        config.validate()?;
        Ok(config)
    }
}

/// Bit-array length and probe count derived from a [`FilterConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterParams {
    pub num_bits: u64,
    pub num_hashes: usize,
}

impl From<&FilterConfig> for FilterParams {
    fn from(config: &FilterConfig) -> Self {
        let num_bits = config.bits_override.unwrap_or_else(|| {
            optimal_bits(config.capacity, config.false_positive_rate).max(1)
        });
        let num_hashes = config
            .hashes_override
            .unwrap_or_else(|| optimal_hash_count(config.capacity, num_bits));

        Self {
            num_bits,
            num_hashes,
        }
    }
}

/// Bloom filter whose bits live in a [`BitStore`].
///
/// Single values go through `insert` / `contains` / `remove`; slices through
/// the `*_all` variants. Values are hashed through their `Display` form, so
/// `42` and `"42"` are the same element.
pub struct BloomFilter<S: BitStore> {
    config: FilterConfig,
    params: FilterParams,
    store: S,
    executor: Box<dyn Executor>,
}

impl<S: BitStore> BloomFilter<S> {
    /// Validates `config` and selects the executor: the configured one, or
    /// the atomic executor when the backend can run scripts and the hash
    /// engine is sha1, else the orchestrated one.
    pub fn new(config: FilterConfig, mut store: S) -> Result<Self> {
        config.validate()?;
        let params = FilterParams::from(&config);

        let kind = match config.executor {
            Some(kind) => kind,
            None => detect_executor(&config, &mut store)?,
        };
        let executor: Box<dyn Executor> = match kind {
            ExecutorKind::Atomic => Box::new(AtomicExecutor::new(&config, &mut store)?),
            ExecutorKind::Orchestrated => {
                Box::new(OrchestratedExecutor::new(&config, &params))
            }
        };

        info!(
            key = %config.key_name,
            executor = executor.name(),
            capacity = config.capacity,
            fpr = config.false_positive_rate,
            bits = params.num_bits,
            hashes = params.num_hashes,
            "bloom filter ready"
        );

        Ok(Self {
            config,
            params,
            store,
            executor,
        })
    }

    /// Uses a caller-supplied executor instead of a built-in one.
    pub fn with_executor(
        config: FilterConfig,
        store: S,
        executor: Box<dyn Executor>,
    ) -> Result<Self> {
        config.validate()?;
        let params = FilterParams::from(&config);
        debug!(key = %config.key_name, executor = executor.name(), "custom executor");

        Ok(Self {
            config,
            params,
            store,
            executor,
        })
    }

    pub fn insert<T: Display + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.executor
            .insert(&mut self.store, &[value.to_string()])
    }

    pub fn insert_all<T: Display>(&mut self, values: &[T]) -> Result<()> {
        self.executor.insert(&mut self.store, &stringify(values))
    }

    pub fn contains<T: Display + ?Sized>(&mut self, value: &T) -> Result<bool> {
        let found = self
            .executor
            .contains(&mut self.store, &[value.to_string()])?;
        Ok(found.first().copied().unwrap_or(false))
    }

    /// Returns the values reported present, in input order. Duplicated inputs
    /// appear once per occurrence.
    pub fn contains_all<'a, T: Display>(
        &mut self,
        values: &'a [T],
    ) -> Result<Vec<&'a T>> {
        let found = self.executor.contains(&mut self.store, &stringify(values))?;
        Ok(values
            .iter()
            .zip(found)
            .filter_map(|(value, present)| present.then_some(value))
            .collect())
    }

    pub fn remove<T: Display + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.executor
            .remove(&mut self.store, &[value.to_string()])
    }

    pub fn remove_all<T: Display>(&mut self, values: &[T]) -> Result<()> {
        self.executor.remove(&mut self.store, &stringify(values))
    }

    pub fn clear(&mut self) -> Result<()> {
        self.executor.clear(&mut self.store)
    }

    /// Insertions recorded by a scaling filter, `None` for fixed-size ones.
    pub fn insert_count(&mut self) -> Result<Option<u64>> {
        self.executor.insert_count(&mut self.store)
    }

    /// Generations in use by a scaling filter.
    pub fn generation_count(&mut self) -> Result<Option<u64>> {
        let capacity = self.config.capacity;
        Ok(self
            .insert_count()?
            .map(|count| generation_for(count, capacity)))
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn params(&self) -> &FilterParams {
        &self.params
    }

    pub fn executor_name(&self) -> &str {
        self.executor.name()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

fn stringify<T: Display>(values: &[T]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn detect_executor<S: BitStore>(
    config: &FilterConfig,
    store: &mut S,
) -> Result<ExecutorKind> {
    if config.hash_engine != HashEngine::Sha1 {
        debug!(engine = %config.hash_engine, "non-sha1 engine, using orchestrated executor");
        return Ok(ExecutorKind::Orchestrated);
    }
    let kind = if store.supports_scripting()? {
        ExecutorKind::Atomic
    } else {
        ExecutorKind::Orchestrated
    };
    debug!(executor = %kind, "detected executor from backend capabilities");
    Ok(kind)
}
