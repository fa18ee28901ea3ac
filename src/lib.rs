//! Scalable Bloom filter whose bit array lives in a shared key-value store.
//!
//! The filter keeps no bits locally: every insert and lookup is applied to a
//! [`BitStore`] (Redis, or the in-process [`InMemoryStore`]) under a key
//! name, so any number of clients can share one filter.
//!
//! HowTo:
//!    * Sizing: `m = round(-n * ln(p) / ln(2)^2)` bits and
//!      `k = round(ln(2) * (m / n))` probes, at least one.
//!    * Indexing: one SHA-1 digest per value, split into four 32-bit words
//!      `h0..h3`; probe `i` (1-based) lands on
//!      `(h[i % 2] + i * h[2 + ((i + i % 2) % 4) / 2]) % m`.
//!    * Scaling: an atomic executor keeps a counter per filter. Element
//!      number `c` goes to generation `ceil(c / capacity)`, which is sized for
//!      a false-positive budget of `rate * 0.5^generation`. Lookups probe
//!      generations in ascending order and stop at the first full match.
//!
//! Executors:
//!     * Atomic: insert and lookup run as server-side programs loaded once by
//!       digest (`SCRIPT LOAD` / `EVALSHA`). Scales without bound.
//!     * Orchestrated: positions are computed locally and sent as pipelined
//!       bit reads and writes. Lookups first read one bit per value and only
//!       fetch the remaining bits for values that passed. Fixed size.
//!
//! Known approximations:
//!     * Removing from a scaling filter clears the value's bits only in the
//!       generation the counter currently points at, so dense reinsertion
//!       followed by removal can produce false negatives.
//!     * The orchestrated executor is not atomic; concurrent clients can
//!       interleave individual bit operations.
//!     * With a small base capacity the scaling filter's false-positive rate
//!       on distinct lookups can exceed the configured rate. A generation
//!       holding only a handful of elements drifts above its budget, and a
//!       lookup is tested against every generation. Capacity 5 at 0.01 over
//!       1000 insertions observes roughly 2%.

mod error;
pub mod executor;
mod filter;
pub mod growth;
pub mod hash;
pub mod store;

pub use error::{FilterError, Result};
pub use executor::{AtomicExecutor, Executor, ExecutorKind, OrchestratedExecutor};
pub use filter::{
    BloomFilter, DEFAULT_KEY_NAME, FilterConfig, FilterConfigBuilder,
    FilterConfigBuilderError, FilterParams,
};
pub use hash::{HashEngine, optimal_bits, optimal_hash_count};
#[cfg(feature = "redis")]
pub use store::RedisStore;
pub use store::{BitStore, Command, InMemoryStore, Reply};

/// Crate name and version, e.g. `redis-bloom-rs version 0.1.0`.
pub fn version() -> String {
    format!(
        "{} version {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )
}
