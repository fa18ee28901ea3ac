//! Strategies for applying filter operations against a [`BitStore`].
//!
//! * [`AtomicExecutor`] runs each operation as one server-side program, with
//!   the growth policy evaluated where the bits live. Filters scale.
//! * [`OrchestratedExecutor`] computes bit positions locally and batches plain
//!   bit reads and writes. One fixed-size bit array, no scaling.
//!
//! Both report membership identically from the caller's point of view.
pub mod atomic;
pub mod orchestrated;
pub mod script;

use crate::error::{FilterError, Result};
use crate::store::BitStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use atomic::AtomicExecutor;
pub use orchestrated::OrchestratedExecutor;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    Atomic,
    Orchestrated,
}

impl ExecutorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExecutorKind::Atomic => "atomic",
            ExecutorKind::Orchestrated => "orchestrated",
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExecutorKind {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atomic" => Ok(ExecutorKind::Atomic),
            "orchestrated" => Ok(ExecutorKind::Orchestrated),
            _ => Err(FilterError::UnknownExecutor(s.to_string())),
        }
    }
}

/// One way of running filter operations. Chosen once per filter.
///
/// `contains` returns one flag per input value, in input order.
pub trait Executor {
    fn name(&self) -> &str;

    fn insert(&self, store: &mut dyn BitStore, values: &[String]) -> Result<()>;

    fn contains(
        &self,
        store: &mut dyn BitStore,
        values: &[String],
    ) -> Result<Vec<bool>>;

    /// Clears the values' bits. Executors that cannot clear bits keep this
    /// default, which reports the operation as unsupported.
    fn remove(&self, _store: &mut dyn BitStore, _values: &[String]) -> Result<()> {
        Err(FilterError::unsupported("remove", self.name()))
    }

    /// Deletes every key the filter owns.
    fn clear(&self, store: &mut dyn BitStore) -> Result<()>;

    /// Number of insertions recorded by the backend, when the executor keeps
    /// such a counter.
    fn insert_count(&self, _store: &mut dyn BitStore) -> Result<Option<u64>> {
        Ok(None)
    }
}
