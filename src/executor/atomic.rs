use super::Executor;
use super::script::ScriptDigests;
use crate::error::{FilterError, Result};
use crate::filter::FilterConfig;
use crate::growth::counter_key;
use crate::hash::HashEngine;
use crate::store::{BitStore, Command};
use tracing::{debug, info};

/// Server-evaluated, scaling executor.
///
/// Each insert bumps `{key}:count`, picks the generation from the counter and
/// writes `{key}:{generation}` inside a single program run, so concurrent
/// clients only ever interleave whole operations.
pub struct AtomicExecutor {
    key_name: String,
    capacity: usize,
    false_positive_rate: f64,
    digests: ScriptDigests,
}

impl AtomicExecutor {
    pub fn new(config: &FilterConfig, store: &mut dyn BitStore) -> Result<Self> {
        if config.hash_engine != HashEngine::Sha1 {
            return Err(FilterError::InvalidConfig(format!(
                "the atomic executor hashes with sha1 on the server, got '{}'",
                config.hash_engine
            )));
        }
        let digests = ScriptDigests::register(store)?;

        Ok(Self {
            key_name: config.key_name.clone(),
            capacity: config.capacity,
            false_positive_rate: config.false_positive_rate,
            digests,
        })
    }

    pub fn digests(&self) -> &ScriptDigests {
        &self.digests
    }

    fn sizing_args(&self, value: &str) -> Vec<String> {
        vec![
            self.capacity.to_string(),
            self.false_positive_rate.to_string(),
            value.to_string(),
        ]
    }

    fn set(&self, store: &mut dyn BitStore, values: &[String], bit: bool) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let keys = vec![self.key_name.clone()];
        let commands: Vec<Command> = values
            .iter()
            .map(|value| {
                let mut args = self.sizing_args(value);
                args.push(if bit { "1" } else { "0" }.to_string());
                Command::EvalSha {
                    digest: self.digests.insert.clone(),
                    keys: keys.clone(),
                    args,
                }
            })
            .collect();

        let replies = store.pipeline(&commands)?;
        debug!(
            key = %self.key_name,
            values = values.len(),
            generation = ?replies.last().and_then(|r| r.as_int()),
            bit,
            "applied insert program"
        );
        Ok(())
    }
}

impl Executor for AtomicExecutor {
    fn name(&self) -> &str {
        "atomic"
    }

    fn insert(&self, store: &mut dyn BitStore, values: &[String]) -> Result<()> {
        self.set(store, values, true)
    }

    /// Runs the insert program with bit value 0. The counter still advances
    /// and only the generation it maps to is cleared.
    fn remove(&self, store: &mut dyn BitStore, values: &[String]) -> Result<()> {
        self.set(store, values, false)
    }

    fn contains(
        &self,
        store: &mut dyn BitStore,
        values: &[String],
    ) -> Result<Vec<bool>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let keys = vec![self.key_name.clone()];
        let commands: Vec<Command> = values
            .iter()
            .map(|value| Command::EvalSha {
                digest: self.digests.check.clone(),
                keys: keys.clone(),
                args: self.sizing_args(value),
            })
            .collect();

        let replies = store.pipeline(&commands)?;
        Ok(replies.iter().map(|reply| reply.is_one()).collect())
    }

    fn clear(&self, store: &mut dyn BitStore) -> Result<()> {
        let removed = store.delete_matching(&format!("{}:*", self.key_name))?;
        info!(key = %self.key_name, removed, "cleared scaling filter");
        Ok(())
    }

    fn insert_count(&self, store: &mut dyn BitStore) -> Result<Option<u64>> {
        let count = store.get_int(&counter_key(&self.key_name))?;
        Ok(Some(count.map_or(0, |c| c.max(0) as u64)))
    }
}
