use super::Executor;
use crate::error::Result;
use crate::filter::{FilterConfig, FilterParams};
use crate::hash::HashEngine;
use crate::store::{BitStore, Command};
use tracing::{debug, info};

/// Client-side executor over one fixed-size bit array.
///
/// Bit positions are computed locally and shipped as pipelined `SETBIT` /
/// `GETBIT` batches. Nothing here is atomic: concurrent writers interleave at
/// single-bit granularity.
pub struct OrchestratedExecutor {
    key_name: String,
    num_bits: u64,
    num_hashes: usize,
    engine: HashEngine,
}

impl OrchestratedExecutor {
    pub fn new(config: &FilterConfig, params: &FilterParams) -> Self {
        Self {
            key_name: config.key_name.clone(),
            num_bits: params.num_bits,
            num_hashes: params.num_hashes,
            engine: config.hash_engine,
        }
    }

    pub fn indices(&self, value: &str) -> Vec<u64> {
        self.engine
            .bit_indices(value, self.num_hashes, self.num_bits)
    }

    fn get_bit(&self, offset: u64) -> Command {
        Command::GetBit {
            key: self.key_name.clone(),
            offset,
        }
    }

    fn set(&self, store: &mut dyn BitStore, values: &[String], bit: bool) -> Result<()> {
        let commands: Vec<Command> = values
            .iter()
            .flat_map(|value| self.indices(value))
            .map(|offset| Command::SetBit {
                key: self.key_name.clone(),
                offset,
                value: bit,
            })
            .collect();
        if commands.is_empty() {
            return Ok(());
        }

        store.pipeline(&commands)?;
        debug!(key = %self.key_name, bits = commands.len(), bit, "wrote bits");
        Ok(())
    }
}

impl Executor for OrchestratedExecutor {
    fn name(&self) -> &str {
        "orchestrated"
    }

    fn insert(&self, store: &mut dyn BitStore, values: &[String]) -> Result<()> {
        self.set(store, values, true)
    }

    fn remove(&self, store: &mut dyn BitStore, values: &[String]) -> Result<()> {
        self.set(store, values, false)
    }

    /// Two pipelined rounds: the first bit of every value, then the remaining
    /// bits of only those values whose first bit was set.
    fn contains(
        &self,
        store: &mut dyn BitStore,
        values: &[String],
    ) -> Result<Vec<bool>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let indices: Vec<Vec<u64>> =
            values.iter().map(|value| self.indices(value)).collect();

        let first_round: Vec<Command> = indices
            .iter()
            .map(|idx| self.get_bit(idx.first().copied().unwrap_or(0)))
            .collect();
        let mut found: Vec<bool> = store
            .pipeline(&first_round)?
            .iter()
            .map(|reply| reply.is_one())
            .collect();

        let mut second_round = Vec::new();
        let mut owners = Vec::new();
        for (owner, idx) in indices.iter().enumerate() {
            if !found[owner] {
                continue;
            }
            for &offset in idx.iter().skip(1) {
                second_round.push(self.get_bit(offset));
                owners.push(owner);
            }
        }

        debug!(
            key = %self.key_name,
            values = values.len(),
            follow_up = second_round.len(),
            "probing bits"
        );
        if !second_round.is_empty() {
            let replies = store.pipeline(&second_round)?;
            for (&owner, reply) in owners.iter().zip(replies.iter()) {
                if !reply.is_one() {
                    found[owner] = false;
                }
            }
        }
        Ok(found)
    }

    fn clear(&self, store: &mut dyn BitStore) -> Result<()> {
        let removed = store.delete(&[self.key_name.clone()])?;
        info!(key = %self.key_name, removed, "cleared filter");
        Ok(())
    }
}
