use super::{BitStore, Command, Reply};
use crate::error::{FilterError, Result};
use crate::executor::script::{Program, ScriptHost, script_digest};
use bitvec::{order::Msb0, vec::BitVec};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared bit store kept in process memory.
///
/// Clones share the same state, so several filters built from clones of one
/// store behave like several clients of one server. Every command, including
/// a whole program evaluation, runs under a single lock.
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

#[derive(Default)]
struct StoreState {
    counters: HashMap<String, i64>,
    bits: HashMap<String, BitVec<u8, Msb0>>,
    scripts: HashMap<String, Program>,
    scripting: bool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_scripting(true)
    }

    /// A store that reports no scripting support, like a pre-2.6 Redis.
    pub fn without_scripting() -> Self {
        Self::with_scripting(false)
    }

    fn with_scripting(scripting: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState {
                scripting,
                ..StoreState::default()
            })),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state.lock().map_err(|e| {
            FilterError::StorageError(format!("Memory store lock error: {e}"))
        })
    }

    /// Number of keys currently held, counters included.
    pub fn key_count(&self) -> Result<usize> {
        let state = self.lock()?;
        Ok(state.counters.len() + state.bits.len())
    }

    /// Number of set bits stored under `key`.
    pub fn count_ones(&self, key: &str) -> Result<usize> {
        Ok(self.lock()?.bits.get(key).map_or(0, |bits| bits.count_ones()))
    }
}

impl ScriptHost for StoreState {
    fn incr(&mut self, key: &str) -> Result<i64> {
        if self.bits.contains_key(key) {
            return Err(FilterError::StorageError(format!(
                "WRONGTYPE key {key} holds a bit array"
            )));
        }
        let counter = self.counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    fn get_int(&mut self, key: &str) -> Result<Option<i64>> {
        Ok(self.counters.get(key).copied())
    }

    fn get_bit(&mut self, key: &str, offset: u64) -> Result<bool> {
        self.ensure_not_counter(key)?;
        Ok(self
            .bits
            .get(key)
            .and_then(|bits| bits.get(offset as usize).map(|bit| *bit))
            .unwrap_or(false))
    }

    fn set_bit(&mut self, key: &str, offset: u64, value: bool) -> Result<bool> {
        self.ensure_not_counter(key)?;
        let offset = offset as usize;
        let bits = self.bits.entry(key.to_string()).or_default();
        if offset >= bits.len() {
            if !value {
                return Ok(false);
            }
            // grow in whole bytes, the way Redis strings do
            bits.resize((offset / 8 + 1) * 8, false);
        }
        Ok(bits.replace(offset, value))
    }
}

impl StoreState {
    fn ensure_not_counter(&self, key: &str) -> Result<()> {
        if self.counters.contains_key(key) {
            return Err(FilterError::StorageError(format!(
                "WRONGTYPE key {key} holds a counter"
            )));
        }
        Ok(())
    }

    fn execute(&mut self, command: &Command) -> Result<Reply> {
        match command {
            Command::Incr { key } => self.incr(key).map(Reply::Int),
            Command::Get { key } => {
                Ok(self.get_int(key)?.map_or(Reply::Nil, Reply::Int))
            }
            Command::GetBit { key, offset } => {
                self.get_bit(key, *offset).map(|bit| Reply::Int(bit as i64))
            }
            Command::SetBit { key, offset, value } => self
                .set_bit(key, *offset, *value)
                .map(|bit| Reply::Int(bit as i64)),
            Command::EvalSha { digest, keys, args } => {
                if !self.scripting {
                    return Err(FilterError::unsupported("evalsha", "memory store"));
                }
                let program = *self.scripts.get(digest).ok_or_else(|| {
                    FilterError::ScriptError(format!(
                        "NOSCRIPT no script for digest {digest}"
                    ))
                })?;
                program.evaluate(self, keys, args)
            }
        }
    }
}

fn matches_pattern(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

impl BitStore for InMemoryStore {
    fn incr(&mut self, key: &str) -> Result<i64> {
        self.lock()?.incr(key)
    }

    fn get_int(&mut self, key: &str) -> Result<Option<i64>> {
        self.lock()?.get_int(key)
    }

    fn get_bit(&mut self, key: &str, offset: u64) -> Result<bool> {
        self.lock()?.get_bit(key, offset)
    }

    fn set_bit(&mut self, key: &str, offset: u64, value: bool) -> Result<bool> {
        self.lock()?.set_bit(key, offset, value)
    }

    fn keys(&mut self, pattern: &str) -> Result<Vec<String>> {
        let state = self.lock()?;
        let mut keys: Vec<String> = state
            .counters
            .keys()
            .chain(state.bits.keys())
            .filter(|key| matches_pattern(pattern, key))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn delete(&mut self, keys: &[String]) -> Result<usize> {
        let mut state = self.lock()?;
        let mut removed = 0;
        for key in keys {
            if state.counters.remove(key).is_some() | state.bits.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn pipeline(&mut self, commands: &[Command]) -> Result<Vec<Reply>> {
        let mut state = self.lock()?;
        let replies: Result<Vec<Reply>> =
            commands.iter().map(|command| state.execute(command)).collect();
        replies
    }

    fn supports_scripting(&mut self) -> Result<bool> {
        Ok(self.lock()?.scripting)
    }

    fn script_exists(&mut self, digests: &[String]) -> Result<Vec<bool>> {
        let state = self.lock()?;
        if !state.scripting {
            return Err(FilterError::unsupported("script_exists", "memory store"));
        }
        Ok(digests
            .iter()
            .map(|digest| state.scripts.contains_key(digest))
            .collect())
    }

    fn script_load(&mut self, source: &str) -> Result<String> {
        let mut state = self.lock()?;
        if !state.scripting {
            return Err(FilterError::unsupported("script_load", "memory store"));
        }
        let program = Program::from_source(source).ok_or_else(|| {
            FilterError::ScriptError(
                "memory store only evaluates the filter's own programs".to_string(),
            )
        })?;
        let digest = script_digest(source);
        state.scripts.insert(digest.clone(), program);
        Ok(digest)
    }
}
