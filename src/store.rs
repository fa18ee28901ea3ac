//! Backend contract for the shared bit store.
//!
//! The filter never keeps bits locally; every read and write goes through a
//! [`BitStore`]. Two adapters ship with the crate: [`InMemoryStore`] and,
//! behind the `redis` feature, [`RedisStore`].
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;

use crate::error::{FilterError, Result};

pub use memory::InMemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

/// One operation inside a pipelined batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Incr {
        key: String,
    },
    Get {
        key: String,
    },
    GetBit {
        key: String,
        offset: u64,
    },
    SetBit {
        key: String,
        offset: u64,
        value: bool,
    },
    EvalSha {
        digest: String,
        keys: Vec<String>,
        args: Vec<String>,
    },
}

/// Result of one batched operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Nil,
    Int(i64),
}

impl Reply {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Reply::Int(v) => Some(*v),
            Reply::Nil => None,
        }
    }

    /// True only for an integer reply of exactly 1.
    pub fn is_one(&self) -> bool {
        matches!(self, Reply::Int(1))
    }
}

pub trait BitStore {
    /// Increments an integer key and returns the new value.
    fn incr(&mut self, key: &str) -> Result<i64>;
    /// Reads an integer key, `None` when absent.
    fn get_int(&mut self, key: &str) -> Result<Option<i64>>;
    fn get_bit(&mut self, key: &str, offset: u64) -> Result<bool>;
    /// Sets one bit and returns its previous value.
    fn set_bit(&mut self, key: &str, offset: u64, value: bool) -> Result<bool>;
    /// Lists key names matching a glob-style pattern.
    fn keys(&mut self, pattern: &str) -> Result<Vec<String>>;
    /// Deletes the given keys, returning how many existed.
    fn delete(&mut self, keys: &[String]) -> Result<usize>;
    /// Runs a batch of commands in one round trip. Replies keep submission
    /// order; a failing command fails the whole batch.
    fn pipeline(&mut self, commands: &[Command]) -> Result<Vec<Reply>>;
    /// Whether this backend can evaluate server-side programs.
    fn supports_scripting(&mut self) -> Result<bool>;

    fn delete_matching(&mut self, pattern: &str) -> Result<usize> {
        let keys = self.keys(pattern)?;
        if keys.is_empty() {
            return Ok(0);
        }
        self.delete(&keys)
    }

    fn script_exists(&mut self, _digests: &[String]) -> Result<Vec<bool>> {
        Err(FilterError::unsupported("script_exists", "bit store"))
    }

    /// Loads a program and returns its digest.
    fn script_load(&mut self, _source: &str) -> Result<String> {
        Err(FilterError::unsupported("script_load", "bit store"))
    }

    fn eval_sha(
        &mut self,
        digest: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<Reply> {
        let replies = self.pipeline(&[Command::EvalSha {
            digest: digest.to_string(),
            keys: keys.to_vec(),
            args: args.to_vec(),
        }])?;
        replies.into_iter().next().ok_or_else(|| {
            FilterError::StorageError("empty reply to EVALSHA".to_string())
        })
    }
}
