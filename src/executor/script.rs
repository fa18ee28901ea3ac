//! Server-side programs used by the atomic executor.
//!
//! Each program exists as Lua source, which Redis evaluates, and as a native
//! evaluation, which [`InMemoryStore`](crate::store::InMemoryStore) runs in
//! place of a Lua interpreter. Both renditions must set and read exactly the
//! same bits.
//!
//! KEYS[1] is the filter name. ARGV is `capacity, rate, value` plus the bit
//! value (`1` or `0`) for the insert program.
use crate::error::{FilterError, Result};
use crate::growth::{
    Generation, counter_key, generation_for, generation_key, generations,
};
use crate::hash::sha1_words;
use crate::store::{BitStore, Reply};
use sha1::{Digest, Sha1};
use tracing::debug;

pub const INSERT_SOURCE: &str = r#"
local entries = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local ln2 = math.log(2)
local count = redis.call('INCR', KEYS[1] .. ':count')
local index = math.ceil(count / entries)
local key = KEYS[1] .. ':' .. index
local bits = math.floor(-(entries * (math.log(rate) - index * ln2)) / (ln2 * ln2) + 0.5)
if bits < 1 then bits = 1 end
local k = math.floor(ln2 * math.floor(bits / entries) + 0.5)
if k < 1 then k = 1 end
local hash = redis.sha1hex(ARGV[3])
local h = {}
h[0] = tonumber(string.sub(hash, 1, 8), 16)
h[1] = tonumber(string.sub(hash, 9, 16), 16)
h[2] = tonumber(string.sub(hash, 17, 24), 16)
h[3] = tonumber(string.sub(hash, 25, 32), 16)
for i = 1, k do
  redis.call('SETBIT', key, (h[i % 2] + i * h[2 + ((i + (i % 2)) % 4) / 2]) % bits, ARGV[4])
end
return index
"#;

pub const CHECK_SOURCE: &str = r#"
local entries = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local ln2 = math.log(2)
local count = redis.call('GET', KEYS[1] .. ':count')
if not count then
  return 0
end
local index = math.ceil(tonumber(count) / entries)
local hash = redis.sha1hex(ARGV[3])
local h = {}
h[0] = tonumber(string.sub(hash, 1, 8), 16)
h[1] = tonumber(string.sub(hash, 9, 16), 16)
h[2] = tonumber(string.sub(hash, 17, 24), 16)
h[3] = tonumber(string.sub(hash, 25, 32), 16)
for n = 1, index do
  local key = KEYS[1] .. ':' .. n
  local bits = math.floor(-(entries * (math.log(rate) - n * ln2)) / (ln2 * ln2) + 0.5)
  if bits < 1 then bits = 1 end
  local k = math.floor(ln2 * math.floor(bits / entries) + 0.5)
  if k < 1 then k = 1 end
  local found = true
  for i = 1, k do
    if redis.call('GETBIT', key, (h[i % 2] + i * h[2 + ((i + (i % 2)) % 4) / 2]) % bits) == 0 then
      found = false
      break
    end
  end
  if found then
    return 1
  end
end
return 0
"#;

/// Lowercase hex SHA-1 of a program's source, as reported by `SCRIPT LOAD`.
pub fn script_digest(source: &str) -> String {
    hex::encode(Sha1::digest(source.as_bytes()))
}

/// Primitive operations a program may perform while it runs.
pub trait ScriptHost {
    fn incr(&mut self, key: &str) -> Result<i64>;
    fn get_int(&mut self, key: &str) -> Result<Option<i64>>;
    fn get_bit(&mut self, key: &str, offset: u64) -> Result<bool>;
    fn set_bit(&mut self, key: &str, offset: u64, value: bool) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    /// Bumps the counter and writes the value's bits into the current generation.
    Insert,
    /// Reports 1 if any generation holds all of the value's bits.
    Check,
}

impl Program {
    pub fn source(&self) -> &'static str {
        match self {
            Program::Insert => INSERT_SOURCE,
            Program::Check => CHECK_SOURCE,
        }
    }

    pub fn digest(&self) -> String {
        script_digest(self.source())
    }

    pub fn from_source(source: &str) -> Option<Self> {
        [Program::Insert, Program::Check]
            .into_iter()
            .find(|program| program.source() == source)
    }

    pub fn evaluate<H: ScriptHost + ?Sized>(
        &self,
        host: &mut H,
        keys: &[String],
        args: &[String],
    ) -> Result<Reply> {
        let key_name = keys.first().ok_or_else(|| {
            FilterError::ScriptError("missing filter key".to_string())
        })?;
        let capacity: usize = parse_arg(args, 0, "capacity")?;
        let rate: f64 = parse_arg(args, 1, "rate")?;
        if capacity == 0 {
            return Err(FilterError::ScriptError(
                "capacity must be > 0".to_string(),
            ));
        }
        let value = args.get(2).ok_or_else(|| {
            FilterError::ScriptError("missing value argument".to_string())
        })?;

        match self {
            Program::Insert => {
                let bit: i64 = parse_arg(args, 3, "bit value")?;
                apply_insert(host, key_name, capacity, rate, value, bit != 0)
            }
            Program::Check => check(host, key_name, capacity, rate, value),
        }
    }
}

fn parse_arg<T: std::str::FromStr>(
    args: &[String],
    position: usize,
    name: &str,
) -> Result<T> {
    args.get(position)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| {
            FilterError::ScriptError(format!("invalid or missing {name} argument"))
        })
}

fn apply_insert<H: ScriptHost + ?Sized>(
    host: &mut H,
    key_name: &str,
    capacity: usize,
    rate: f64,
    value: &str,
    bit: bool,
) -> Result<Reply> {
    let counter = host.incr(&counter_key(key_name))?;
    let index = generation_for(counter.max(0) as u64, capacity);
    let generation = Generation::new(index, capacity, rate);
    let key = generation_key(key_name, index);
    let words = sha1_words(value);

    for position in generation.positions(&words) {
        host.set_bit(&key, position, bit)?;
    }
    Ok(Reply::Int(index as i64))
}

fn check<H: ScriptHost + ?Sized>(
    host: &mut H,
    key_name: &str,
    capacity: usize,
    rate: f64,
    value: &str,
) -> Result<Reply> {
    let Some(counter) = host.get_int(&counter_key(key_name))? else {
        return Ok(Reply::Int(0));
    };
    let highest = generation_for(counter.max(0) as u64, capacity);
    let words = sha1_words(value);

    for generation in generations(highest, capacity, rate) {
        let key = generation_key(key_name, generation.index);
        let mut found = true;
        for position in generation.positions(&words) {
            if !host.get_bit(&key, position)? {
                found = false;
                break;
            }
        }
        if found {
            return Ok(Reply::Int(1));
        }
    }
    Ok(Reply::Int(0))
}

/// Digests of the two programs, registered once per executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDigests {
    pub insert: String,
    pub check: String,
}

impl ScriptDigests {
    /// Loads both programs unless the backend already knows them.
    ///
    /// Loading is idempotent: the same source always yields the same digest,
    /// so racing registrations from several clients are harmless.
    pub fn register(store: &mut dyn BitStore) -> Result<Self> {
        let digests = Self {
            insert: Program::Insert.digest(),
            check: Program::Check.digest(),
        };

        let loaded =
            store.script_exists(&[digests.insert.clone(), digests.check.clone()])?;
        if loaded.len() == 2 && loaded.iter().all(|&l| l) {
            debug!(insert = %digests.insert, check = %digests.check, "scripts already loaded");
            return Ok(digests);
        }

        let insert = store.script_load(INSERT_SOURCE)?;
        let check = store.script_load(CHECK_SOURCE)?;
        debug!(%insert, %check, "scripts loaded");
        Ok(Self { insert, check })
    }
}
