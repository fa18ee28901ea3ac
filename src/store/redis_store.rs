use super::{BitStore, Command, Reply};
use crate::error::{FilterError, Result};
use redis::{Client, Commands, Connection, FromRedisValue, InfoDict, Value};
use tracing::debug;

/// First Redis release with `EVALSHA` and `SCRIPT LOAD`.
const MIN_SCRIPTING_VERSION: (u32, u32, u32) = (2, 6, 0);

pub struct RedisStore {
    conn: Connection,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let conn = client.get_connection()?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// The `redis_version` reported by `INFO server`.
    pub fn server_version(&mut self) -> Result<String> {
        let info: InfoDict =
            redis::cmd("INFO").arg("server").query(&mut self.conn)?;
        info.get::<String>("redis_version").ok_or_else(|| {
            FilterError::StorageError(
                "INFO server did not report redis_version".to_string(),
            )
        })
    }
}

/// Parses `major.minor.patch`, missing parts count as zero.
pub fn parse_version(version: &str) -> Option<(u32, u32, u32)> {
    let mut parts = version.trim().split('.').map(|p| p.parse::<u32>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().unwrap_or(Ok(0)).ok()?;
    let patch = parts.next().unwrap_or(Ok(0)).ok()?;
    Some((major, minor, patch))
}

pub fn scripting_available(version: &str) -> bool {
    parse_version(version).is_some_and(|v| v >= MIN_SCRIPTING_VERSION)
}

fn to_reply(value: &Value) -> Result<Reply> {
    let reply = Option::<i64>::from_redis_value(value)?;
    Ok(reply.map_or(Reply::Nil, Reply::Int))
}

impl BitStore for RedisStore {
    fn incr(&mut self, key: &str) -> Result<i64> {
        Ok(self.conn.incr(key, 1)?)
    }

    fn get_int(&mut self, key: &str) -> Result<Option<i64>> {
        Ok(self.conn.get(key)?)
    }

    fn get_bit(&mut self, key: &str, offset: u64) -> Result<bool> {
        let bit: i64 = redis::cmd("GETBIT")
            .arg(key)
            .arg(offset)
            .query(&mut self.conn)?;
        Ok(bit == 1)
    }

    fn set_bit(&mut self, key: &str, offset: u64, value: bool) -> Result<bool> {
        let previous: i64 = redis::cmd("SETBIT")
            .arg(key)
            .arg(offset)
            .arg(value as u8)
            .query(&mut self.conn)?;
        Ok(previous == 1)
    }

    fn keys(&mut self, pattern: &str) -> Result<Vec<String>> {
        Ok(self.conn.keys(pattern)?)
    }

    fn delete(&mut self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        Ok(self.conn.del(keys)?)
    }

    fn pipeline(&mut self, commands: &[Command]) -> Result<Vec<Reply>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for command in commands {
            match command {
                Command::Incr { key } => {
                    pipe.cmd("INCR").arg(key);
                }
                Command::Get { key } => {
                    pipe.cmd("GET").arg(key);
                }
                Command::GetBit { key, offset } => {
                    pipe.cmd("GETBIT").arg(key).arg(*offset);
                }
                Command::SetBit { key, offset, value } => {
                    pipe.cmd("SETBIT").arg(key).arg(*offset).arg(*value as u8);
                }
                Command::EvalSha { digest, keys, args } => {
                    pipe.cmd("EVALSHA")
                        .arg(digest)
                        .arg(keys.len())
                        .arg(keys)
                        .arg(args);
                }
            }
        }

        debug!(commands = commands.len(), "sending pipeline");
        let values: Vec<Value> = pipe.query(&mut self.conn)?;
        values.iter().map(to_reply).collect()
    }

    fn supports_scripting(&mut self) -> Result<bool> {
        let version = self.server_version()?;
        debug!(%version, "probed redis version");
        Ok(scripting_available(&version))
    }

    fn script_exists(&mut self, digests: &[String]) -> Result<Vec<bool>> {
        Ok(redis::cmd("SCRIPT")
            .arg("EXISTS")
            .arg(digests)
            .query(&mut self.conn)?)
    }

    fn script_load(&mut self, source: &str) -> Result<String> {
        Ok(redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(source)
            .query(&mut self.conn)?)
    }
}
