//! Runs the Lua programs in an embedded interpreter, with `redis.call`
//! backed by an in-memory store, and checks them against the native
//! evaluation the in-memory store performs for `EVALSHA`.
use mlua::{Lua, Value};
use redis_bloom_rs::{
    BitStore, FilterError, InMemoryStore,
    executor::script::{CHECK_SOURCE, INSERT_SOURCE, ScriptDigests, script_digest},
    growth::Generation,
};

fn lua_error(e: FilterError) -> mlua::Error {
    mlua::Error::RuntimeError(e.to_string())
}

/// A Lua state whose `redis` table talks to an [`InMemoryStore`].
struct LuaRedis {
    lua: Lua,
    store: InMemoryStore,
}

impl LuaRedis {
    fn new() -> mlua::Result<Self> {
        let lua = Lua::new();
        let store = InMemoryStore::new();

        let backend = store.clone();
        let call = lua.create_function(
            move |lua,
                  (command, key, offset, value): (
                String,
                String,
                Option<f64>,
                Option<String>,
            )| {
                let mut store = backend.clone();
                let bit_offset = || {
                    offset.map(|o| o as u64).ok_or_else(|| {
                        mlua::Error::RuntimeError(format!("{command} needs an offset"))
                    })
                };
                match command.as_str() {
                    "INCR" => Ok(Value::Number(store.incr(&key).map_err(lua_error)? as f64)),
                    // Redis hands a bulk string to Lua, or false for a missing key
                    "GET" => match store.get_int(&key).map_err(lua_error)? {
                        Some(count) => Ok(Value::String(lua.create_string(count.to_string())?)),
                        None => Ok(Value::Boolean(false)),
                    },
                    "GETBIT" => {
                        let bit = store.get_bit(&key, bit_offset()?).map_err(lua_error)?;
                        Ok(Value::Number(if bit { 1.0 } else { 0.0 }))
                    }
                    "SETBIT" => {
                        let set = value.as_deref() == Some("1");
                        let previous =
                            store.set_bit(&key, bit_offset()?, set).map_err(lua_error)?;
                        Ok(Value::Number(if previous { 1.0 } else { 0.0 }))
                    }
                    other => Err(mlua::Error::RuntimeError(format!(
                        "unexpected command {other}"
                    ))),
                }
            },
        )?;
        let sha1hex = lua.create_function(|_, value: String| Ok(script_digest(&value)))?;

        let redis = lua.create_table()?;
        redis.set("call", call)?;
        redis.set("sha1hex", sha1hex)?;
        lua.globals().set("redis", redis)?;

        Ok(Self { lua, store })
    }

    fn run(&self, source: &str, key_name: &str, args: &[String]) -> mlua::Result<i64> {
        let globals = self.lua.globals();
        globals.set("KEYS", vec![key_name.to_string()])?;
        globals.set("ARGV", args.to_vec())?;
        self.lua.load(source).call::<i64>(())
    }
}

/// The in-memory store evaluating the same programs natively.
struct NativeRedis {
    store: InMemoryStore,
    digests: ScriptDigests,
}

impl NativeRedis {
    fn new() -> Self {
        let mut store = InMemoryStore::new();
        let digests = ScriptDigests::register(&mut store).unwrap();
        Self { store, digests }
    }

    fn run(&mut self, digest: &str, key_name: &str, args: &[String]) -> i64 {
        self.store
            .eval_sha(digest, &[key_name.to_string()], args)
            .unwrap()
            .as_int()
            .unwrap()
    }
}

fn program_args(capacity: usize, rate: f64, value: &str, bit: Option<&str>) -> Vec<String> {
    let mut args = vec![capacity.to_string(), rate.to_string(), value.to_string()];
    args.extend(bit.map(str::to_string));
    args
}

fn assert_same_contents(
    lua: &mut InMemoryStore,
    native: &mut InMemoryStore,
    key_name: &str,
    capacity: usize,
    rate: f64,
) {
    let keys = lua.keys("*").unwrap();
    assert_eq!(keys, native.keys("*").unwrap());

    let counter = format!("{key_name}:count");
    for key in keys {
        if key == counter {
            assert_eq!(lua.get_int(&key).unwrap(), native.get_int(&key).unwrap());
            continue;
        }
        let index: u64 = key[key_name.len() + 1..].parse().unwrap();
        let generation = Generation::new(index, capacity, rate);
        assert_eq!(lua.count_ones(&key).unwrap(), native.count_ones(&key).unwrap());
        for offset in 0..generation.num_bits {
            assert_eq!(
                lua.get_bit(&key, offset).unwrap(),
                native.get_bit(&key, offset).unwrap(),
                "{key} differs at offset {offset}"
            );
        }
    }
}

#[cfg(test)]
mod lua_parity_tests {
    use super::*;

    const KEY: &str = "parity";

    #[test]
    fn test_programs_agree_with_native_evaluation() {
        for capacity in [3, 5, 1000] {
            for rate in [0.01, 0.3] {
                let mut lua = LuaRedis::new().unwrap();
                let mut native = NativeRedis::new();
                let insert = native.digests.insert.clone();
                let check = native.digests.check.clone();

                for n in 0..300 {
                    // every fifth step removes a value inserted three steps earlier
                    let (value, bit) = if n % 5 == 4 {
                        (format!("value-{}", n - 3), "0")
                    } else {
                        (format!("value-{n}"), "1")
                    };
                    let args = program_args(capacity, rate, &value, Some(bit));
                    assert_eq!(
                        lua.run(INSERT_SOURCE, KEY, &args).unwrap(),
                        native.run(&insert, KEY, &args),
                        "generation for {value} (capacity {capacity}, rate {rate})"
                    );
                }

                for n in 0..600 {
                    let value = format!("value-{n}");
                    let args = program_args(capacity, rate, &value, None);
                    assert_eq!(
                        lua.run(CHECK_SOURCE, KEY, &args).unwrap(),
                        native.run(&check, KEY, &args),
                        "lookup of {value} (capacity {capacity}, rate {rate})"
                    );
                }

                assert_same_contents(&mut lua.store, &mut native.store, KEY, capacity, rate);
            }
        }
    }

    #[test]
    fn test_insert_program_reports_generations() {
        let lua = LuaRedis::new().unwrap();
        let generations: Vec<i64> = (0..7)
            .map(|n| {
                lua.run(INSERT_SOURCE, KEY, &program_args(3, 0.01, &format!("v{n}"), Some("1")))
                    .unwrap()
            })
            .collect();
        assert_eq!(generations, vec![1, 1, 1, 2, 2, 2, 3]);
    }

    #[test]
    fn test_check_program_without_counter() {
        let lua = LuaRedis::new().unwrap();
        assert_eq!(lua.run(CHECK_SOURCE, KEY, &program_args(3, 0.01, "hij", None)).unwrap(), 0);
        assert_eq!(lua.store.key_count().unwrap(), 0);
    }
}
