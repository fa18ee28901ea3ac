use clap::{Parser, Subcommand};
use redis_bloom_rs::{
    BloomFilter, ExecutorKind, FilterConfigBuilder, HashEngine, RedisStore,
    version,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1/")]
    redis_url: String,

    /// Name of the filter in Redis
    #[arg(short, long, env = "BLOOM_KEY_NAME", default_value = "bloomfilter")]
    key_name: String,

    /// Expected number of elements (per generation when scaling)
    #[arg(short, long, env = "BLOOM_CAPACITY", default_value = "10000")]
    capacity: usize,

    /// False positive rate (between 0 and 1)
    #[arg(short, long, env = "BLOOM_FALSE_POSITIVE_RATE", default_value = "0.01")]
    fpr: f64,

    /// Executor: atomic or orchestrated (detected from the server when omitted)
    #[arg(short, long, env = "BLOOM_EXECUTOR")]
    executor: Option<String>,

    /// Hash engine: sha1, md5 or crc32
    #[arg(long, env = "BLOOM_HASH_ENGINE", default_value = "sha1")]
    hash_engine: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert one or more elements
    Insert {
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Check which elements are (probably) present
    Check {
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Remove one or more elements
    Remove {
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Delete every key of the filter
    Clear,

    /// Display information about the filter
    Info,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let hash_engine: HashEngine = cli.hash_engine.parse()?;
    let mut builder = FilterConfigBuilder::default()
        .capacity(cli.capacity)
        .false_positive_rate(cli.fpr)
        .key_name(cli.key_name.as_str())
        .hash_engine(hash_engine);
    if let Some(name) = &cli.executor {
        builder = builder.executor(name.parse::<ExecutorKind>()?);
    }
    let config = builder.build()?;

    debug!(url = %cli.redis_url, "connecting");
    let store = RedisStore::new(&cli.redis_url)?;
    let mut filter = BloomFilter::new(config, store)?;

    match &cli.command {
        Commands::Insert { values } => {
            filter.insert_all(values)?;
            println!("Inserted {} element(s)", values.len());
        }
        Commands::Check { values } => {
            let present = filter.contains_all(values)?;
            for value in values {
                let status = if present.contains(&value) {
                    "probably present"
                } else {
                    "absent"
                };
                println!("{value}: {status}");
            }
        }
        Commands::Remove { values } => {
            filter.remove_all(values)?;
            println!("Removed {} element(s)", values.len());
        }
        Commands::Clear => {
            filter.clear()?;
            println!("Cleared filter '{}'", filter.config().key_name);
        }
        Commands::Info => {
            let params = *filter.params();
            let config = filter.config().clone();
            println!("{}", version());
            println!("Key name:            {}", config.key_name);
            println!("Executor:            {}", filter.executor_name());
            println!("Hash engine:         {}", config.hash_engine);
            println!("Capacity:            {}", config.capacity);
            println!("False positive rate: {}", config.false_positive_rate);
            println!("Bits (fixed mode):   {}", params.num_bits);
            println!("Hashes (fixed mode): {}", params.num_hashes);
            match (filter.insert_count()?, filter.generation_count()?) {
                (Some(count), Some(generations)) => {
                    println!("Insertions:          {count}");
                    println!("Generations:         {generations}");
                }
                _ => println!("Insertions:          not tracked"),
            }
        }
    }

    Ok(())
}
