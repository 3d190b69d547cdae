//! StreamVault CLI
//!
//! Inspect and maintain a StreamVault data directory.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use streamvault::codec::StringSerde;
use streamvault::health::HealthCheck;
use streamvault::{
    Config, FindStreamCriteria, KvEnv, ReferenceDataStore, StreamStore,
};

/// StreamVault maintenance tool
#[derive(Parser, Debug)]
#[command(name = "streamvault-cli")]
#[command(about = "Stream and reference data storage core")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./streamvault_data")]
    data_dir: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List stream metadata matching the given filters
    Find {
        /// Only streams of this feed
        #[arg(short, long)]
        feed: Option<String>,

        /// Only streams of this type
        #[arg(short = 't', long)]
        stream_type: Option<String>,
    },

    /// Look up a reference data value at a point in time
    Lookup {
        /// Map name
        map: String,

        /// Entry key
        key: String,

        /// Probe time (epoch milliseconds)
        time: u64,
    },

    /// Physically remove deleted streams
    Sweep,

    /// Report component health
    Health,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,streamvault=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .volume(format!("{}/volume1", args.data_dir))
        .ref_store_path(format!("{}/refdata.svd", args.data_dir))
        .build();

    if let Err(e) = run(&config, args.command) {
        tracing::error!("Command failed: {}", e);
        std::process::exit(1);
    }
}

fn run(config: &Config, command: Command) -> streamvault::Result<()> {
    match command {
        Command::Find { feed, stream_type } => {
            let store = StreamStore::open(config)?;
            let mut criteria = FindStreamCriteria::new();
            if let Some(feed) = feed {
                criteria = criteria.with_feed(feed);
            }
            if let Some(stream_type) = stream_type {
                criteria = criteria.with_stream_type(stream_type);
            }
            for meta in store.find_meta(&criteria) {
                println!(
                    "{:>8}  {:<20} {:<12} {:>10} bytes  {}",
                    meta.id, meta.feed, meta.stream_type, meta.size, meta.status
                );
            }
        }
        Command::Lookup { map, key, time } => {
            let env = KvEnv::open(&config.ref_store_path, config.env_options())?;
            let refdata = ReferenceDataStore::open(env)?;
            match refdata.lookup_as(&map, key.as_bytes(), time, &StringSerde)? {
                Some(value) => println!("{}", value),
                None => println!("(no entry effective at {})", time),
            }
        }
        Command::Sweep => {
            let store = StreamStore::open(config)?;
            let removed = store.sweep()?;
            println!("removed {} streams", removed);
        }
        Command::Health => {
            let store = StreamStore::open(config)?;
            let env = KvEnv::open(&config.ref_store_path, config.env_options())?;
            let refdata = ReferenceDataStore::open(env.clone())?;

            for status in [store.get_health(), env.get_health(), refdata.get_health()] {
                println!(
                    "{:<16} {:<8} {}",
                    status.component,
                    if status.healthy { "ok" } else { "DEGRADED" },
                    status.detail
                );
            }
        }
    }
    Ok(())
}
