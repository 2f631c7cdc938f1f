//! unikey command-line tool.
//!
//! Reserve, release and inspect unique identifiers in a sled database, and
//! compute constraint fingerprints.

mod commands;
mod error;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use commands::Command;
use error::CliError;
use unikey_core::{KeyedStore, SledStore, StoreConfig};

/// Default path of the database directory.
pub const DEFAULT_DATA_PATH: &str = "./unikey_data";

/// unikey command-line tool
#[derive(Parser, Debug)]
#[command(name = "unikey")]
#[command(version, about = "Unique identifier reservations on sled", long_about = None)]
pub struct Args {
    /// Path to the database directory.
    #[arg(short, long, env = "UNIKEY_PATH", default_value = DEFAULT_DATA_PATH)]
    pub path: PathBuf,

    /// Cache capacity in megabytes.
    #[arg(long, env = "UNIKEY_CACHE_MB", default_value_t = 256)]
    pub cache_mb: u64,

    /// Pretty-print JSON output.
    #[arg(long)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// Convert command-line arguments to store configuration.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(&self.path).with_cache_capacity(self.cache_mb * 1024 * 1024)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unikey=warn,unikey_core=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let output = match &args.command {
        Command::Fingerprint { fields } => commands::fingerprint(fields)?,
        command => {
            let config = args.store_config();
            tracing::debug!(path = %config.path.display(), "opening store");
            let store = Arc::new(SledStore::open(config)?);
            let output = commands::execute(&store, command.clone())?;
            store.flush()?;
            output
        }
    };

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", rendered);
    Ok(())
}
