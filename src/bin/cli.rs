//! flatpack CLI
//!
//! Command-line harness over the store primitives: map-like get/set/del
//! plus key listing, against a store file on disk.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

use flatpack::Store;

/// flatpack CLI
#[derive(Parser, Debug)]
#[command(name = "flatpack-cli")]
#[command(about = "CLI for the flatpack single-file key-value store")]
#[command(version)]
struct Args {
    /// Path to the store file (created if missing)
    #[arg(short, long, default_value = "flatpack.db")]
    file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair (value parsed as JSON, else stored as a string)
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Check whether a key exists
    Exists {
        /// The key to check
        key: String,
    },

    /// List all keys
    Keys,

    /// Remove every record
    Clear,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,flatpack=info"));

    fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> flatpack::Result<()> {
    let mut store = Store::open(&args.file)?;

    match args.command {
        Commands::Get { key } => match store.read(key.as_bytes())? {
            Some(value) => println!("{}", value),
            None => println!("(nil)"),
        },
        Commands::Set { key, value } => {
            // Bare words become JSON strings so `set k hello` just works.
            let value: Value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            store.write(key.as_bytes(), &value)?;
            println!("OK");
        }
        Commands::Del { key } => {
            store.delete(key.as_bytes())?;
            println!("OK");
        }
        Commands::Exists { key } => {
            println!("{}", store.exists(key.as_bytes()));
        }
        Commands::Keys => {
            for key in store.keys() {
                println!("{}", String::from_utf8_lossy(key));
            }
        }
        Commands::Clear => {
            store.clear()?;
            println!("OK");
        }
    }

    Ok(())
}
