//! StorX CLI
//!
//! Command-line interface for working with StorX files directly.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use storx::{AccessMode, Config, ErrorMode, Store, StorxError, Value};
use tracing_subscriber::{fmt, EnvFilter};

/// StorX CLI
#[derive(Parser, Debug)]
#[command(name = "storx")]
#[command(about = "CLI for StorX single-file key-value stores")]
#[command(version)]
struct Args {
    /// Milliseconds to wait for a locked file
    #[arg(short, long, default_value = "1500")]
    timeout: u64,

    /// Report engine faults as errors instead of aborting
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new store file
    Create { file: PathBuf },

    /// Probe a file and print its status
    Check { file: PathBuf },

    /// Delete a store file
    Delete { file: PathBuf },

    /// Print the value of a key
    Get { file: PathBuf, key: String },

    /// Insert a new key (fails if it exists)
    Set {
        file: PathBuf,
        key: String,
        /// Literal value: null, true, false, a number, or text
        value: String,
    },

    /// Insert or overwrite a key
    Put {
        file: PathBuf,
        key: String,
        /// Literal value: null, true, false, a number, or text
        value: String,
    },

    /// Delete a key
    Del { file: PathBuf, key: String },

    /// Check whether a key exists
    Exists { file: PathBuf, key: String },

    /// Print every key and value
    List { file: PathBuf },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,storx=info"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let config = Config::builder()
        .busy_timeout_ms(args.timeout)
        .error_mode(if args.quiet {
            ErrorMode::Return
        } else {
            ErrorMode::Raise
        })
        .build();

    let mut store = Store::new(config);

    match run(&mut store, args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error {}: {}", e.code(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(store: &mut Store, command: Commands) -> Result<(), StorxError> {
    match command {
        Commands::Create { file } => store.create_file(&file),
        Commands::Check { file } => {
            let status = store.check_file(&file);
            println!("{:?} ({})", status, status.code());
            Ok(())
        }
        Commands::Delete { file } => store.delete_file(&file),
        Commands::Get { file, key } => {
            let value = store.with_file(&file, AccessMode::ReadOnly, |s| s.read_key(&key))?;
            println!("{:?}", value);
            Ok(())
        }
        Commands::Set { file, key, value } => {
            let value = parse_literal(&value);
            store.with_file(&file, AccessMode::ReadWrite, |s| s.write_key(&key, &value))
        }
        Commands::Put { file, key, value } => {
            let value = parse_literal(&value);
            store.with_file(&file, AccessMode::ReadWrite, |s| s.modify_key(&key, &value))
        }
        Commands::Del { file, key } => {
            store.with_file(&file, AccessMode::ReadWrite, |s| s.delete_key(&key))
        }
        Commands::Exists { file, key } => {
            let exists = store.with_file(&file, AccessMode::ReadOnly, |s| s.check_key(&key))?;
            println!("{}", exists);
            Ok(())
        }
        Commands::List { file } => {
            let all = store.with_file(&file, AccessMode::ReadOnly, |s| s.read_all_keys())?;
            for (key, value) in all {
                println!("{} = {:?}", key, value);
            }
            Ok(())
        }
    }
}

/// Interpret a command-line literal as the narrowest matching value
fn parse_literal(raw: &str) -> Value {
    match raw {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                Value::Int(i)
            } else if let Some(f) = raw
                .parse::<f64>()
                .ok()
                .filter(|_| raw.bytes().any(|b| b.is_ascii_digit()))
            {
                Value::Float(f)
            } else {
                Value::Text(raw.to_string())
            }
        }
    }
}
