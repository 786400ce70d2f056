//! symboldb CLI
//!
//! Command-line access to a market symbol database on disk.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use symboldb::market::{DB_NAME, SYMBOLS, WATCHLIST};
use symboldb::storage::StorageManager;
use symboldb::wal::WalRecovery;
use symboldb::{Config, MarketStore, Record, Result, SymbolDbError, Value};
use tracing_subscriber::{fmt, EnvFilter};

/// symboldb CLI
#[derive(Parser, Debug)]
#[command(name = "symboldb")]
#[command(about = "Local store for market symbols and a watchlist")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./symboldb_data")]
    data_dir: PathBuf,

    /// Log filter (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show schema version, collections and indexes
    Info,

    /// Symbol directory operations
    #[command(subcommand)]
    Symbols(SymbolsCommand),

    /// Watchlist operations
    #[command(subcommand)]
    Watch(WatchCommand),

    /// Write a snapshot and truncate the WAL
    Checkpoint,

    /// Check the WAL for torn or corrupted entries without modifying it
    VerifyWal,
}

#[derive(Subcommand, Debug)]
enum SymbolsCommand {
    /// Replace the directory with the records in a JSON array file
    Import {
        /// File holding `[{"symbol": ..., "name": ...}, ...]`
        file: PathBuf,
    },

    /// Print every symbol
    List,

    /// Print one symbol
    Get {
        /// The symbol (case-insensitive)
        symbol: String,
    },

    /// Print symbols with the given name
    FindName {
        /// The company name (case-insensitive)
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum WatchCommand {
    /// Add or replace a watchlist entry
    Add {
        /// The symbol to watch
        symbol: String,

        /// Extra fields as key=value
        #[arg(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },

    /// Print the watchlist
    List,

    /// Remove a symbol from the watchlist
    Remove {
        /// The symbol to remove
        symbol: String,
    },

    /// Empty the watchlist
    Clear,
}

fn parse_field(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing/logging
    let filter = match &args.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,symboldb=debug")),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("symboldb v{}", symboldb::VERSION);
    tracing::debug!("Data directory: {}", args.data_dir.display());

    let config = Config::builder().data_dir(&args.data_dir).build();

    match run(&config, args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config, command: Commands) -> Result<()> {
    let open = || MarketStore::open(config.clone());

    match command {
        Commands::Info => {
            let store = open()?;
            let db = store.database();
            println!("{} (schema v{})", db.name(), db.version());
            for name in db.collection_names() {
                if let Some(info) = db.collection_info(&name) {
                    println!(
                        "  {}: key={} records={}",
                        info.name, info.primary_key, info.record_count
                    );
                    for index in info.indexes {
                        println!(
                            "    index {} on {}{}",
                            index.name,
                            index.field,
                            if index.unique { " (unique)" } else { "" }
                        );
                    }
                }
            }
        }
        Commands::Symbols(SymbolsCommand::Import { file }) => {
            let store = open()?;
            let text = fs::read_to_string(&file)?;
            let json: serde_json::Value = serde_json::from_str(&text)?;
            let items = json.as_array().ok_or_else(|| {
                SymbolDbError::Serialization(format!("{}: expected a JSON array", file.display()))
            })?;
            let records = items
                .iter()
                .map(Record::from_json)
                .collect::<Result<Vec<_>>>()?;
            let count = store.symbols().replace_all(records)?;
            tracing::info!(count, collection = SYMBOLS, "import complete");
        }
        Commands::Symbols(SymbolsCommand::List) => print_records(&open()?.symbols().list()?),
        Commands::Symbols(SymbolsCommand::Get { symbol }) => {
            if let Some(record) = open()?.symbols().get(symbol.as_str())? {
                print_records(&[record]);
            }
        }
        Commands::Symbols(SymbolsCommand::FindName { name }) => {
            print_records(&open()?.symbols().find_by("name", name.as_str())?)
        }
        Commands::Watch(WatchCommand::Add { symbol, fields }) => {
            let mut record = Record::new().with("symbol", symbol);
            for (key, value) in fields {
                record.insert(key, Value::Text(value));
            }
            open()?.watchlist().save(record)?;
        }
        Commands::Watch(WatchCommand::List) => print_records(&open()?.watchlist().list()?),
        Commands::Watch(WatchCommand::Remove { symbol }) => {
            open()?.watchlist().remove(symbol.as_str())?;
        }
        Commands::Watch(WatchCommand::Clear) => {
            open()?.watchlist().clear()?;
            tracing::info!(collection = WATCHLIST, "cleared");
        }
        Commands::Checkpoint => open()?.database().checkpoint()?,
        Commands::VerifyWal => {
            // Read-only: opening the store would truncate a torn tail
            let result = WalRecovery::verify(&StorageManager::wal_path(config, DB_NAME))?;
            println!(
                "entries={} corrupted={} last_lsn={} trailing_bytes={}",
                result.entries_recovered,
                result.entries_corrupted,
                result.last_lsn,
                result.bytes_discarded
            );
        }
    }

    Ok(())
}

/// One JSON object per line
fn print_records(records: &[Record]) {
    for record in records {
        println!("{}", record.to_json());
    }
}
