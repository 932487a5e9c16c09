//! ChainSink CLI — bootstrap the schema, inspect and manage cursor state.
//!
//! # Commands
//! ```
//! chainsink bootstrap
//! chainsink status
//! chainsink resolve  --token <token>
//! chainsink reset
//! chainsink info
//! ```
//!
//! The ingestion pipeline itself is embedded as a library
//! (`chainsink-pipeline`); this binary manages the durable state around it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chainsink_core::cursor::CursorStore;
use chainsink_pipeline::PipelineConfig;
use chainsink_storage::sqlite::SqliteStore;

#[derive(Parser)]
#[command(
    name = "chainsink",
    about = "Reorg-safe blockchain event ingestion — ChainSink CLI",
    long_about = "
ChainSink CLI: manage the durable state of an ingestion pipeline.

ENVIRONMENT VARIABLES:
  CHAINSINK_DB         SQLite database path (default: ./chainsink.db)
  CHAINSINK_STREAM_ID  Stream identity / cursor key (default: default)
  CHAINSINK_PREFIX     Collection name prefix (default: evt)
",
    version
)]
struct Cli {
    /// SQLite database path (overrides CHAINSINK_DB)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Stream identity (overrides CHAINSINK_STREAM_ID)
    #[arg(long, global = true)]
    stream_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the cursor table and every event collection
    Bootstrap {
        /// Collection name prefix (overrides CHAINSINK_PREFIX)
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Show the latest committed position of the stream
    Status,

    /// Translate a resumption token back into its block number
    Resolve {
        /// The opaque resumption token
        #[arg(long)]
        token: String,
    },

    /// Delete the stream's cursor rows (the stream restarts from genesis)
    Reset,

    /// Show ChainSink configuration info
    Info,
}

fn env_or(cli_value: Option<String>, var: &str, default: &str) -> String {
    cli_value
        .or_else(|| std::env::var(var).ok())
        .unwrap_or_else(|| default.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let db = env_or(cli.db.clone(), "CHAINSINK_DB", "./chainsink.db");
    let stream_id = env_or(cli.stream_id.clone(), "CHAINSINK_STREAM_ID", "default");

    match cli.command {
        Commands::Bootstrap { prefix } => {
            let prefix = env_or(prefix, "CHAINSINK_PREFIX", "evt");
            let store = open(&db).await?;
            store
                .bootstrap_schema(&prefix)
                .await
                .context("failed to bootstrap schema")?;
            println!("Bootstrapped cursor table and '{prefix}_*' collections in {db}");
        }

        Commands::Status => {
            let store = open(&db).await?;
            match store.get(&stream_id).await? {
                Some(position) => {
                    let confirmed = chrono::DateTime::from_timestamp_millis(position.confirmed_at)
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| position.confirmed_at.to_string());
                    println!("stream:       {stream_id}");
                    println!("block:        {}", position.block_number);
                    println!("token:        {}", position.token);
                    println!("confirmed at: {confirmed}");
                }
                None => println!("stream '{stream_id}' has no committed position"),
            }
        }

        Commands::Resolve { token } => {
            let store = open(&db).await?;
            let block = store
                .resolve_token(&stream_id, &token)
                .await
                .context("token was never confirmed by this cursor store")?;
            println!("{block}");
        }

        Commands::Reset => {
            let store = open(&db).await?;
            store.reset_stream(&stream_id).await?;
            println!("Cursor rows for stream '{stream_id}' deleted");
        }

        Commands::Info => {
            let defaults = PipelineConfig::default();
            println!("ChainSink v{}", env!("CARGO_PKG_VERSION"));
            println!("  Default stream id: {}", defaults.stream_id);
            println!("  Default collection prefix: {}", defaults.collection_prefix);
            println!(
                "  Default reconnect backoff: {} retries, {}ms initial, {}s cap",
                defaults.retry.max_retries,
                defaults.retry.initial_backoff.as_millis(),
                defaults.retry.max_backoff.as_secs()
            );
            println!("  Storage backends: memory, SQLite (feature: sqlite)");
            println!(
                "  Event kinds: {}",
                chainsink_core::event::EventKind::ALL
                    .iter()
                    .map(|k| k.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }

    Ok(())
}

async fn open(db: &str) -> Result<SqliteStore> {
    SqliteStore::open(db)
        .await
        .with_context(|| format!("failed to open database at {db}"))
}
