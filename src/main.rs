//! # Contract Store CLI (`ctr`)
//!
//! ## Usage
//!
//! ```bash
//! ctr --config ./config/ctr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ctr init` | Create the SQLite database and run schema migrations |
//! | `ctr ingest <file>` | Store a plain-text contract |
//! | `ctr list` | List stored contracts with a text preview |
//! | `ctr get <id>` | Print a contract in full |
//! | `ctr delete <id>` | Remove a contract |
//! | `ctr stats` | Collection statistics |
//! | `ctr search "<query>"` | Rank contracts by similarity |
//! | `ctr context "<question>"` | Print the answering context for a question |
//! | `ctr export` / `ctr import` | JSON Lines backup and restore |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use contract_store::{config, export, get, ingest, migrate, search, stats};

/// Contract Store CLI: ingest contracts and retrieve them as context for
/// question answering.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ctr.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ctr",
    about = "Contract Store: a local knowledge store for contracts",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ctr.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` wins.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Store a plain-text contract.
    ///
    /// Prints the new contract id.
    Ingest {
        /// Path to the contract text.
        file: PathBuf,

        /// Already-extracted fields as a JSON object,
        /// e.g. `{"parties": ["Acme"], "end_date": "2026-01-01"}`.
        #[arg(long)]
        fields: Option<String>,

        /// Extraction confidence in [0, 1].
        #[arg(long)]
        confidence: Option<f32>,
    },

    /// List stored contracts in insertion order.
    List,

    /// Print a contract by id.
    Get {
        id: String,
    },

    /// Delete a contract by id.
    Delete {
        id: String,
    },

    /// Show collection statistics.
    Stats,

    /// Rank stored contracts by similarity to a query.
    Search {
        query: String,

        /// Number of results (defaults to `[retrieval].top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Print the context assembled for a question.
    Context {
        question: String,

        /// Number of contracts to include (defaults to `[retrieval].top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Export the collection as JSON Lines.
    Export {
        /// Output file; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Import a JSON Lines export, keeping its embeddings.
    Import {
        path: PathBuf,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            file,
            fields,
            confidence,
        } => {
            ingest::run_ingest(&cfg, &file, fields.as_deref(), confidence).await?;
        }
        Commands::List => {
            get::run_list(&cfg).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Delete { id } => {
            get::run_delete(&cfg, &id).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Search { query, k } => {
            search::run_search(&cfg, &query, k).await?;
        }
        Commands::Context { question, k } => {
            search::run_context(&cfg, &question, k).await?;
        }
        Commands::Export { output } => {
            export::run_export(&cfg, output.as_deref()).await?;
        }
        Commands::Import { path } => {
            export::run_import(&cfg, &path).await?;
        }
    }

    Ok(())
}
