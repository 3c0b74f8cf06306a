//! # CaseLens CLI (`caselens`)
//!
//! The `caselens` binary drives the full pipeline: corpus ingestion,
//! interactive search, store inspection, and the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! caselens --config ./config/caselens.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `caselens ingest` | Chunk and embed the corpus into the vector store |
//! | `caselens search "<query>"` | Embed a query and print ranked cases |
//! | `caselens stats` | Summarize the persisted vector store |
//! | `caselens serve` | Start the JSON HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Build the store from a corpus file
//! caselens ingest --input data/cases.json
//!
//! # Preview chunk counts without embedding or writing anything
//! caselens ingest --input data/cases.json --dry-run
//!
//! # Filtered search
//! caselens search "duty of care" --court SCC --year-from 2015 --keyword negligence
//!
//! # Start the HTTP API
//! caselens serve --config ./config/caselens.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use caselens::{config, ingest, search, server, stats};

/// CaseLens — semantic search over legal case law.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/caselens.example.toml` for a full example; every
/// setting has a default, so commands also run without a config file.
#[derive(Parser)]
#[command(
    name = "caselens",
    about = "CaseLens — semantic search over legal case law",
    version,
    long_about = "CaseLens ingests a corpus of court decisions, chunks and embeds them through \
    an external embedding provider, and persists a JSON vector store. Queries are embedded, \
    cosine-scored against every chunk, filtered by year, court, and keywords, and aggregated \
    to the best chunk per case."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/caselens.toml`. Built-in defaults apply when
    /// the file does not exist.
    #[arg(long, global = true, default_value = "./config/caselens.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Chunk and embed the corpus into the vector store.
    ///
    /// Reads a JSON array of cases, splits each body into overlapping
    /// word windows, embeds every window, and writes the complete store
    /// atomically. A failed run leaves any previous store untouched.
    Ingest {
        /// Path to the corpus file (JSON array of cases).
        #[arg(long)]
        input: Option<PathBuf>,

        /// Where to write the vector store (defaults to `store.path` from
        /// the config).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Show case and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Embed a query and print ranked cases.
    ///
    /// Requires an embedding provider and an existing vector store.
    Search {
        /// The search query string.
        query: String,

        /// Only match cases decided in or after this year.
        #[arg(long)]
        year_from: Option<i32>,

        /// Only match cases decided in or before this year.
        #[arg(long)]
        year_to: Option<i32>,

        /// Only match cases from this court (case-insensitive).
        #[arg(long)]
        court: Option<String>,

        /// Require this keyword in the matching chunk text (repeatable;
        /// all keywords must match).
        #[arg(long = "keyword")]
        keywords: Vec<String>,

        /// Maximum number of cases to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Summarize the persisted vector store.
    Stats,

    /// Start the JSON HTTP API server.
    ///
    /// Binds to `[server].bind` and serves `/api/search`, `/api/reload`,
    /// and `/health`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Ingest {
            input,
            output,
            dry_run,
        } => {
            ingest::run_ingest(&cfg, input, output, dry_run).await?;
        }
        Commands::Search {
            query,
            year_from,
            year_to,
            court,
            keywords,
            limit,
        } => {
            search::run_search(&cfg, &query, year_from, year_to, court, keywords, limit).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
