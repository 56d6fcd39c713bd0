mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use engram::config::MemoryConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "engram", version, about = "Branch-partitioned knowledge store for AI assistants")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search the store with ranked multi-strategy retrieval
    Search {
        /// The query text
        query: String,
        /// Branch to search; use "*" for all branches
        #[arg(short, long)]
        branch: Option<String>,
        /// Status filter (repeatable): active, deprecated, archived, draft
        #[arg(short, long)]
        status: Vec<String>,
        /// Context expansion depth, 1-3
        #[arg(long)]
        depth: Option<u8>,
    },
    /// Export a branch as pretty JSON to stdout (or into the backups dir)
    Export {
        #[arg(short, long)]
        branch: Option<String>,
        /// Write into the backups directory instead of stdout
        #[arg(long)]
        to_file: bool,
    },
    /// Import entities and relations from a JSON file
    Import {
        /// Path to a pretty export or line-delimited snapshot
        file: std::path::PathBuf,
        #[arg(short, long)]
        branch: Option<String>,
    },
    /// List branches with entity and relation counts
    Branches,
    /// Show store statistics
    Stats,
    /// Run a database health check
    Doctor,
    /// Delete the store and start fresh
    Reset {
        /// Required confirmation flag
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = MemoryConfig::load()?;

    // Initialize tracing with the configured log level, on stderr so stdout
    // stays clean for JSON output.
    let filter =
        EnvFilter::try_new(&config.log.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Search {
            query,
            branch,
            status,
            depth,
        } => cli::search::run(&config, &query, branch.as_deref(), &status, depth).await?,
        Command::Export { branch, to_file } => {
            cli::export::run(&config, branch.as_deref(), to_file)?
        }
        Command::Import { file, branch } => {
            cli::import::run(&config, &file, branch.as_deref()).await?
        }
        Command::Branches => cli::branches::run(&config)?,
        Command::Stats => cli::stats::run(&config)?,
        Command::Doctor => cli::doctor::run(&config)?,
        Command::Reset { yes } => cli::reset::run(&config, yes)?,
    }

    Ok(())
}
