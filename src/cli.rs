use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "n3mo",
    version,
    about = "Cross-file code graph and change impact for Python repositories",
    after_help = r#"Examples:
  n3mo index --repo .
  n3mo impact upsert_symbol --repo .
  n3mo impact connect --file db.py --depth 3 --json
  n3mo impact helper --graph impact.json
  n3mo overview --repo .
"#
)]
pub struct Args {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Ingest the repository and resolve references.
    Index {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        /// Project name (defaults to the repository directory name).
        #[arg(long)]
        name: Option<String>,
        /// Stable project locator (defaults to the canonical repository path).
        #[arg(long)]
        locator: Option<String>,
        /// Re-ingest files even when their content hash is unchanged.
        #[arg(long)]
        force: bool,
        /// Include files ignored by .gitignore.
        #[arg(long)]
        no_ignore: bool,
    },
    /// Re-run reference resolution without re-ingesting.
    Resolve {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        locator: Option<String>,
    },
    /// Show what depends on a symbol, directly and transitively.
    Impact {
        /// Symbol name to analyse.
        symbol: String,
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        locator: Option<String>,
        /// Only consider definitions in this file (repository-relative).
        #[arg(long)]
        file: Option<String>,
        /// Maximum traversal depth, at least 1 (defaults to N3MO_MAX_DEPTH).
        #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        depth: Option<usize>,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
        /// Write a node/edge export of the report to this path.
        #[arg(long)]
        graph: Option<PathBuf>,
    },
    /// Print row counts for the project.
    Overview {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        locator: Option<String>,
    },
}
