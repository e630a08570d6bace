//! searchdocs CLI - semantic search over a tree of markdown documents

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod logging;

use commands::{SearchArgs, cmd_config_init, cmd_config_show, cmd_index, cmd_search, cmd_serve, cmd_status};
use logging::init_cli_logging;

#[derive(Parser)]
#[command(name = "searchdocs")]
#[command(about = "Semantic search over markdown documents")]
#[command(after_help = "\
QUICK START:
  searchdocs config init          # Write .search-docs.toml with defaults
  searchdocs serve                # Watch and index until ctrl-c
  searchdocs search \"query\"       # Search indexed sections

ONE-SHOT:
  searchdocs index                # Rebuild the whole index
  searchdocs status               # Index and request queue counts")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

/// Subcommands for `searchdocs config`
#[derive(Subcommand)]
pub enum ConfigCommand {
  /// Write a config template into the project
  Init {
    /// Project root (default: current directory)
    #[arg(short, long)]
    root: Option<PathBuf>,
    /// Overwrite an existing config file
    #[arg(long)]
    force: bool,
  },
  /// Print the effective config
  Show {
    /// Project root (default: current directory)
    #[arg(short, long)]
    root: Option<PathBuf>,
  },
}

#[derive(Subcommand)]
enum Commands {
  /// Run the watcher and workers in the foreground until ctrl-c
  Serve {
    /// Project root (default: current directory)
    #[arg(short, long)]
    root: Option<PathBuf>,
    /// Log to the rolling log file instead of the console
    #[arg(long)]
    log_file: bool,
  },
  /// Force-index every document, or just the given paths
  Index {
    /// Project root (default: current directory)
    #[arg(short, long)]
    root: Option<PathBuf>,
    /// Documents to index (default: all discovered documents)
    paths: Vec<String>,
  },
  /// Search indexed sections
  Search(SearchArgs),
  /// Show index statistics and request queue counts
  Status {
    /// Project root (default: current directory)
    #[arg(short, long)]
    root: Option<PathBuf>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Manage configuration
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  // The daemon sets up its own logging once its config is loaded
  if !matches!(cli.command, Commands::Serve { .. }) {
    init_cli_logging();
  }

  match cli.command {
    Commands::Serve { root, log_file } => cmd_serve(root, !log_file).await,
    Commands::Index { root, paths } => cmd_index(root, paths).await,
    Commands::Search(args) => cmd_search(args).await,
    Commands::Status { root, json } => cmd_status(root, json).await,
    Commands::Config { command } => match command {
      ConfigCommand::Init { root, force } => cmd_config_init(root, force),
      ConfigCommand::Show { root } => cmd_config_show(root),
    },
  }
}
