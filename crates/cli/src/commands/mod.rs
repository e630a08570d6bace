//! CLI command implementations

mod config;
mod index;
mod search;
mod serve;

use std::path::PathBuf;

use anyhow::{Context, Result};
use searchdocs::{App, RuntimeConfig};

pub use config::{cmd_config_init, cmd_config_show};
pub use index::{cmd_index, cmd_status};
pub use search::{SearchArgs, cmd_search};
pub use serve::cmd_serve;

/// The given root, or the current directory.
fn project_path(root: Option<PathBuf>) -> PathBuf {
  root
    .or_else(|| std::env::current_dir().ok())
    .unwrap_or_else(|| PathBuf::from("."))
}

/// Load config for the project and connect to the engine.
async fn open_app(root: Option<PathBuf>) -> Result<App> {
  let runtime = RuntimeConfig::load(&project_path(root)).context("Failed to load config")?;
  App::open(&runtime).await.context("Failed to start the search engine")
}
