//! Serve command

use std::path::PathBuf;

use anyhow::{Context, Result};
use searchdocs::{Daemon, RuntimeConfig};
use tracing::info;

use super::project_path;
use crate::logging::init_daemon_logging;

/// Run the daemon until ctrl-c
pub async fn cmd_serve(root: Option<PathBuf>, foreground: bool) -> Result<()> {
  let runtime = RuntimeConfig {
    foreground,
    ..RuntimeConfig::load(&project_path(root)).context("Failed to load config")?
  };
  let _guard = init_daemon_logging(&runtime.config.daemon, foreground);

  info!(root = %runtime.root.display(), "Starting searchdocs");
  Daemon::new(runtime).run().await.context("Failed to run daemon")?;

  Ok(())
}
