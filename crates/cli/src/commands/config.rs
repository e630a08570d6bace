//! Config commands

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use searchdocs::{RuntimeConfig, config::Config};

use super::project_path;

/// Write a config template into the project root
pub fn cmd_config_init(root: Option<PathBuf>, force: bool) -> Result<()> {
  let config_path = Config::project_config_path(&project_path(root));

  if config_path.exists() && !force {
    bail!(
      "Config file already exists: {}. Use --force to overwrite it",
      config_path.display()
    );
  }

  std::fs::write(&config_path, Config::generate_template())
    .with_context(|| format!("Failed to write {}", config_path.display()))?;
  println!("Created config: {}", config_path.display());

  Ok(())
}

/// Print the config that applies to the project
pub fn cmd_config_show(root: Option<PathBuf>) -> Result<()> {
  let runtime = RuntimeConfig::load(&project_path(root)).context("Failed to load config")?;
  println!("# root: {}", runtime.root.display());
  println!("{}", runtime.config.to_toml().context("Failed to render config")?);
  Ok(())
}
