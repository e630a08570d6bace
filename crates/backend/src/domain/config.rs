//! Configuration system for searchdocs with per-project overrides.
//!
//! Config priority: project-relative (.search-docs.toml) > user (~/.config/searchdocs/config.toml)

use std::path::{Path, PathBuf};

use globset::Glob;
use serde::{Deserialize, Serialize};

/// Name of the project-relative config file.
pub const PROJECT_CONFIG_FILE: &str = ".search-docs.toml";

/// Directory (relative to the project root) holding all local state.
pub const STATE_DIR: &str = ".search-docs";

/// Approximate characters per token for the fallback estimator.
pub const CHARS_PER_TOKEN: usize = 4;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
  #[error("Invalid config: {0}")]
  Invalid(String),
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
  /// Display name (default: directory name)
  pub name: Option<String>,
  /// Project root, relative to the config file (default: ".")
  pub root: PathBuf,
}

impl Default for ProjectConfig {
  fn default() -> Self {
    Self {
      name: None,
      root: PathBuf::from("."),
    }
  }
}

/// Which files are considered documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
  /// Glob patterns of files to index, relative to the root (default: ["**/*.md"])
  pub include: Vec<String>,
  /// Glob patterns excluded even when included
  pub exclude: Vec<String>,
  /// Honour .gitignore files (default: true)
  pub ignore_gitignore: bool,
}

impl Default for FilesConfig {
  fn default() -> Self {
    Self {
      include: vec!["**/*.md".to_string()],
      exclude: vec![
        "**/node_modules/**".to_string(),
        "**/.git/**".to_string(),
        "**/dist/**".to_string(),
        "**/build/**".to_string(),
      ],
      ignore_gitignore: true,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
  /// Sections above this size are reported, never force-split (default: 2000)
  pub max_tokens_per_section: usize,
  /// Minimum size worth splitting (default: 100)
  pub min_tokens_for_split: usize,
  /// Deepest heading level materialized as its own section, 1..=3 (default: 3)
  pub max_depth: u8,
  /// Vector dimension reported by the engine model (default: 256)
  pub vector_dimension: usize,
  /// Embedding model loaded by the engine on init
  pub embedding_model: String,
}

impl Default for IndexingConfig {
  fn default() -> Self {
    Self {
      max_tokens_per_section: 2000,
      min_tokens_for_split: 100,
      max_depth: 3,
      vector_dimension: 256,
      embedding_model: "cl-nagoya/ruri-v3-30m".to_string(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
  /// Results returned when the caller gives no limit (default: 10)
  pub default_limit: usize,
  /// Upper bound for any requested limit (default: 100)
  pub max_limit: usize,
  /// Exclude dirty sections by default (default: false)
  pub include_clean_only: bool,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      default_limit: 10,
      max_limit: 100,
      include_clean_only: false,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// Where document bodies are stored (default: ".search-docs/documents")
  pub documents_path: PathBuf,
  /// Where the engine keeps its tables (default: ".search-docs/index")
  pub index_path: PathBuf,
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      documents_path: PathBuf::from(STATE_DIR).join("documents"),
      index_path: PathBuf::from(STATE_DIR).join("index"),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  /// Run the index worker (default: true)
  pub enabled: bool,
  /// Milliseconds between sweeps (default: 5000)
  pub interval_ms: u64,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      interval_ms: 5000,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirtyWorkerConfig {
  /// Run the dirty sweep (default: true)
  pub enabled: bool,
  /// Milliseconds between sweeps (default: 30000)
  pub interval_ms: u64,
  /// Dirty sections fetched per sweep (default: 10)
  pub batch_size: usize,
}

impl Default for DirtyWorkerConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      interval_ms: 30_000,
      batch_size: 10,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
  /// Watch the project tree (default: true)
  pub enabled: bool,
  /// Quiet period per path before an event is emitted (default: 300)
  pub debounce_ms: u64,
  /// Extra settle time for files still being written (default: 200)
  pub await_write_finish_ms: u64,
  /// Capacity of the change event queue (default: 1024)
  pub channel_capacity: usize,
}

impl Default for WatcherConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      debounce_ms: 300,
      await_write_finish_ms: 200,
      channel_capacity: 1024,
    }
  }
}

/// How the external engine process is launched and talked to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Program to spawn (default: "uv")
  pub command: String,
  /// Arguments passed to the program
  pub args: Vec<String>,
  /// Working directory for the process (default: project root)
  pub working_dir: Option<PathBuf>,
  /// Interval between liveness probes during startup (default: 1000)
  pub ready_poll_ms: u64,
  /// Maximum time to wait for the first successful probe (default: 60)
  pub ready_timeout_secs: u64,
  /// Timeout for a liveness probe (default: 5000)
  pub ping_timeout_ms: u64,
  /// Timeout for every other call (default: 30000)
  pub request_timeout_ms: u64,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      command: "uv".to_string(),
      args: vec!["run".to_string(), "python".to_string(), "worker.py".to_string()],
      working_dir: None,
      ready_poll_ms: 1000,
      ready_timeout_secs: 60,
      ping_timeout_ms: 5000,
      request_timeout_ms: 30_000,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
  /// Log level: error, warn, info, debug, trace (default: "info")
  pub log_level: String,
  /// Log rotation: daily, hourly, never (default: "daily")
  pub log_rotation: String,
}

impl Default for DaemonConfig {
  fn default() -> Self {
    Self {
      log_level: "info".to_string(),
      log_rotation: "daily".to_string(),
    }
  }
}

// ============================================================================
// Top-level Config
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub project: ProjectConfig,
  pub files: FilesConfig,
  pub indexing: IndexingConfig,
  pub search: SearchConfig,
  pub storage: StorageConfig,
  pub worker: WorkerConfig,
  pub dirty_worker: DirtyWorkerConfig,
  pub watcher: WatcherConfig,
  pub engine: EngineConfig,
  pub daemon: DaemonConfig,
}

impl Config {
  /// Load config for a project, falling back to the user config, then defaults.
  ///
  /// A config file that exists but cannot be parsed or fails validation is an error.
  pub fn load_for_project(project_path: &Path) -> Result<Self, ConfigError> {
    let project_config = Self::project_config_path(project_path);
    if project_config.exists() {
      return Self::load_file(&project_config);
    }

    if let Some(user_config_path) = Self::user_config_path()
      && user_config_path.exists()
    {
      return Self::load_file(&user_config_path);
    }

    Ok(Self::default())
  }

  /// Parse and validate a single config file.
  pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse(&content).map_err(|e| match e {
      ConfigError::Parse { source, .. } => ConfigError::Parse {
        path: path.to_path_buf(),
        source,
      },
      other => other,
    })
  }

  /// Parse and validate config text.
  pub fn parse(content: &str) -> Result<Self, ConfigError> {
    let config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
      path: PathBuf::new(),
      source,
    })?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if !(1..=3).contains(&self.indexing.max_depth) {
      return Err(ConfigError::Invalid(format!(
        "indexing.max_depth must be between 1 and 3, got {}",
        self.indexing.max_depth
      )));
    }
    if self.indexing.max_tokens_per_section == 0 {
      return Err(ConfigError::Invalid(
        "indexing.max_tokens_per_section must be greater than 0".into(),
      ));
    }
    if self.search.max_limit == 0 {
      return Err(ConfigError::Invalid("search.max_limit must be greater than 0".into()));
    }
    if self.search.default_limit > self.search.max_limit {
      return Err(ConfigError::Invalid(format!(
        "search.default_limit ({}) exceeds search.max_limit ({})",
        self.search.default_limit, self.search.max_limit
      )));
    }
    if self.worker.interval_ms == 0 || self.dirty_worker.interval_ms == 0 {
      return Err(ConfigError::Invalid("worker intervals must be greater than 0".into()));
    }
    if self.watcher.channel_capacity == 0 {
      return Err(ConfigError::Invalid("watcher.channel_capacity must be greater than 0".into()));
    }
    if self.files.include.is_empty() {
      return Err(ConfigError::Invalid("files.include must not be empty".into()));
    }
    for pattern in self.files.include.iter().chain(&self.files.exclude) {
      Glob::new(pattern).map_err(|e| ConfigError::Invalid(format!("bad glob '{pattern}': {e}")))?;
    }
    if self.engine.command.trim().is_empty() {
      return Err(ConfigError::Invalid("engine.command must not be empty".into()));
    }
    Ok(())
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    Some(crate::dirs::default_config_dir().join("config.toml"))
  }

  /// Get the project-relative config path
  pub fn project_config_path(project_path: &Path) -> PathBuf {
    project_path.join(PROJECT_CONFIG_FILE)
  }

  /// Resolve the project root against the directory the config was loaded for.
  pub fn resolve_root(&self, base: &Path) -> PathBuf {
    if self.project.root.is_absolute() {
      self.project.root.clone()
    } else {
      base.join(&self.project.root)
    }
  }

  /// Render this config as TOML.
  pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(self)
  }

  /// Generate a commented config template populated with defaults.
  pub fn generate_template() -> String {
    let body = Self::default().to_toml().unwrap_or_default();
    format!(
      r#"# searchdocs configuration
# Place in {PROJECT_CONFIG_FILE} (project) or ~/.config/searchdocs/config.toml (user)
#
# Every key is optional; omitted keys take the values shown here.

{body}"#
    )
  }
}
