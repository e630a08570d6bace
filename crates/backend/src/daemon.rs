//! Daemon lifecycle: wiring the engine, services and background tasks.
//!
//! # Architecture
//!
//! ```text
//! Daemon (Supervisor)
//!   ├── WatcherTask ──mpsc──> event consumer ──> SyncService
//!   ├── IndexWorker (pending index requests)
//!   ├── DirtyWorker (dirty sections)
//!   └── startup sync (one-shot)
//! ```
//!
//! # Lifecycle
//!
//! 1. Load config and open the [`App`] (engine connected, model initialised)
//! 2. Create master `CancellationToken`
//! 3. Spawn watcher, consumer, workers and the startup sync as a [`TaskGroup`]
//! 4. Run until ctrl-c
//! 5. Graceful shutdown: cancel children, wait for tasks, disconnect the engine

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use tokio::{signal, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
  actor::{DirtyWorker, IndexWorker, TaskGroup, WatcherError, WatcherTask, consume_events},
  context::{DiscoveryError, FileDiscovery, MarkdownSplitter, PathFilter, SplitterConfig},
  domain::config::{Config, ConfigError},
  engine::{ChannelOptions, EngineChannel, EngineError, IndexStore},
  service::{SearchService, SectionIndexer, ServiceError, StatusReport, SyncService},
  storage::{DocumentStorage, FileStorage},
};

/// How long each task gets to stop before it is aborted.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
  #[error("Project root {path} is not accessible: {source}")]
  Root {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error(transparent)]
  Discovery(#[from] DiscoveryError),
  #[error(transparent)]
  Engine(#[from] EngineError),
  #[error(transparent)]
  Service(#[from] ServiceError),
  #[error(transparent)]
  Watcher(#[from] WatcherError),
}

// ============================================================================
// Configuration
// ============================================================================

/// Daemon runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
  /// Canonical project root
  pub root: PathBuf,
  /// Run attached to a terminal
  pub foreground: bool,
  pub config: Config,
}

impl RuntimeConfig {
  /// Load the config that applies to `project_path` and resolve its root.
  pub fn load(project_path: &Path) -> Result<Self, DaemonError> {
    let config = Config::load_for_project(project_path)?;
    let root = config.resolve_root(project_path);
    let root = root.canonicalize().map_err(|source| DaemonError::Root { path: root, source })?;

    Ok(Self {
      root,
      foreground: false,
      config,
    })
  }
}

// ============================================================================
// App
// ============================================================================

/// Fully wired services for one project, backed by a live engine.
pub struct App {
  config: Config,
  filter: PathFilter,
  engine: Arc<EngineChannel>,
  storage: Arc<dyn DocumentStorage>,
  indexer: SectionIndexer,
  sync: Arc<SyncService>,
  search: Arc<SearchService>,
}

impl App {
  /// Connect the engine, load the embedding model and build the services.
  pub async fn open(runtime: &RuntimeConfig) -> Result<Self, DaemonError> {
    let config = runtime.config.clone();
    let root = runtime.root.as_path();

    let discovery = FileDiscovery::new(root, &config.files)?;
    let filter = discovery.filter().clone();

    let storage: Arc<dyn DocumentStorage> = Arc::new(FileStorage::new(root.join(&config.storage.documents_path)));

    let options = ChannelOptions::from_config(
      &config.engine,
      &config.indexing,
      &root.join(&config.storage.index_path),
      root,
    );
    let engine = Arc::new(EngineChannel::new(options));
    engine.connect().await?;
    let model = match engine.init_model().await {
      Ok(model) => model,
      Err(e) => {
        engine.disconnect().await;
        return Err(e.into());
      }
    };
    info!(
      model = model.model_name.as_deref().unwrap_or(&config.indexing.embedding_model),
      dimension = model.dimension.unwrap_or(config.indexing.vector_dimension),
      "Engine ready"
    );

    let store: Arc<dyn IndexStore> = engine.clone();
    let indexer = SectionIndexer::new(
      Arc::clone(&store),
      MarkdownSplitter::new(SplitterConfig::from(&config.indexing)),
    );
    let sync = Arc::new(SyncService::new(discovery, Arc::clone(&storage), indexer.clone()));
    let search = Arc::new(SearchService::new(store, Arc::clone(&storage), config.search.clone()));

    Ok(Self {
      config,
      filter,
      engine,
      storage,
      indexer,
      sync,
      search,
    })
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn sync(&self) -> &Arc<SyncService> {
    &self.sync
  }

  pub fn search(&self) -> &Arc<SearchService> {
    &self.search
  }

  pub fn engine(&self) -> &Arc<EngineChannel> {
    &self.engine
  }

  /// Status as seen from a process that runs no worker.
  pub async fn status(&self) -> Result<StatusReport, ServiceError> {
    self.sync.status(false).await
  }

  pub async fn close(&self) {
    self.engine.disconnect().await;
  }
}

// ============================================================================
// Daemon
// ============================================================================

/// Supervises the watcher, workers and startup sync for one project.
pub struct Daemon {
  runtime_config: RuntimeConfig,
}

impl Daemon {
  pub fn new(runtime_config: RuntimeConfig) -> Self {
    Self { runtime_config }
  }

  /// Run until ctrl-c.
  pub async fn run(self) -> Result<(), DaemonError> {
    let cancel = CancellationToken::new();

    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
      if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        return;
      }
      info!("Received ctrl-c, shutting down...");
      cancel_for_signal.cancel();
    });

    self.run_until(cancel).await
  }

  /// Run until `cancel` fires.
  pub async fn run_until(self, cancel: CancellationToken) -> Result<(), DaemonError> {
    info!(
      root = %self.runtime_config.root.display(),
      foreground = self.runtime_config.foreground,
      "Starting searchdocs daemon"
    );

    let app = App::open(&self.runtime_config).await?;
    let tasks = match Self::spawn_tasks(&app, cancel.clone()) {
      Ok(tasks) => tasks,
      Err(e) => {
        app.close().await;
        return Err(e);
      }
    };
    info!(tasks = tasks.len(), "Daemon running");

    cancel.cancelled().await;

    info!("Shutting down...");
    tasks.shutdown(SHUTDOWN_TIMEOUT).await;
    app.close().await;

    info!("Daemon shutdown complete");
    Ok(())
  }

  fn spawn_tasks(app: &App, cancel: CancellationToken) -> Result<TaskGroup, DaemonError> {
    let config = &app.config;
    let mut tasks = TaskGroup::new(cancel);

    if config.watcher.enabled {
      let (tx, rx) = mpsc::channel(config.watcher.channel_capacity);
      let watcher = WatcherTask::spawn(app.filter.clone(), &config.watcher, tx, tasks.token())?;
      tasks.adopt("watcher", watcher);
      tasks.spawn("event-consumer", consume_events(Arc::clone(&app.sync), rx, tasks.token()));
    } else {
      info!("File watcher disabled");
    }

    if config.worker.enabled {
      let worker = Arc::new(IndexWorker::new(
        Arc::clone(&app.storage),
        app.indexer.clone(),
        Duration::from_millis(config.worker.interval_ms),
      ));
      tasks.spawn("index-worker", worker.run(tasks.token()));
    } else {
      info!("Index worker disabled");
    }

    if config.dirty_worker.enabled {
      let dirty = Arc::new(DirtyWorker::new(
        Arc::clone(app.indexer.store()),
        Arc::clone(&app.sync),
        Duration::from_millis(config.dirty_worker.interval_ms),
        config.dirty_worker.batch_size,
      ));
      tasks.spawn("dirty-worker", dirty.run(tasks.token()));
    } else {
      info!("Dirty worker disabled");
    }

    let sync = Arc::clone(&app.sync);
    let cancel = tasks.token();
    tasks.spawn("startup-sync", async move {
      tokio::select! {
        _ = cancel.cancelled() => debug!("Startup sync cancelled"),
        result = sync.startup_sync() => match result {
          Ok(report) => info!(
            queued = report.queued,
            removed = report.removed,
            unchanged = report.unchanged,
            failed = report.failed,
            "Startup sync finished"
          ),
          Err(e) => warn!(error = %e, "Startup sync failed"),
        },
      }
    });

    Ok(tasks)
  }
}
