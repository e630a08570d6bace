//! WatcherTask - turns filesystem notifications into settled document events
//!
//! notify's callback runs on its own thread and forwards raw events into a
//! channel with `blocking_send`. The async task filters them through the
//! shared [`PathFilter`], debounces per path (every event restarts that
//! path's quiet period) and emits one [`FileEvent`] per path once it has been
//! quiet long enough.
//!
//! Settled events go out on a bounded channel. When the consumer falls
//! behind, `send` waits, so the watcher slows down instead of dropping events.
//!
//! # Lifecycle
//!
//! The watcher runs until:
//! - The `CancellationToken` is triggered
//! - The notify channel or the output channel closes

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  time::{Duration, Instant, SystemTime},
};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher, event::RenameMode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::message::{FileEvent, FileEventKind};
use crate::{context::PathFilter, domain::config::WatcherConfig};

/// Floor for the settle-check tick.
const MIN_TICK: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
  #[error("Failed to initialize watcher: {0}")]
  Init(#[source] notify::Error),

  #[error("Failed to watch path: {0}")]
  Watch(#[source] notify::Error),
}

// ============================================================================
// Debouncing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeKind {
  Created,
  Modified,
  Deleted,
}

#[derive(Debug)]
struct PendingChange {
  kind: ChangeKind,
  last_event: Instant,
}

impl PendingChange {
  fn new(kind: ChangeKind, now: Instant) -> Self {
    Self { kind, last_event: now }
  }

  /// Restart the quiet period and fold `kind` into the pending change.
  fn update(&mut self, kind: ChangeKind, now: Instant) {
    self.last_event = now;

    match (self.kind, kind) {
      // Create followed by modify is still a create
      (ChangeKind::Created, ChangeKind::Modified) => {
        trace!("Coalescing create+modify -> create");
      }
      // Delete followed by create is a modify
      (ChangeKind::Deleted, ChangeKind::Created) => {
        self.kind = ChangeKind::Modified;
        trace!("Coalescing delete+create -> modified");
      }
      _ => self.kind = kind,
    }
  }
}

/// Per-path debounce state.
struct Debouncer {
  filter: PathFilter,
  debounce: Duration,
  write_settle: Duration,
  pending: HashMap<String, PendingChange>,
}

impl Debouncer {
  fn new(filter: PathFilter, debounce: Duration, write_settle: Duration) -> Self {
    Self {
      filter,
      debounce,
      write_settle,
      pending: HashMap::new(),
    }
  }

  fn len(&self) -> usize {
    self.pending.len()
  }

  fn upsert(&mut self, path: &Path, kind: ChangeKind, now: Instant) {
    if path.is_dir() {
      trace!(path = %path.display(), "Skipping directory event");
      return;
    }
    let Some(doc_path) = self.filter.document_path(path) else {
      return;
    };

    match self.pending.get_mut(&doc_path) {
      Some(existing) => existing.update(kind, now),
      None => {
        self.pending.insert(doc_path, PendingChange::new(kind, now));
      }
    }
  }

  /// Fold one notify event into the pending set.
  fn record(&mut self, event: &Event, now: Instant) {
    if let EventKind::Modify(notify::event::ModifyKind::Name(RenameMode::Both)) = event.kind
      && let [from, to, ..] = event.paths.as_slice()
    {
      debug!(from = %from.display(), to = %to.display(), "File renamed");
      self.upsert(from, ChangeKind::Deleted, now);
      self.upsert(to, ChangeKind::Created, now);
      return;
    }

    for path in &event.paths {
      let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(notify::event::ModifyKind::Name(mode)) => match mode {
          RenameMode::From => ChangeKind::Deleted,
          RenameMode::To => ChangeKind::Created,
          // Only the filesystem knows which side of the rename this is
          _ if path.exists() => ChangeKind::Modified,
          _ => ChangeKind::Deleted,
        },
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Remove(_) => ChangeKind::Deleted,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => {
          trace!(path = %path.display(), kind = ?event.kind, "Ignoring event");
          continue;
        }
      };
      self.upsert(path, kind, now);
    }
  }

  /// Whether the file was written too recently to be read safely.
  fn still_writing(&self, path: &Path) -> bool {
    if self.write_settle.is_zero() {
      return false;
    }
    std::fs::metadata(path)
      .and_then(|m| m.modified())
      .ok()
      .and_then(|modified| SystemTime::now().duration_since(modified).ok())
      .is_some_and(|age| age < self.write_settle)
  }

  fn to_event(&self, doc_path: String, kind: ChangeKind) -> FileEvent {
    let exists = self.filter.root().join(&doc_path).is_file();
    let kind = match kind {
      _ if !exists => FileEventKind::Unlink,
      ChangeKind::Created => FileEventKind::Add,
      ChangeKind::Modified => FileEventKind::Change,
      ChangeKind::Deleted => FileEventKind::Change,
    };
    FileEvent::new(kind, doc_path)
  }

  /// Remove and return every path that has been quiet for the debounce period.
  fn take_settled(&mut self, now: Instant) -> Vec<FileEvent> {
    let mut settled: Vec<String> = self
      .pending
      .iter()
      .filter(|(_, change)| now.duration_since(change.last_event) >= self.debounce)
      .filter(|(path, change)| {
        change.kind == ChangeKind::Deleted || !self.still_writing(&self.filter.root().join(path.as_str()))
      })
      .map(|(path, _)| path.clone())
      .collect();
    settled.sort();

    let removed: Vec<(String, ChangeKind)> = settled
      .into_iter()
      .filter_map(|path| self.pending.remove(&path).map(|change| (path, change.kind)))
      .collect();
    removed
      .into_iter()
      .map(|(path, kind)| self.to_event(path, kind))
      .collect()
  }

  /// Everything still pending, for shutdown.
  fn drain(&mut self) -> Vec<FileEvent> {
    let mut all: Vec<(String, PendingChange)> = self.pending.drain().collect();
    all.sort_by(|a, b| a.0.cmp(&b.0));
    all
      .into_iter()
      .map(|(path, change)| self.to_event(path, change.kind))
      .collect()
  }
}

// ============================================================================
// WatcherTask
// ============================================================================

pub struct WatcherTask {
  root: PathBuf,
  debouncer: Debouncer,
  tick: Duration,
  events: mpsc::Sender<FileEvent>,
  cancel: CancellationToken,
  // The notify watcher must be held to keep it alive
  _watcher: RecommendedWatcher,
  raw_rx: mpsc::Receiver<Result<Event, notify::Error>>,
}

impl WatcherTask {
  /// Start watching `filter.root()` recursively. Events flow once `run()` is polled.
  pub fn new(
    filter: PathFilter,
    config: &WatcherConfig,
    events: mpsc::Sender<FileEvent>,
    cancel: CancellationToken,
  ) -> Result<Self, WatcherError> {
    let root = filter.root().to_path_buf();
    info!(root = %root.display(), "Initializing file watcher");

    let (raw_tx, raw_rx) = mpsc::channel::<Result<Event, notify::Error>>(256);
    let mut watcher = RecommendedWatcher::new(
      move |res| {
        // Runs on notify's thread; fails only once the task is gone
        let _ = raw_tx.blocking_send(res);
      },
      Config::default(),
    )
    .map_err(WatcherError::Init)?;

    watcher
      .watch(&root, RecursiveMode::Recursive)
      .map_err(WatcherError::Watch)?;

    let debounce = Duration::from_millis(config.debounce_ms);
    let write_settle = Duration::from_millis(config.await_write_finish_ms);

    Ok(Self {
      root,
      debouncer: Debouncer::new(filter, debounce, write_settle),
      tick: (debounce / 2).max(MIN_TICK),
      events,
      cancel,
      _watcher: watcher,
      raw_rx,
    })
  }

  pub fn spawn(
    filter: PathFilter,
    config: &WatcherConfig,
    events: mpsc::Sender<FileEvent>,
    cancel: CancellationToken,
  ) -> Result<tokio::task::JoinHandle<()>, WatcherError> {
    let task = Self::new(filter, config, events, cancel)?;
    Ok(tokio::spawn(task.run()))
  }

  pub async fn run(mut self) {
    info!(root = %self.root.display(), "WatcherTask started");

    let mut ticker = tokio::time::interval(self.tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        biased;

        _ = self.cancel.cancelled() => {
          info!("WatcherTask shutting down (cancelled)");
          break;
        }

        event = self.raw_rx.recv() => {
          match event {
            Some(Ok(event)) => self.debouncer.record(&event, Instant::now()),
            Some(Err(e)) => warn!(error = %e, "Watcher error"),
            None => {
              info!("WatcherTask shutting down (notify channel closed)");
              break;
            }
          }
        }

        _ = ticker.tick() => {
          let settled = self.debouncer.take_settled(Instant::now());
          if !self.emit(settled).await {
            info!("WatcherTask shutting down (consumer gone)");
            break;
          }
        }
      }
    }

    if self.debouncer.len() > 0 {
      debug!(pending = self.debouncer.len(), "Flushing remaining pending events on shutdown");
      let remaining = self.debouncer.drain();
      self.emit(remaining).await;
    }

    info!(root = %self.root.display(), "WatcherTask stopped");
  }

  /// Returns false once the consumer has gone away.
  async fn emit(&self, events: Vec<FileEvent>) -> bool {
    for event in events {
      debug!(path = %event.path, kind = %event.kind, "File event settled");
      if self.events.send(event).await.is_err() {
        return false;
      }
    }
    true
  }
}
