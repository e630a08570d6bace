//! DirtyWorker - forced reindex of documents with dirty sections
//!
//! Sections flagged dirty (for example after an embedding model change) are
//! re-embedded by reindexing their whole document, regardless of hash.

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::index_worker::FlagGuard;
use crate::{
  engine::IndexStore,
  service::{ServiceError, sync::SyncService},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyReport {
  pub documents: usize,
  pub sections_created: usize,
  /// Documents whose sections were dropped because the file is gone or unreadable
  pub removed: usize,
  pub failed: usize,
}

pub struct DirtyWorker {
  store: Arc<dyn IndexStore>,
  sync: Arc<SyncService>,
  interval: Duration,
  batch_size: usize,
  sweeping: AtomicBool,
}

impl DirtyWorker {
  pub fn new(store: Arc<dyn IndexStore>, sync: Arc<SyncService>, interval: Duration, batch_size: usize) -> Self {
    Self {
      store,
      sync,
      interval,
      batch_size,
      sweeping: AtomicBool::new(false),
    }
  }

  pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
    info!(interval_ms = self.interval.as_millis() as u64, batch = self.batch_size, "DirtyWorker started");

    let mut ticker = tokio::time::interval(self.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        biased;

        _ = cancel.cancelled() => {
          info!("DirtyWorker shutting down (cancelled)");
          break;
        }

        _ = ticker.tick() => {
          let report = self.sweep().await;
          if report.documents > 0 {
            info!(
              documents = report.documents,
              sections = report.sections_created,
              removed = report.removed,
              failed = report.failed,
              "Dirty sweep finished"
            );
          }
        }
      }
    }
  }

  /// Reindex every document owning one of the next `batch_size` dirty sections.
  pub async fn sweep(&self) -> DirtyReport {
    if self
      .sweeping
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      debug!("Dirty sweep already in progress");
      return DirtyReport::default();
    }
    let _guard = FlagGuard(&self.sweeping);

    let dirty = match self.store.get_dirty_sections(self.batch_size).await {
      Ok(dirty) => dirty,
      Err(e) => {
        warn!(error = %e, "Failed to fetch dirty sections");
        return DirtyReport::default();
      }
    };

    let mut paths: Vec<String> = Vec::new();
    for section in dirty {
      if !paths.contains(&section.document_path) {
        paths.push(section.document_path);
      }
    }

    let mut report = DirtyReport::default();
    for path in paths {
      report.documents += 1;
      match self.sync.index_document(&path, true).await {
        Ok(outcome) => report.sections_created += outcome.sections_created,
        Err(ServiceError::Read { source, .. }) => {
          // Unreadable documents must leave the dirty set or they fill every batch.
          if let Err(e) = self.drop_unreadable(&path, &source).await {
            warn!(path = %path, error = %e, "Failed to drop sections of unreadable document");
            report.failed += 1;
          } else {
            report.removed += 1;
          }
        }
        Err(e) => {
          warn!(path = %path, error = %e, "Failed to reindex dirty document");
          report.failed += 1;
        }
      }
    }
    report
  }

  /// A missing file is removed entirely; any other read failure only drops its sections.
  async fn drop_unreadable(&self, path: &str, source: &std::io::Error) -> Result<(), ServiceError> {
    if source.kind() == std::io::ErrorKind::NotFound {
      info!(path, "Dirty document no longer exists, removing");
      self.sync.remove_document(path).await
    } else {
      warn!(path, error = %source, "Dirty document unreadable, dropping its sections");
      self.store.delete_sections_by_path(path).await?;
      Ok(())
    }
  }
}
