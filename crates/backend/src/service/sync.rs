//! Keeping stored documents and the request queue in step with the disk.

use std::{
  collections::HashSet,
  path::{Path, PathBuf},
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Instant,
};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{
  error::{Result, ServiceError},
  indexer::SectionIndexer,
};
use crate::{
  actor::message::{FileEvent, FileEventKind},
  context::{FileDiscovery, relative_path},
  domain::{Document, IndexRequestStatus, RequestFilter, content_hash},
  engine::{EngineStats, IndexStore},
  storage::DocumentStorage,
};

/// Upper bound on requests fetched when counting the queue.
const STATUS_SCAN_LIMIT: usize = 100_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexOutcome {
  pub sections_created: usize,
  /// True when the document was already indexed at this hash.
  pub unchanged: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
  pub documents_processed: usize,
  pub sections_created: usize,
  pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
  pub queued: usize,
  pub removed: usize,
  pub unchanged: usize,
  pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCounts {
  pub pending: usize,
  pub processing: usize,
  pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
  pub running: bool,
  pub syncing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
  pub version: String,
  pub uptime_secs: u64,
  pub pid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
  pub server: ServerInfo,
  pub index: EngineStats,
  pub requests: RequestCounts,
  pub worker: WorkerStatus,
}

/// Clears the syncing flag when a sync ends, however it ends.
struct SyncGuard<'a>(&'a AtomicBool);

impl Drop for SyncGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::SeqCst);
  }
}

pub struct SyncService {
  discovery: FileDiscovery,
  storage: Arc<dyn DocumentStorage>,
  indexer: SectionIndexer,
  syncing: AtomicBool,
  started_at: Instant,
}

impl SyncService {
  pub fn new(discovery: FileDiscovery, storage: Arc<dyn DocumentStorage>, indexer: SectionIndexer) -> Self {
    Self {
      discovery,
      storage,
      indexer,
      syncing: AtomicBool::new(false),
      started_at: Instant::now(),
    }
  }

  pub fn root(&self) -> &Path {
    self.discovery.root()
  }

  fn store(&self) -> &Arc<dyn IndexStore> {
    self.indexer.store()
  }

  pub fn is_syncing(&self) -> bool {
    self.syncing.load(Ordering::SeqCst)
  }

  /// Root-relative document path for user input, absolute or relative.
  pub fn document_path(&self, input: &str) -> Result<String> {
    let path = Path::new(input);
    if path.is_absolute() {
      let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
      return relative_path(self.root(), &canonical)
        .ok_or_else(|| ServiceError::validation(format!("{input} is outside {}", self.root().display())));
    }
    let normalized = input.trim_start_matches("./").replace('\\', "/");
    if normalized.is_empty() {
      return Err(ServiceError::validation("empty document path"));
    }
    Ok(normalized)
  }

  async fn read(&self, document_path: &str) -> Result<String> {
    let full: PathBuf = self.discovery.resolve(document_path);
    tokio::fs::read_to_string(&full)
      .await
      .map_err(|source| ServiceError::Read { path: full, source })
  }

  /// Save the current content, keeping the original creation time.
  async fn save(&self, document_path: &str, content: String) -> Result<Document> {
    let mut document = Document::new(document_path, content);
    if let Some(existing) = self.storage.get(document_path).await? {
      document.metadata.created_at = existing.metadata.created_at;
    }
    self.storage.save(document_path, &document).await?;
    Ok(document)
  }

  /// Remove a document's sections and its stored body.
  pub async fn remove_document(&self, document_path: &str) -> Result<()> {
    self.store().delete_sections_by_path(document_path).await?;
    self.storage.delete(document_path).await?;
    info!(path = document_path, "Removed document");
    Ok(())
  }

  /// Apply one watcher event.
  ///
  /// Adds and changes queue an index request; removals act immediately.
  #[tracing::instrument(level = "trace", skip(self))]
  pub async fn handle_event(&self, event: &FileEvent) -> Result<()> {
    match event.kind {
      FileEventKind::Add | FileEventKind::Change => {
        let content = self.read(&event.path).await?;
        let document = self.save(&event.path, content).await?;
        let request = self
          .store()
          .create_index_request(&event.path, document.file_hash())
          .await?;
        info!(path = %event.path, kind = %event.kind, request = %request.id, "Queued index request");
      }
      FileEventKind::Unlink => self.remove_document(&event.path).await?,
    }
    Ok(())
  }

  /// Index one document right away, bypassing the request queue.
  #[tracing::instrument(level = "trace", skip(self))]
  pub async fn index_document(&self, document_path: &str, force: bool) -> Result<IndexOutcome> {
    let content = self.read(document_path).await?;
    let hash = content_hash(&content);

    if !force
      && let Some(existing) = self.storage.get(document_path).await?
      && existing.file_hash() == hash
      && self.indexer.is_indexed(document_path, &hash).await?
    {
      debug!(path = document_path, "Document unchanged, skipping");
      return Ok(IndexOutcome {
        sections_created: 0,
        unchanged: true,
      });
    }

    let document = self.save(document_path, content).await?;
    let sections_created = self.indexer.reindex(&document, force).await?;
    Ok(IndexOutcome {
      sections_created,
      unchanged: false,
    })
  }

  /// Force-index every discovered document, or just `paths`.
  pub async fn rebuild_index(&self, paths: Option<Vec<String>>) -> Result<RebuildReport> {
    let targets = match paths {
      Some(paths) if !paths.is_empty() => paths,
      _ => self.discover().await?,
    };
    info!(count = targets.len(), "Rebuilding index");

    let mut report = RebuildReport::default();
    for path in targets {
      match self.index_document(&path, true).await {
        Ok(outcome) => {
          report.documents_processed += 1;
          report.sections_created += outcome.sections_created;
        }
        Err(e) => {
          warn!(path = %path, error = %e, "Failed to index document");
          report.failed += 1;
        }
      }
    }

    info!(
      documents = report.documents_processed,
      sections = report.sections_created,
      failed = report.failed,
      "Rebuild finished"
    );
    Ok(report)
  }

  async fn discover(&self) -> Result<Vec<String>> {
    let discovery = self.discovery.clone();
    tokio::task::spawn_blocking(move || discovery.find_files())
      .await
      .map_err(|e| ServiceError::Internal(format!("discovery task failed: {e}")))?
      .map_err(ServiceError::from)
  }

  /// Reconcile storage with the files on disk.
  ///
  /// New and changed files are saved and queued; stored documents whose file
  /// is gone are removed.
  pub async fn startup_sync(&self) -> Result<SyncReport> {
    if self.syncing.swap(true, Ordering::SeqCst) {
      debug!("Startup sync already running");
      return Ok(SyncReport::default());
    }
    let _guard = SyncGuard(&self.syncing);
    info!(root = %self.root().display(), "Startup sync started");

    let discovered = self.discover().await?;
    let stored = self.storage.list().await?;
    let on_disk: HashSet<&str> = discovered.iter().map(String::as_str).collect();

    let mut report = SyncReport::default();
    for path in &discovered {
      match self.sync_one(path).await {
        Ok(true) => report.queued += 1,
        Ok(false) => report.unchanged += 1,
        Err(e) => {
          warn!(path = %path, error = %e, "Failed to sync document");
          report.failed += 1;
        }
      }
    }

    for path in stored.iter().filter(|p| !on_disk.contains(p.as_str())) {
      match self.remove_document(path).await {
        Ok(()) => report.removed += 1,
        Err(e) => {
          warn!(path = %path, error = %e, "Failed to remove vanished document");
          report.failed += 1;
        }
      }
    }

    info!(
      queued = report.queued,
      removed = report.removed,
      unchanged = report.unchanged,
      failed = report.failed,
      "Startup sync finished"
    );
    Ok(report)
  }

  /// Returns true when a request was queued.
  async fn sync_one(&self, path: &str) -> Result<bool> {
    let content = self.read(path).await?;
    let hash = content_hash(&content);
    if let Some(existing) = self.storage.get(path).await?
      && existing.file_hash() == hash
      && self.indexer.is_indexed(path, &hash).await?
    {
      return Ok(false);
    }

    self.save(path, content).await?;
    self.store().create_index_request(path, &hash).await?;
    debug!(path, hash = %hash, "Queued index request during sync");
    Ok(true)
  }

  pub async fn get_document(&self, document_path: &str) -> Result<Document> {
    self
      .storage
      .get(document_path)
      .await?
      .ok_or_else(|| ServiceError::DocumentNotFound(document_path.to_string()))
  }

  pub async fn status(&self, worker_running: bool) -> Result<StatusReport> {
    let index = self.store().get_stats().await?;

    let filter = RequestFilter {
      statuses: vec![
        IndexRequestStatus::Pending,
        IndexRequestStatus::Processing,
        IndexRequestStatus::Failed,
      ],
      limit: Some(STATUS_SCAN_LIMIT),
      ..Default::default()
    };
    let mut requests = RequestCounts::default();
    for request in self.store().find_index_requests(&filter).await? {
      match request.status {
        IndexRequestStatus::Pending => requests.pending += 1,
        IndexRequestStatus::Processing => requests.processing += 1,
        IndexRequestStatus::Failed => requests.failed += 1,
        _ => {}
      }
    }

    Ok(StatusReport {
      server: ServerInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: self.started_at.elapsed().as_secs(),
        pid: std::process::id(),
      },
      index,
      requests,
      worker: WorkerStatus {
        running: worker_running,
        syncing: self.is_syncing(),
      },
    })
  }
}
