//! IndexWorker - drains the index request queue
//!
//! Each sweep fetches every `pending` request, keeps only the newest one per
//! document path, and processes those in creation order. Older pending
//! requests for the same path are marked `skipped`, including ones created in
//! the same millisecond. A failure while processing one request is recorded
//! on that request and never stops the sweep.
//!
//! Every status change goes through [`IndexWorker::transition`], which
//! refuses moves the request lifecycle does not allow.
//!
//! # Recovery
//!
//! A request left in `processing` by a crashed process can never finish. On
//! start the worker marks such requests `failed` and queues a fresh `pending`
//! request for the same `(path, hash)`, so the state machine stays intact.

use std::{
  collections::HashMap,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
  domain::{BulkRequestFilter, IndexRequest, IndexRequestStatus, RequestFilter, RequestOrder, RequestUpdate},
  engine::IndexStore,
  service::{ServiceError, indexer::SectionIndexer},
  storage::DocumentStorage,
};

/// Error recorded on requests found in `processing` at startup.
pub const INTERRUPTED_ERROR: &str = "interrupted before completion";

/// What happened to one processed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
  /// New sections were stored.
  Indexed(usize),
  /// Sections for this hash already existed.
  AlreadyIndexed,
  /// The document changed again after the request was queued.
  Superseded,
}

/// Totals for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
  pub processed: usize,
  pub completed: usize,
  pub failed: usize,
  pub skipped: usize,
}

/// Resets a flag when dropped.
pub(crate) struct FlagGuard<'a>(pub(crate) &'a AtomicBool);

impl Drop for FlagGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::SeqCst);
  }
}

pub struct IndexWorker {
  store: Arc<dyn IndexStore>,
  storage: Arc<dyn DocumentStorage>,
  indexer: SectionIndexer,
  interval: Duration,
  sweeping: AtomicBool,
  running: AtomicBool,
}

impl IndexWorker {
  pub fn new(storage: Arc<dyn DocumentStorage>, indexer: SectionIndexer, interval: Duration) -> Self {
    Self {
      store: Arc::clone(indexer.store()),
      storage,
      indexer,
      interval,
      sweeping: AtomicBool::new(false),
      running: AtomicBool::new(false),
    }
  }

  /// Whether the worker loop is active.
  pub fn is_running(&self) -> bool {
    self.running.load(Ordering::SeqCst)
  }

  /// Run until cancelled: recover, then sweep immediately and on every tick.
  pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
    self.running.store(true, Ordering::SeqCst);
    let _running = FlagGuard(&self.running);
    info!(interval_ms = self.interval.as_millis() as u64, "IndexWorker started");

    if let Err(e) = self.recover().await {
      error!(error = %e, "Failed to recover interrupted requests");
    }

    // The first tick fires immediately
    let mut ticker = tokio::time::interval(self.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        biased;

        _ = cancel.cancelled() => {
          info!("IndexWorker shutting down (cancelled)");
          break;
        }

        _ = ticker.tick() => {
          let report = self.sweep().await;
          if report.processed > 0 || report.skipped > 0 {
            info!(
              processed = report.processed,
              completed = report.completed,
              failed = report.failed,
              skipped = report.skipped,
              "Index sweep finished"
            );
          }
        }
      }
    }
  }

  /// Fail requests stuck in `processing` and requeue their `(path, hash)`.
  pub async fn recover(&self) -> Result<usize, ServiceError> {
    let stuck = self
      .store
      .find_index_requests(&RequestFilter::with_status(IndexRequestStatus::Processing))
      .await?;

    for request in &stuck {
      let mut status = request.status;
      self
        .transition(&request.id, &mut status, RequestUpdate::failed(Utc::now(), INTERRUPTED_ERROR))
        .await?;
      let fresh = self
        .store
        .create_index_request(&request.document_path, &request.document_hash)
        .await?;
      warn!(
        path = %request.document_path,
        stale = %request.id,
        requeued = %fresh.id,
        "Requeued interrupted index request"
      );
    }
    Ok(stuck.len())
  }

  /// One pass over the pending queue. Overlapping calls return immediately.
  pub async fn sweep(&self) -> SweepReport {
    if self
      .sweeping
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      debug!("Index sweep already in progress");
      return SweepReport::default();
    }
    let _guard = FlagGuard(&self.sweeping);

    let filter = RequestFilter::with_status(IndexRequestStatus::Pending).order(RequestOrder::CreatedAsc);
    let pending = match self.store.find_index_requests(&filter).await {
      Ok(pending) => pending,
      Err(e) => {
        warn!(error = %e, "Failed to fetch pending requests");
        return SweepReport::default();
      }
    };

    let mut report = SweepReport::default();
    for (request, same_instant) in latest_per_path(pending) {
      report.processed += 1;
      let mut status = request.status;
      match self.process(&request, &same_instant, &mut status, &mut report).await {
        Ok(outcome) => {
          debug!(path = %request.document_path, request = %request.id, ?outcome, "Request completed");
          report.completed += 1;
        }
        Err(e) => {
          warn!(path = %request.document_path, request = %request.id, error = %e, "Request failed");
          report.failed += 1;
          let update = RequestUpdate::failed(Utc::now(), e.to_string());
          if let Err(e) = self.transition(&request.id, &mut status, update).await {
            error!(request = %request.id, status = %status, error = %e, "Failed to record request failure");
          }
        }
      }
    }
    report
  }

  /// Apply `update` to request `id`, currently in `*current`.
  ///
  /// Transitions outside `Pending -> Processing -> {Completed | Failed}` and
  /// `Pending -> Skipped` are refused before reaching the store.
  pub(crate) async fn transition(
    &self,
    id: &str,
    current: &mut IndexRequestStatus,
    update: RequestUpdate,
  ) -> Result<(), ServiceError> {
    if !update.allowed_from(*current) {
      return Err(ServiceError::InvalidTransition {
        id: id.to_string(),
        from: *current,
        to: update.status.unwrap_or(*current),
      });
    }
    self.store.update_index_request(id, &update).await?;
    if let Some(next) = update.status {
      *current = next;
    }
    Ok(())
  }

  /// Process one request through to `completed`. Errors leave it for the caller to fail.
  ///
  /// `same_instant` holds older pending requests for the path that share the
  /// request's creation time; the strict bulk cutoff cannot reach them.
  async fn process(
    &self,
    request: &IndexRequest,
    same_instant: &[IndexRequest],
    status: &mut IndexRequestStatus,
    report: &mut SweepReport,
  ) -> Result<RequestOutcome, ServiceError> {
    let path = request.document_path.as_str();

    self
      .transition(&request.id, status, RequestUpdate::processing(Utc::now()))
      .await?;

    let superseded = BulkRequestFilter {
      document_path: Some(path.to_string()),
      status: Some(IndexRequestStatus::Pending),
      created_before: Some(request.created_at),
      created_after: None,
    };
    let skipped = self
      .store
      .update_many_index_requests(&superseded, &RequestUpdate::skipped(Utc::now()))
      .await?;
    if skipped > 0 {
      debug!(path, skipped, "Skipped superseded requests");
      report.skipped += skipped;
    }
    for older in same_instant.iter().filter(|r| r.id != request.id) {
      let mut older_status = older.status;
      match self
        .transition(&older.id, &mut older_status, RequestUpdate::skipped(Utc::now()))
        .await
      {
        Ok(()) => report.skipped += 1,
        Err(e) => warn!(path, request = %older.id, error = %e, "Failed to skip superseded request"),
      }
    }

    let document = self
      .storage
      .get(path)
      .await?
      .ok_or_else(|| ServiceError::DocumentNotFound(path.to_string()))?;

    let outcome = if document.file_hash() != request.document_hash {
      debug!(path, queued = %request.document_hash, current = %document.file_hash(), "Document changed since request");
      RequestOutcome::Superseded
    } else if self.indexer.is_indexed(path, &request.document_hash).await? {
      self
        .store
        .delete_sections_by_path_except_hash(path, &request.document_hash)
        .await?;
      RequestOutcome::AlreadyIndexed
    } else {
      RequestOutcome::Indexed(self.indexer.reindex(&document, false).await?)
    };

    self
      .transition(&request.id, status, RequestUpdate::completed(Utc::now()))
      .await?;
    Ok(outcome)
  }
}

/// Newest request per path, in creation order, paired with the older requests
/// created at the same instant. Input must be sorted ascending.
fn latest_per_path(pending: Vec<IndexRequest>) -> Vec<(IndexRequest, Vec<IndexRequest>)> {
  let mut by_path: HashMap<String, Vec<IndexRequest>> = HashMap::new();
  for request in pending {
    by_path.entry(request.document_path.clone()).or_default().push(request);
  }
  let mut selected: Vec<(IndexRequest, Vec<IndexRequest>)> = by_path
    .into_values()
    .filter_map(|mut requests| {
      let latest = requests.pop()?;
      requests.retain(|r| r.created_at == latest.created_at);
      Some((latest, requests))
    })
    .collect();
  selected.sort_by(|a, b| a.0.created_at.cmp(&b.0.created_at).then_with(|| a.0.id.cmp(&b.0.id)));
  selected
}
