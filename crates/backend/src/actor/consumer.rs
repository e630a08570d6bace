//! Applies settled watcher events, one at a time.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::message::FileEvent;
use crate::service::sync::SyncService;

/// Drain `events` into the sync service until cancelled or the watcher stops.
pub async fn consume_events(sync: Arc<SyncService>, mut events: mpsc::Receiver<FileEvent>, cancel: CancellationToken) {
  info!("Event consumer started");
  loop {
    tokio::select! {
      biased;

      _ = cancel.cancelled() => {
        info!("Event consumer shutting down (cancelled)");
        break;
      }

      event = events.recv() => {
        let Some(event) = event else {
          info!("Event consumer shutting down (watcher gone)");
          break;
        };
        if let Err(e) = sync.handle_event(&event).await {
          warn!(path = %event.path, kind = %event.kind, error = %e, "Failed to handle file event");
        }
      }
    }
  }
}
