//! Long-running tasks of the daemon
//!
//! - [`WatcherTask`]: debounces filesystem events into [`FileEvent`]s
//! - [`consume_events`]: turns those events into index requests
//! - [`IndexWorker`]: drains the request queue on an interval
//! - [`DirtyWorker`]: reindexes documents with sections flagged dirty
//!
//! ```text
//! WatcherTask ──(bounded mpsc)──▶ consume_events ──▶ request queue ──▶ IndexWorker
//! ```

mod consumer;
mod dirty_worker;
pub mod handle;
mod index_worker;
pub mod message;
mod watcher;

#[cfg(test)]
mod __tests__;

pub use consumer::consume_events;
pub use dirty_worker::{DirtyReport, DirtyWorker};
pub use handle::TaskGroup;
pub use index_worker::{INTERRUPTED_ERROR, IndexWorker, RequestOutcome, SweepReport};
pub use message::{FileEvent, FileEventKind};
pub use watcher::{WatcherError, WatcherTask};
