//! Handles for the daemon's long-running tasks.
//!
//! Every task gets a child of one master `CancellationToken`. Shutdown
//! cancels the token and waits for the tasks, bounded by a timeout.

use std::{future::Future, time::Duration};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct NamedTask {
  name: &'static str,
  handle: JoinHandle<()>,
}

pub struct TaskGroup {
  cancel: CancellationToken,
  tasks: Vec<NamedTask>,
}

impl TaskGroup {
  pub fn new(cancel: CancellationToken) -> Self {
    Self {
      cancel,
      tasks: Vec::new(),
    }
  }

  /// Token for a new task. Cancelled together with the group.
  pub fn token(&self) -> CancellationToken {
    self.cancel.child_token()
  }

  pub fn spawn<F>(&mut self, name: &'static str, task: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    debug!(task = name, "Spawning task");
    self.tasks.push(NamedTask {
      name,
      handle: tokio::spawn(task),
    });
  }

  /// Adopt a task spawned elsewhere.
  pub fn adopt(&mut self, name: &'static str, handle: JoinHandle<()>) {
    self.tasks.push(NamedTask { name, handle });
  }

  pub fn len(&self) -> usize {
    self.tasks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks.is_empty()
  }

  /// Cancel every task and wait up to `timeout` for each to finish.
  pub async fn shutdown(self, timeout: Duration) {
    self.cancel.cancel();
    for task in self.tasks {
      let abort = task.handle.abort_handle();
      match tokio::time::timeout(timeout, task.handle).await {
        Ok(Ok(())) => debug!(task = task.name, "Task stopped"),
        Ok(Err(e)) => warn!(task = task.name, error = %e, "Task panicked or was aborted"),
        Err(_) => {
          warn!(task = task.name, "Task did not stop in time, aborting");
          abort.abort();
        }
      }
    }
  }
}
