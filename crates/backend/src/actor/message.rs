//! Messages passed between the watcher and its consumer.

use std::fmt;

/// What happened to a document on disk, after debouncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileEventKind {
  Add,
  Change,
  Unlink,
}

impl FileEventKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Add => "add",
      Self::Change => "change",
      Self::Unlink => "unlink",
    }
  }
}

impl fmt::Display for FileEventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A settled change to one tracked document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
  pub kind: FileEventKind,
  /// Root-relative document path
  pub path: String,
}

impl FileEvent {
  pub fn new(kind: FileEventKind, path: impl Into<String>) -> Self {
    Self {
      kind,
      path: path.into(),
    }
  }
}
