//! Persistent storage of raw document bodies.

mod file;

pub use file::FileStorage;

use crate::domain::Document;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
  #[error("IO error for {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("Corrupt document record {path}: {source}")]
  Corrupt {
    path: String,
    #[source]
    source: serde_json::Error,
  },
  #[error("Invalid document path: {0}")]
  InvalidPath(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Contract for the document body store.
///
/// Paths are root-relative document paths such as `docs/guide.md`.
#[async_trait::async_trait]
pub trait DocumentStorage: Send + Sync {
  /// Persist a document, recomputing its content hash.
  async fn save(&self, path: &str, document: &Document) -> Result<()>;

  async fn get(&self, path: &str) -> Result<Option<Document>>;

  /// Remove a document. Removing a missing document is not an error.
  async fn delete(&self, path: &str) -> Result<()>;

  async fn list(&self) -> Result<Vec<String>>;

  async fn exists(&self, path: &str) -> Result<bool>;
}
