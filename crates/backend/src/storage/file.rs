use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use tracing::{debug, trace};
use walkdir::WalkDir;

use super::{DocumentStorage, Result, StorageError};
use crate::domain::{Document, content_hash};

const RECORD_EXTENSION: &str = ".json";
const TEMP_EXTENSION: &str = ".tmp";

/// Stores each document as `<base>/<path>.json`.
#[derive(Debug, Clone)]
pub struct FileStorage {
  base: PathBuf,
}

impl FileStorage {
  pub fn new(base: impl Into<PathBuf>) -> Self {
    Self { base: base.into() }
  }

  pub fn base(&self) -> &Path {
    &self.base
  }

  fn record_path(&self, path: &str) -> Result<PathBuf> {
    let rel = Path::new(path);
    let safe = !path.is_empty() && rel.components().all(|c| matches!(c, Component::Normal(_)));
    if !safe {
      return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(self.base.join(format!("{path}{RECORD_EXTENSION}")))
  }

  /// Sibling of `record_path` that `list` never reports.
  fn temp_path(record_path: &Path) -> PathBuf {
    let name = record_path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    record_path.with_file_name(format!(".{name}.{}{TEMP_EXTENSION}", uuid::Uuid::new_v4().simple()))
  }

  fn io_error(path: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
      path: path.to_string(),
      source,
    }
  }
}

#[async_trait::async_trait]
impl DocumentStorage for FileStorage {
  #[tracing::instrument(level = "trace", skip(self, document))]
  async fn save(&self, path: &str, document: &Document) -> Result<()> {
    let record_path = self.record_path(path)?;
    if let Some(parent) = record_path.parent() {
      tokio::fs::create_dir_all(parent).await.map_err(Self::io_error(path))?;
    }

    let mut stored = document.clone();
    stored.path = path.to_string();
    stored.metadata.file_hash = content_hash(&stored.content);
    stored.metadata.updated_at = Utc::now();

    let json = serde_json::to_vec_pretty(&stored).map_err(|source| StorageError::Corrupt {
      path: path.to_string(),
      source,
    })?;

    // Readers see either the previous record or the new one, never a partial write
    let temp_path = Self::temp_path(&record_path);
    tokio::fs::write(&temp_path, json).await.map_err(Self::io_error(path))?;
    if let Err(e) = tokio::fs::rename(&temp_path, &record_path).await {
      let _ = tokio::fs::remove_file(&temp_path).await;
      return Err(Self::io_error(path)(e));
    }
    debug!(path, hash = %stored.metadata.file_hash, "Saved document");
    Ok(())
  }

  #[tracing::instrument(level = "trace", skip(self))]
  async fn get(&self, path: &str) -> Result<Option<Document>> {
    let record_path = self.record_path(path)?;
    let bytes = match tokio::fs::read(&record_path).await {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(Self::io_error(path)(e)),
    };
    let document = serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
      path: path.to_string(),
      source,
    })?;
    Ok(Some(document))
  }

  #[tracing::instrument(level = "trace", skip(self))]
  async fn delete(&self, path: &str) -> Result<()> {
    let record_path = self.record_path(path)?;
    match tokio::fs::remove_file(&record_path).await {
      Ok(()) => {
        debug!(path, "Deleted document");
        Ok(())
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(Self::io_error(path)(e)),
    }
  }

  async fn list(&self) -> Result<Vec<String>> {
    let base = self.base.clone();
    let paths = tokio::task::spawn_blocking(move || {
      if !base.exists() {
        return Vec::new();
      }
      let mut paths: Vec<String> = WalkDir::new(&base)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
          let rel = entry.path().strip_prefix(&base).ok()?;
          let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
          rel.strip_suffix(RECORD_EXTENSION).map(str::to_string)
        })
        .collect();
      paths.sort();
      paths
    })
    .await
    .map_err(|e| StorageError::Io {
      path: self.base.display().to_string(),
      source: std::io::Error::other(e),
    })?;

    trace!(count = paths.len(), "Listed documents");
    Ok(paths)
  }

  async fn exists(&self, path: &str) -> Result<bool> {
    let record_path = self.record_path(path)?;
    tokio::fs::try_exists(&record_path).await.map_err(Self::io_error(path))
  }
}
