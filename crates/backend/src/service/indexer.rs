//! Split-and-store path shared by the index worker, dirty worker and manual indexing.

use std::sync::Arc;

use tracing::debug;

use super::error::Result;
use crate::{context::MarkdownSplitter, domain::Document, engine::IndexStore};

/// Replaces the indexed sections of a document.
#[derive(Clone)]
pub struct SectionIndexer {
  store: Arc<dyn IndexStore>,
  splitter: MarkdownSplitter,
}

impl SectionIndexer {
  pub fn new(store: Arc<dyn IndexStore>, splitter: MarkdownSplitter) -> Self {
    Self { store, splitter }
  }

  pub fn store(&self) -> &Arc<dyn IndexStore> {
    &self.store
  }

  /// Index `document` at its current hash.
  ///
  /// New sections are stored before any old ones are dropped, so the
  /// document never has zero sections in between. When `replace_same_hash`
  /// is set, sections already stored under the current hash are remembered
  /// by id and removed once the new ones are in.
  #[tracing::instrument(level = "trace", skip(self, document), fields(path = %document.path))]
  pub async fn reindex(&self, document: &Document, replace_same_hash: bool) -> Result<usize> {
    let hash = document.file_hash();
    let sections = self.splitter.split(&document.content, &document.path, hash)?;

    let replaced: Vec<String> = if replace_same_hash {
      self
        .store
        .find_sections_by_path_and_hash(&document.path, hash)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect()
    } else {
      Vec::new()
    };

    let added = self.store.add_sections(&sections).await?;
    if !replaced.is_empty() {
      debug!(path = %document.path, count = replaced.len(), "Dropping same-hash sections for forced reindex");
      self.store.delete_sections_by_ids(&replaced).await?;
    }
    self.store.delete_sections_by_path_except_hash(&document.path, hash).await?;
    debug!(path = %document.path, hash, sections = added, "Indexed document");
    Ok(added)
  }

  /// Whether sections for exactly this `(path, hash)` are already stored.
  pub async fn is_indexed(&self, path: &str, hash: &str) -> Result<bool> {
    Ok(!self.store.find_sections_by_path_and_hash(path, hash).await?.is_empty())
  }
}
