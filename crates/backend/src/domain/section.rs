use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A hierarchical excerpt of a document, the unit of search.
///
/// `content` always contains the content of every descendant section.
/// `vector` is filled in by the engine and is never sent to it.
#[serde_with::skip_serializing_none]
#[serde_with::serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
  pub id: String,
  pub document_path: String,
  pub heading: String,
  /// 0 = whole-document root, 1..=max_depth = heading levels
  pub depth: u8,
  pub content: String,
  #[serde_as(as = "serde_with::DefaultOnNull")]
  #[serde(default)]
  pub token_count: usize,
  #[serde(default)]
  pub vector: Option<Vec<f32>>,
  pub parent_id: Option<String>,
  /// Zero-based position among siblings
  pub order: usize,
  #[serde_as(as = "serde_with::DefaultOnNull")]
  #[serde(default)]
  pub is_dirty: bool,
  pub document_hash: String,
  #[serde(with = "super::timestamp")]
  pub created_at: DateTime<Utc>,
  #[serde(with = "super::timestamp")]
  pub updated_at: DateTime<Utc>,
  #[serde(default)]
  pub summary: Option<String>,
  #[serde(default)]
  pub document_summary: Option<String>,
  /// 1-based, inclusive
  #[serde_as(as = "serde_with::DefaultOnNull")]
  #[serde(default)]
  pub start_line: usize,
  /// 1-based, inclusive
  #[serde_as(as = "serde_with::DefaultOnNull")]
  #[serde(default)]
  pub end_line: usize,
  /// 1-based sibling indices from the root, e.g. `[1, 2, 1]`
  #[serde_as(as = "serde_with::DefaultOnNull")]
  #[serde(default)]
  pub section_number: Vec<u32>,
}
