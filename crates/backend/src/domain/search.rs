use serde::{Deserialize, Serialize};

/// Freshness of a search hit relative to the document on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
  /// Indexed hash matches the current document and nothing is in flight.
  Latest,
  /// A pending or processing request exists for the document.
  Updating,
  /// Hash mismatch with nothing in flight to fix it.
  Outdated,
}

impl IndexStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Latest => "latest",
      Self::Updating => "updating",
      Self::Outdated => "outdated",
    }
  }
}

/// Which results a search keeps after freshness classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatusFilter {
  /// Keep only results whose document is `latest`.
  LatestOnly,
  /// Drop results whose document has a pending or processing request.
  CompletedOnly,
  #[default]
  All,
}

impl IndexStatusFilter {
  pub fn keeps(&self, freshness: &Freshness) -> bool {
    match self {
      Self::LatestOnly => freshness.is_latest,
      Self::CompletedOnly => !freshness.has_pending_update,
      Self::All => true,
    }
  }
}

/// Classification of one hit, as attached to a [`SearchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
  pub status: IndexStatus,
  pub is_latest: bool,
  pub has_pending_update: bool,
}

/// Result ordering applied after filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
  /// Closest first, as ranked by the engine.
  #[default]
  Score,
  /// Shallowest sections first, closest first within a depth.
  Depth,
  /// By document path, then position in the document.
  Path,
}

impl std::str::FromStr for SortBy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "score" => Ok(Self::Score),
      "depth" => Ok(Self::Depth),
      "path" => Ok(Self::Path),
      other => Err(format!("unknown sort key '{other}', expected score, depth or path")),
    }
  }
}

/// Depth restriction for a search: one level or a set of levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DepthFilter {
  One(u8),
  Many(Vec<u8>),
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
  pub query: String,
  pub limit: Option<usize>,
  pub depth: Option<DepthFilter>,
  pub include_clean_only: Option<bool>,
  pub exclude_paths: Vec<String>,
  pub index_status: IndexStatusFilter,
  /// Results skipped after filtering and sorting
  pub offset: usize,
  pub sort_by: SortBy,
}

impl SearchOptions {
  pub fn new(query: impl Into<String>) -> Self {
    Self {
      query: query.into(),
      ..Default::default()
    }
  }
}

/// A section hit annotated with its freshness.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
  pub id: String,
  pub document_path: String,
  pub heading: String,
  pub depth: u8,
  pub content: String,
  pub score: f32,
  pub is_dirty: bool,
  pub token_count: usize,
  pub document_hash: String,
  pub start_line: usize,
  pub end_line: usize,
  pub section_number: Vec<u32>,
  pub index_status: IndexStatus,
  pub is_latest: bool,
  pub has_pending_update: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
  pub results: Vec<SearchResult>,
  pub total: usize,
  /// Wall time of the search in milliseconds
  pub took: u64,
}
