//! Typed parameters and results for engine calls.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::fields::{INDEX_REQUEST_FIELDS, to_engine};
use crate::domain::{
  BulkRequestFilter, IndexRequestStatus, RequestFilter, RequestUpdate, Section, timestamp,
};

/// Outcome of the one-time model initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
  pub success: bool,
  #[serde(default)]
  pub model_name: Option<String>,
  #[serde(default)]
  pub dimension: Option<usize>,
}

/// Aggregate counters kept by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
  pub total_sections: usize,
  pub dirty_count: usize,
  pub total_documents: usize,
}

/// Query forwarded to the engine's similarity search.
#[derive(Debug, Clone, Default)]
pub struct EngineQuery {
  pub query: String,
  pub limit: usize,
  /// Maximum section depth
  pub max_depth: Option<u8>,
  pub include_clean_only: bool,
  pub exclude_paths: Vec<String>,
}

impl EngineQuery {
  pub fn to_params(&self) -> Value {
    let mut params = Map::new();
    params.insert("query".into(), json!(self.query));
    params.insert("limit".into(), json!(self.limit));
    if let Some(depth) = self.max_depth {
      params.insert("depth".into(), json!(depth));
    }
    params.insert("includeCleanOnly".into(), json!(self.include_clean_only));
    if !self.exclude_paths.is_empty() {
      params.insert("excludePaths".into(), json!(self.exclude_paths));
    }
    Value::Object(params)
  }
}

/// A raw similarity hit, before freshness classification.
#[serde_with::serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
  pub id: String,
  pub document_path: String,
  #[serde(default)]
  pub document_hash: String,
  pub heading: String,
  pub depth: u8,
  pub content: String,
  pub score: f32,
  #[serde(default)]
  pub is_dirty: bool,
  #[serde(default)]
  pub token_count: usize,
  #[serde_as(as = "serde_with::DefaultOnNull")]
  #[serde(default)]
  pub start_line: usize,
  #[serde_as(as = "serde_with::DefaultOnNull")]
  #[serde(default)]
  pub end_line: usize,
  #[serde_as(as = "serde_with::DefaultOnNull")]
  #[serde(default)]
  pub section_number: Vec<u32>,
}

impl From<&Section> for SearchHit {
  fn from(section: &Section) -> Self {
    Self {
      id: section.id.clone(),
      document_path: section.document_path.clone(),
      document_hash: section.document_hash.clone(),
      heading: section.heading.clone(),
      depth: section.depth,
      content: section.content.clone(),
      score: 0.0,
      is_dirty: section.is_dirty,
      token_count: section.token_count,
      start_line: section.start_line,
      end_line: section.end_line,
      section_number: section.section_number.clone(),
    }
  }
}

// ============================================================================
// Request queue parameters
// ============================================================================

/// `createIndexRequest` params.
pub fn create_request_params(document_path: &str, document_hash: &str) -> Value {
  to_engine(
    json!({ "documentPath": document_path, "documentHash": document_hash }),
    INDEX_REQUEST_FIELDS,
  )
}

/// `findIndexRequests` params.
pub fn find_requests_params(filter: &RequestFilter) -> Value {
  let mut params = Map::new();
  if let Some(path) = &filter.document_path {
    params.insert("documentPath".into(), json!(path));
  }
  if let Some(hash) = &filter.document_hash {
    params.insert("documentHash".into(), json!(hash));
  }
  match filter.statuses.as_slice() {
    [] => {}
    [single] => {
      params.insert("status".into(), json!(single.as_str()));
    }
    many => {
      let names: Vec<&str> = many.iter().map(IndexRequestStatus::as_str).collect();
      params.insert("status".into(), json!(names));
    }
  }
  if let Some(limit) = filter.limit {
    params.insert("limit".into(), json!(limit));
  }
  params.insert("order".into(), json!(filter.order.as_str()));
  to_engine(Value::Object(params), INDEX_REQUEST_FIELDS)
}

/// Field updates in engine naming. Unset fields are omitted.
pub fn update_fields(update: &RequestUpdate) -> Value {
  let mut fields = Map::new();
  if let Some(status) = update.status {
    fields.insert("status".into(), json!(status.as_str()));
  }
  if let Some(started_at) = &update.started_at {
    fields.insert("startedAt".into(), json!(timestamp::format(started_at)));
  }
  if let Some(completed_at) = &update.completed_at {
    fields.insert("completedAt".into(), json!(timestamp::format(completed_at)));
  }
  if let Some(error) = &update.error {
    fields.insert("error".into(), json!(error));
  }
  to_engine(Value::Object(fields), INDEX_REQUEST_FIELDS)
}

/// `updateIndexRequest` params.
pub fn update_request_params(id: &str, update: &RequestUpdate) -> Value {
  json!({ "id": id, "updates": update_fields(update) })
}

/// `updateManyIndexRequests` params.
pub fn update_many_params(filter: &BulkRequestFilter, update: &RequestUpdate) -> Value {
  let mut wire = Map::new();
  if let Some(path) = &filter.document_path {
    wire.insert("documentPath".into(), json!(path));
  }
  if let Some(status) = filter.status {
    wire.insert("status".into(), json!(status.as_str()));
  }
  let mut created = Map::new();
  if let Some(before) = &filter.created_before {
    created.insert("$lt".into(), json!(timestamp::format(before)));
  }
  if let Some(after) = &filter.created_after {
    created.insert("$gt".into(), json!(timestamp::format(after)));
  }
  if !created.is_empty() {
    wire.insert("createdAt".into(), Value::Object(created));
  }
  json!({
    "filter": to_engine(Value::Object(wire), INDEX_REQUEST_FIELDS),
    "updates": update_fields(update),
  })
}
