//! Field-name mapping at the engine boundary.
//!
//! Records (sections, index requests and their updates/filters) use
//! camelCase keys internally and snake_case keys in the engine's tables.
//! Every record crossing the boundary is renamed through these tables;
//! keys not listed pass through untouched so both spellings are accepted
//! on the way back in.

use serde_json::{Map, Value};

/// `(internal, engine)` pairs for section records.
pub const SECTION_FIELDS: &[(&str, &str)] = &[
  ("id", "id"),
  ("documentPath", "document_path"),
  ("heading", "heading"),
  ("depth", "depth"),
  ("content", "content"),
  ("tokenCount", "token_count"),
  ("vector", "vector"),
  ("parentId", "parent_id"),
  ("order", "order"),
  ("isDirty", "is_dirty"),
  ("documentHash", "document_hash"),
  ("createdAt", "created_at"),
  ("updatedAt", "updated_at"),
  ("summary", "summary"),
  ("documentSummary", "document_summary"),
  ("startLine", "start_line"),
  ("endLine", "end_line"),
  ("sectionNumber", "section_number"),
  ("score", "score"),
];

/// `(internal, engine)` pairs for index request records, updates and filters.
pub const INDEX_REQUEST_FIELDS: &[(&str, &str)] = &[
  ("id", "id"),
  ("documentPath", "document_path"),
  ("documentHash", "document_hash"),
  ("status", "status"),
  ("createdAt", "created_at"),
  ("startedAt", "started_at"),
  ("completedAt", "completed_at"),
  ("error", "error"),
];

/// Fields the engine computes itself and must never receive.
const ENGINE_OWNED: &[&str] = &["vector"];

fn rename(object: Map<String, Value>, table: &[(&str, &str)], outbound: bool) -> Map<String, Value> {
  object
    .into_iter()
    .filter(|(key, _)| !(outbound && ENGINE_OWNED.contains(&key.as_str())))
    .map(|(key, value)| {
      let mapped = table
        .iter()
        .find(|(internal, engine)| if outbound { *internal == key } else { *engine == key })
        .map(|(internal, engine)| if outbound { *engine } else { *internal });
      (mapped.map(str::to_string).unwrap_or(key), value)
    })
    .collect()
}

fn map_record(value: Value, table: &[(&str, &str)], outbound: bool) -> Value {
  match value {
    Value::Object(object) => Value::Object(rename(object, table, outbound)),
    Value::Array(items) => Value::Array(items.into_iter().map(|v| map_record(v, table, outbound)).collect()),
    other => other,
  }
}

/// Rename a record (or list of records) to engine field names.
pub fn to_engine(value: Value, table: &[(&str, &str)]) -> Value {
  map_record(value, table, true)
}

/// Rename a record (or list of records) from engine field names.
pub fn from_engine(value: Value, table: &[(&str, &str)]) -> Value {
  map_record(value, table, false)
}
