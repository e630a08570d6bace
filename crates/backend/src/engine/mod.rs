//! Client for the external embedding/search engine.
//!
//! The engine is a child process speaking line-delimited JSON-RPC over its
//! stdin/stdout. It owns embeddings, the section table and the index request
//! queue; everything here talks to it through [`IndexStore`].

mod channel;
pub mod fields;
#[cfg(test)]
pub(crate) mod memory;
pub mod protocol;
pub mod types;

use async_trait::async_trait;
pub use channel::{ChannelOptions, ChannelState, EngineChannel};
pub use types::{EngineQuery, EngineStats, ModelInfo, SearchHit};

use self::protocol::RpcError;
use crate::domain::{BulkRequestFilter, IndexRequest, IndexRequestStatus, RequestFilter, RequestUpdate, Section};

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
  #[error("Engine call '{method}' timed out after {timeout_ms}ms")]
  Timeout { method: String, timeout_ms: u64 },
  #[error("Engine did not become ready within {0}s")]
  StartupTimeout(u64),
  #[error("Engine process exited: {0}")]
  ProcessExited(String),
  #[error("Engine disconnected")]
  Disconnected,
  #[error("Engine is not connected")]
  NotConnected,
  #[error("Engine model is not initialized")]
  NotInitialized,
  #[error("Engine model initialization failed: {0}")]
  InitFailed(String),
  #[error("Failed to spawn engine '{command}': {message}")]
  Spawn { command: String, message: String },
  #[error("Engine error {code}: {message}")]
  Rpc { code: i32, message: String },
  #[error("Serialization error: {0}")]
  Serde(String),
  #[error("IO error: {0}")]
  Io(String),
}

impl From<RpcError> for EngineError {
  fn from(err: RpcError) -> Self {
    Self::Rpc {
      code: err.code,
      message: err.message,
    }
  }
}

impl From<serde_json::Error> for EngineError {
  fn from(err: serde_json::Error) -> Self {
    Self::Serde(err.to_string())
  }
}

impl From<std::io::Error> for EngineError {
  fn from(err: std::io::Error) -> Self {
    Self::Io(err.to_string())
  }
}

impl EngineError {
  /// Whether the connection is gone and must be re-established.
  pub fn is_connection_lost(&self) -> bool {
    matches!(self, Self::ProcessExited(_) | Self::Disconnected | Self::NotConnected)
  }
}

pub type Result<T> = std::result::Result<T, EngineError>;

// ============================================================================
// IndexStore
// ============================================================================

/// Section index and request queue operations backed by the engine.
#[async_trait]
pub trait IndexStore: Send + Sync {
  /// Embed and store sections. Returns the number added.
  async fn add_sections(&self, sections: &[Section]) -> Result<usize>;

  /// Similarity search, best hits first.
  async fn search(&self, query: &EngineQuery) -> Result<Vec<SearchHit>>;

  async fn get_sections_by_path(&self, document_path: &str) -> Result<Vec<Section>>;

  async fn get_section_by_id(&self, id: &str) -> Result<Option<Section>>;

  async fn delete_sections_by_path(&self, document_path: &str) -> Result<()>;

  /// Drop the sections with these ids. Unknown ids are ignored.
  async fn delete_sections_by_ids(&self, ids: &[String]) -> Result<()>;

  async fn find_sections_by_path_and_hash(&self, document_path: &str, document_hash: &str) -> Result<Vec<Section>>;

  /// Drop every section of `document_path` whose hash differs from `keep_hash`.
  async fn delete_sections_by_path_except_hash(&self, document_path: &str, keep_hash: &str) -> Result<()>;

  async fn mark_dirty(&self, document_path: &str) -> Result<()>;

  async fn get_dirty_sections(&self, limit: usize) -> Result<Vec<Section>>;

  async fn get_stats(&self) -> Result<EngineStats>;

  async fn create_index_request(&self, document_path: &str, document_hash: &str) -> Result<IndexRequest>;

  async fn find_index_requests(&self, filter: &RequestFilter) -> Result<Vec<IndexRequest>>;

  async fn update_index_request(&self, id: &str, update: &RequestUpdate) -> Result<()>;

  /// Apply one update to every matching request. Returns the number updated.
  async fn update_many_index_requests(&self, filter: &BulkRequestFilter, update: &RequestUpdate) -> Result<usize>;

  /// Distinct document paths that have a request in any of `statuses`.
  async fn get_paths_with_status(&self, statuses: &[IndexRequestStatus]) -> Result<Vec<String>>;
}
