//! Unified error type for service operations.

use std::path::PathBuf;

use crate::{
  context::{DiscoveryError, SplitError},
  domain::IndexRequestStatus,
  engine::EngineError,
  storage::StorageError,
};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
  /// No stored document for the path.
  #[error("Document not found: {0}")]
  DocumentNotFound(String),
  /// Input validation failed.
  #[error("Validation error: {0}")]
  Validation(String),
  #[error("Failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error(transparent)]
  Engine(#[from] EngineError),
  #[error(transparent)]
  Storage(#[from] StorageError),
  #[error(transparent)]
  Split(#[from] SplitError),
  #[error(transparent)]
  Discovery(#[from] DiscoveryError),
  /// A request status change the lifecycle does not allow.
  #[error("Invalid transition for request {id}: {from} -> {to}")]
  InvalidTransition {
    id: String,
    from: IndexRequestStatus,
    to: IndexRequestStatus,
  },
  #[error("Internal error: {0}")]
  Internal(String),
}

impl ServiceError {
  /// JSON-RPC style code: `-32602` for bad input, `-32000` otherwise.
  pub fn code(&self) -> i32 {
    match self {
      Self::Validation(_) => -32602,
      _ => -32000,
    }
  }

  pub fn validation(msg: impl Into<String>) -> Self {
    Self::Validation(msg.into())
  }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
