use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the document content.
pub fn content_hash(content: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(content.as_bytes());
  hex::encode(hasher.finalize())
}

/// Bookkeeping stored alongside a document body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
  pub file_hash: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// A raw document as held by storage, keyed by its root-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
  pub path: String,
  pub content: String,
  pub metadata: DocumentMetadata,
}

impl Document {
  pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
    let content = content.into();
    let now = Utc::now();
    Self {
      path: path.into(),
      metadata: DocumentMetadata {
        file_hash: content_hash(&content),
        created_at: now,
        updated_at: now,
      },
      content,
    }
  }

  pub fn file_hash(&self) -> &str {
    &self.metadata.file_hash
  }
}
