use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of an [`IndexRequest`].
///
/// Valid transitions: `Pending -> Processing -> {Completed | Failed}` and
/// `Pending -> Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexRequestStatus {
  Pending,
  Processing,
  Completed,
  Failed,
  Skipped,
}

impl IndexRequestStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Processing => "processing",
      Self::Completed => "completed",
      Self::Failed => "failed",
      Self::Skipped => "skipped",
    }
  }

  /// Whether work for this request may still change the index.
  pub fn is_outstanding(&self) -> bool {
    matches!(self, Self::Pending | Self::Processing)
  }

  pub fn can_transition_to(&self, next: IndexRequestStatus) -> bool {
    matches!(
      (self, next),
      (Self::Pending, Self::Processing)
        | (Self::Pending, Self::Skipped)
        | (Self::Processing, Self::Completed)
        | (Self::Processing, Self::Failed)
    )
  }
}

impl fmt::Display for IndexRequestStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for IndexRequestStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "pending" => Ok(Self::Pending),
      "processing" => Ok(Self::Processing),
      "completed" => Ok(Self::Completed),
      "failed" => Ok(Self::Failed),
      "skipped" => Ok(Self::Skipped),
      _ => Err(format!("Unknown index request status: {}", s)),
    }
  }
}

/// "Document at `document_path` with hash `document_hash` needs indexing."
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRequest {
  pub id: String,
  pub document_path: String,
  pub document_hash: String,
  pub status: IndexRequestStatus,
  #[serde(with = "super::timestamp")]
  pub created_at: DateTime<Utc>,
  #[serde(default, with = "super::timestamp::option")]
  pub started_at: Option<DateTime<Utc>>,
  #[serde(default, with = "super::timestamp::option")]
  pub completed_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub error: Option<String>,
}

/// Sort order for request queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestOrder {
  #[default]
  CreatedAsc,
  CreatedDesc,
}

impl RequestOrder {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::CreatedAsc => "created_at ASC",
      Self::CreatedDesc => "created_at DESC",
    }
  }
}

/// Query over the request queue.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
  pub document_path: Option<String>,
  pub document_hash: Option<String>,
  pub statuses: Vec<IndexRequestStatus>,
  pub limit: Option<usize>,
  pub order: RequestOrder,
}

impl RequestFilter {
  pub fn with_status(status: IndexRequestStatus) -> Self {
    Self {
      statuses: vec![status],
      ..Default::default()
    }
  }

  pub fn path(mut self, path: impl Into<String>) -> Self {
    self.document_path = Some(path.into());
    self
  }

  pub fn order(mut self, order: RequestOrder) -> Self {
    self.order = order;
    self
  }
}

/// Filter for bulk status updates.
#[derive(Debug, Clone, Default)]
pub struct BulkRequestFilter {
  pub document_path: Option<String>,
  pub status: Option<IndexRequestStatus>,
  pub created_before: Option<DateTime<Utc>>,
  pub created_after: Option<DateTime<Utc>>,
}

/// Field updates applied to a request. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestUpdate {
  pub status: Option<IndexRequestStatus>,
  pub started_at: Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
  pub error: Option<String>,
}

impl RequestUpdate {
  /// Whether this update may be applied to a request currently in `current`.
  /// Updates that leave the status alone are always allowed.
  pub fn allowed_from(&self, current: IndexRequestStatus) -> bool {
    self.status.is_none_or(|next| current.can_transition_to(next))
  }

  pub fn processing(now: DateTime<Utc>) -> Self {
    Self {
      status: Some(IndexRequestStatus::Processing),
      started_at: Some(now),
      ..Default::default()
    }
  }

  pub fn completed(now: DateTime<Utc>) -> Self {
    Self {
      status: Some(IndexRequestStatus::Completed),
      completed_at: Some(now),
      ..Default::default()
    }
  }

  pub fn failed(now: DateTime<Utc>, error: impl Into<String>) -> Self {
    Self {
      status: Some(IndexRequestStatus::Failed),
      completed_at: Some(now),
      error: Some(error.into()),
      ..Default::default()
    }
  }

  pub fn skipped(now: DateTime<Utc>) -> Self {
    Self {
      status: Some(IndexRequestStatus::Skipped),
      completed_at: Some(now),
      ..Default::default()
    }
  }
}
