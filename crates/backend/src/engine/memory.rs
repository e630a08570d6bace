//! In-process [`IndexStore`] used by worker and service tests.

use std::sync::{
  Mutex,
  atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{EngineError, EngineQuery, EngineStats, IndexStore, Result, SearchHit};
use crate::domain::{
  BulkRequestFilter, IndexRequest, IndexRequestStatus, RequestFilter, RequestOrder, RequestUpdate, Section,
};

#[derive(Default)]
pub struct MemoryStore {
  sections: Mutex<Vec<Section>>,
  requests: Mutex<Vec<IndexRequest>>,
  last_created: Mutex<Option<DateTime<Utc>>>,
  add_calls: AtomicUsize,
  fail_adds: AtomicBool,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn sections(&self) -> Vec<Section> {
    self.sections.lock().unwrap().clone()
  }

  pub fn sections_for(&self, path: &str) -> Vec<Section> {
    self
      .sections()
      .into_iter()
      .filter(|s| s.document_path == path)
      .collect()
  }

  pub fn requests(&self) -> Vec<IndexRequest> {
    self.requests.lock().unwrap().clone()
  }

  pub fn requests_for(&self, path: &str) -> Vec<IndexRequest> {
    self
      .requests()
      .into_iter()
      .filter(|r| r.document_path == path)
      .collect()
  }

  pub fn add_calls(&self) -> usize {
    self.add_calls.load(Ordering::SeqCst)
  }

  /// Make `add_sections` fail until reset.
  pub fn fail_adds(&self, fail: bool) {
    self.fail_adds.store(fail, Ordering::SeqCst);
  }

  /// Insert a request directly, bypassing the engine clock.
  pub fn insert_request(&self, request: IndexRequest) {
    self.requests.lock().unwrap().push(request);
  }

  /// Strictly increasing creation timestamps, so ordering is deterministic.
  fn next_created_at(&self) -> DateTime<Utc> {
    let mut last = self.last_created.lock().unwrap();
    let now = Utc::now();
    let next = match *last {
      Some(prev) if now <= prev => prev + Duration::milliseconds(1),
      _ => now,
    };
    *last = Some(next);
    next
  }
}

fn apply(request: &mut IndexRequest, update: &RequestUpdate) {
  if let Some(status) = update.status {
    request.status = status;
  }
  if update.started_at.is_some() {
    request.started_at = update.started_at;
  }
  if update.completed_at.is_some() {
    request.completed_at = update.completed_at;
  }
  if update.error.is_some() {
    request.error = update.error.clone();
  }
}

fn matches_bulk(request: &IndexRequest, filter: &BulkRequestFilter) -> bool {
  filter.document_path.as_ref().is_none_or(|p| *p == request.document_path)
    && filter.status.is_none_or(|s| s == request.status)
    && filter.created_before.is_none_or(|t| request.created_at < t)
    && filter.created_after.is_none_or(|t| request.created_at > t)
}

#[async_trait]
impl IndexStore for MemoryStore {
  async fn add_sections(&self, sections: &[Section]) -> Result<usize> {
    self.add_calls.fetch_add(1, Ordering::SeqCst);
    if self.fail_adds.load(Ordering::SeqCst) {
      return Err(EngineError::Rpc {
        code: super::protocol::INTERNAL_ERROR,
        message: "embedding failed".into(),
      });
    }
    self.sections.lock().unwrap().extend(sections.iter().cloned());
    Ok(sections.len())
  }

  /// Scores by term overlap; lower is closer, like a distance.
  async fn search(&self, query: &EngineQuery) -> Result<Vec<SearchHit>> {
    let terms: Vec<String> = query.query.split_whitespace().map(str::to_lowercase).collect();
    let mut hits: Vec<SearchHit> = self
      .sections()
      .iter()
      .filter(|s| query.max_depth.is_none_or(|d| s.depth <= d))
      .filter(|s| !query.include_clean_only || !s.is_dirty)
      .filter(|s| !query.exclude_paths.contains(&s.document_path))
      .filter_map(|s| {
        let body = s.content.to_lowercase();
        let overlap = terms.iter().filter(|t| body.contains(t.as_str())).count();
        (overlap > 0).then(|| {
          let mut hit = SearchHit::from(s);
          hit.score = 1.0 / (1.0 + overlap as f32);
          hit
        })
      })
      .collect();
    hits.sort_by(|a, b| a.score.total_cmp(&b.score));
    hits.truncate(query.limit);
    Ok(hits)
  }

  async fn get_sections_by_path(&self, document_path: &str) -> Result<Vec<Section>> {
    Ok(self.sections_for(document_path))
  }

  async fn get_section_by_id(&self, id: &str) -> Result<Option<Section>> {
    Ok(self.sections().into_iter().find(|s| s.id == id))
  }

  async fn delete_sections_by_path(&self, document_path: &str) -> Result<()> {
    self.sections.lock().unwrap().retain(|s| s.document_path != document_path);
    Ok(())
  }

  async fn delete_sections_by_ids(&self, ids: &[String]) -> Result<()> {
    self.sections.lock().unwrap().retain(|s| !ids.contains(&s.id));
    Ok(())
  }

  async fn find_sections_by_path_and_hash(&self, document_path: &str, document_hash: &str) -> Result<Vec<Section>> {
    Ok(
      self
        .sections_for(document_path)
        .into_iter()
        .filter(|s| s.document_hash == document_hash)
        .collect(),
    )
  }

  async fn delete_sections_by_path_except_hash(&self, document_path: &str, keep_hash: &str) -> Result<()> {
    self
      .sections
      .lock()
      .unwrap()
      .retain(|s| s.document_path != document_path || s.document_hash == keep_hash);
    Ok(())
  }

  async fn mark_dirty(&self, document_path: &str) -> Result<()> {
    for section in self.sections.lock().unwrap().iter_mut() {
      if section.document_path == document_path {
        section.is_dirty = true;
      }
    }
    Ok(())
  }

  async fn get_dirty_sections(&self, limit: usize) -> Result<Vec<Section>> {
    Ok(self.sections().into_iter().filter(|s| s.is_dirty).take(limit).collect())
  }

  async fn get_stats(&self) -> Result<EngineStats> {
    let sections = self.sections();
    let mut paths: Vec<&str> = sections.iter().map(|s| s.document_path.as_str()).collect();
    paths.sort_unstable();
    paths.dedup();
    Ok(EngineStats {
      total_sections: sections.len(),
      dirty_count: sections.iter().filter(|s| s.is_dirty).count(),
      total_documents: paths.len(),
    })
  }

  async fn create_index_request(&self, document_path: &str, document_hash: &str) -> Result<IndexRequest> {
    let request = IndexRequest {
      id: Uuid::new_v4().to_string(),
      document_path: document_path.to_string(),
      document_hash: document_hash.to_string(),
      status: IndexRequestStatus::Pending,
      created_at: self.next_created_at(),
      started_at: None,
      completed_at: None,
      error: None,
    };
    self.requests.lock().unwrap().push(request.clone());
    Ok(request)
  }

  async fn find_index_requests(&self, filter: &RequestFilter) -> Result<Vec<IndexRequest>> {
    let mut found: Vec<IndexRequest> = self
      .requests()
      .into_iter()
      .filter(|r| filter.document_path.as_ref().is_none_or(|p| *p == r.document_path))
      .filter(|r| filter.document_hash.as_ref().is_none_or(|h| *h == r.document_hash))
      .filter(|r| filter.statuses.is_empty() || filter.statuses.contains(&r.status))
      .collect();
    found.sort_by_key(|r| r.created_at);
    if filter.order == RequestOrder::CreatedDesc {
      found.reverse();
    }
    found.truncate(filter.limit.unwrap_or(1000));
    Ok(found)
  }

  async fn update_index_request(&self, id: &str, update: &RequestUpdate) -> Result<()> {
    let mut requests = self.requests.lock().unwrap();
    let request = requests
      .iter_mut()
      .find(|r| r.id == id)
      .ok_or_else(|| EngineError::Rpc {
        code: super::protocol::INTERNAL_ERROR,
        message: format!("Request not found after update: {id}"),
      })?;
    if !update.allowed_from(request.status) {
      return Err(EngineError::Rpc {
        code: super::protocol::INTERNAL_ERROR,
        message: format!(
          "Invalid status transition for {id}: {} -> {}",
          request.status,
          update.status.unwrap_or(request.status)
        ),
      });
    }
    apply(request, update);
    Ok(())
  }

  async fn update_many_index_requests(&self, filter: &BulkRequestFilter, update: &RequestUpdate) -> Result<usize> {
    let mut count = 0;
    for request in self.requests.lock().unwrap().iter_mut() {
      if matches_bulk(request, filter) && update.allowed_from(request.status) {
        apply(request, update);
        count += 1;
      }
    }
    Ok(count)
  }

  async fn get_paths_with_status(&self, statuses: &[IndexRequestStatus]) -> Result<Vec<String>> {
    let mut paths: Vec<String> = self
      .requests()
      .into_iter()
      .filter(|r| statuses.contains(&r.status))
      .map(|r| r.document_path)
      .collect();
    paths.sort();
    paths.dedup();
    Ok(paths)
  }
}
