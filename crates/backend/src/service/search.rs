//! Section search with freshness annotation.
//!
//! Hits come back from the engine as raw sections. Each is then classified
//! against the document on disk and the outstanding request queue:
//!
//! - `updating`: a pending or processing request exists for the path
//! - `latest`: the section hash equals the stored document hash
//! - `outdated`: anything else, including a missing document

use std::{
  collections::{HashMap, HashSet},
  sync::Arc,
  time::Instant,
};

use tracing::debug;

use super::error::{Result, ServiceError};
use crate::{
  domain::{
    DepthFilter, Freshness, IndexRequestStatus, IndexStatus, IndexStatusFilter, SearchOptions, SearchResponse,
    SearchResult, SortBy, config::SearchConfig,
  },
  engine::{EngineQuery, IndexStore, SearchHit},
  storage::DocumentStorage,
};

/// Extra hits requested from the engine when results are filtered afterwards.
const OVERFETCH_FACTOR: usize = 3;

/// Freshness of one hit.
pub fn classify(section_hash: &str, current_hash: Option<&str>, has_outstanding: bool) -> Freshness {
  let status = if has_outstanding {
    IndexStatus::Updating
  } else {
    match current_hash {
      Some(current) if current == section_hash => IndexStatus::Latest,
      _ => IndexStatus::Outdated,
    }
  };
  Freshness {
    status,
    is_latest: status == IndexStatus::Latest,
    has_pending_update: has_outstanding,
  }
}

fn sort_results(results: &mut [SearchResult], sort_by: SortBy) {
  match sort_by {
    // Engine order is already closest first
    SortBy::Score => {}
    SortBy::Depth => results.sort_by(|a, b| a.depth.cmp(&b.depth).then(a.score.total_cmp(&b.score))),
    SortBy::Path => results.sort_by(|a, b| {
      a.document_path
        .cmp(&b.document_path)
        .then(a.start_line.cmp(&b.start_line))
    }),
  }
}

pub struct SearchService {
  store: Arc<dyn IndexStore>,
  storage: Arc<dyn DocumentStorage>,
  config: SearchConfig,
}

impl SearchService {
  pub fn new(store: Arc<dyn IndexStore>, storage: Arc<dyn DocumentStorage>, config: SearchConfig) -> Self {
    Self { store, storage, config }
  }

  fn effective_limit(&self, requested: Option<usize>) -> usize {
    requested
      .unwrap_or(self.config.default_limit)
      .clamp(1, self.config.max_limit)
  }

  #[tracing::instrument(level = "trace", skip(self, options), fields(query = %options.query))]
  pub async fn search(&self, options: SearchOptions) -> Result<SearchResponse> {
    let started = Instant::now();
    let query = options.query.trim();
    if query.is_empty() {
      return Err(ServiceError::validation("query must not be empty"));
    }

    let limit = self.effective_limit(options.limit);
    let exact_depths = match &options.depth {
      Some(DepthFilter::Many(depths)) if !depths.is_empty() => Some(depths.clone()),
      _ => None,
    };
    let post_filtered = exact_depths.is_some() || options.index_status != IndexStatusFilter::All;
    let wanted = limit.saturating_add(options.offset);

    let engine_query = EngineQuery {
      query: query.to_string(),
      limit: if post_filtered {
        wanted.saturating_mul(OVERFETCH_FACTOR)
      } else {
        wanted
      },
      max_depth: match &options.depth {
        Some(DepthFilter::One(depth)) => Some(*depth),
        Some(DepthFilter::Many(depths)) => depths.iter().copied().max(),
        None => None,
      },
      include_clean_only: options.include_clean_only.unwrap_or(self.config.include_clean_only),
      exclude_paths: options.exclude_paths.clone(),
    };

    let hits: Vec<SearchHit> = self
      .store
      .search(&engine_query)
      .await?
      .into_iter()
      .filter(|hit| exact_depths.as_ref().is_none_or(|depths| depths.contains(&hit.depth)))
      .collect();

    let mut results: Vec<SearchResult> = self
      .annotate(hits)
      .await?
      .into_iter()
      .filter(|(_, freshness)| options.index_status.keeps(freshness))
      .map(|(result, _)| result)
      .collect();
    sort_results(&mut results, options.sort_by);
    let results: Vec<SearchResult> = results.into_iter().skip(options.offset).take(limit).collect();

    let took = started.elapsed().as_millis() as u64;
    debug!(query, results = results.len(), took, "Search completed");
    Ok(SearchResponse {
      total: results.len(),
      results,
      took,
    })
  }

  /// Attach a [`Freshness`] to every hit.
  async fn annotate(&self, hits: Vec<SearchHit>) -> Result<Vec<(SearchResult, Freshness)>> {
    if hits.is_empty() {
      return Ok(Vec::new());
    }

    let outstanding: HashSet<String> = self
      .store
      .get_paths_with_status(&[IndexRequestStatus::Pending, IndexRequestStatus::Processing])
      .await?
      .into_iter()
      .collect();

    let mut current: HashMap<String, Option<String>> = HashMap::new();
    for hit in &hits {
      if !current.contains_key(&hit.document_path) {
        let hash = self
          .storage
          .get(&hit.document_path)
          .await?
          .map(|doc| doc.metadata.file_hash);
        current.insert(hit.document_path.clone(), hash);
      }
    }

    Ok(
      hits
        .into_iter()
        .map(|hit| {
          let freshness = classify(
            &hit.document_hash,
            current.get(&hit.document_path).and_then(|h| h.as_deref()),
            outstanding.contains(&hit.document_path),
          );
          let result = SearchResult {
            id: hit.id,
            document_path: hit.document_path,
            heading: hit.heading,
            depth: hit.depth,
            content: hit.content,
            score: hit.score,
            is_dirty: hit.is_dirty,
            token_count: hit.token_count,
            document_hash: hit.document_hash,
            start_line: hit.start_line,
            end_line: hit.end_line,
            section_number: hit.section_number,
            index_status: freshness.status,
            is_latest: freshness.is_latest,
            has_pending_update: freshness.has_pending_update,
          };
          (result, freshness)
        })
        .collect(),
    )
  }
}
