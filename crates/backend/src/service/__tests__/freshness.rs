use pretty_assertions::assert_eq;

use super::helpers::TestContext;
use crate::{
  domain::{DepthFilter, Document, IndexStatus, IndexStatusFilter, SearchOptions, SortBy},
  engine::IndexStore,
  service::ServiceError,
  storage::DocumentStorage,
};

fn statuses(results: &[crate::domain::SearchResult]) -> Vec<(String, IndexStatus)> {
  results
    .iter()
    .map(|r| (r.heading.clone(), r.index_status))
    .collect()
}

#[tokio::test]
async fn test_indexed_document_is_latest() {
  let ctx = TestContext::new();
  ctx.index("guide.md", "# Guide\nwidgets are great").await;

  let response = ctx.search.search(SearchOptions::new("widgets")).await.expect("search");
  assert_eq!(response.total, 1);
  assert_eq!(statuses(&response.results), vec![("Guide".into(), IndexStatus::Latest)]);
  assert!(response.results[0].content.contains("widgets"));
}

#[tokio::test]
async fn test_pending_edit_is_updating_until_swept() {
  let ctx = TestContext::new();
  ctx.index("guide.md", "# Guide\nwidgets v1").await;
  ctx.edit("guide.md", "# Guide\nwidgets v2").await;

  let response = ctx.search.search(SearchOptions::new("widgets")).await.expect("search");
  assert_eq!(statuses(&response.results), vec![("Guide".into(), IndexStatus::Updating)]);
  assert!(response.results[0].content.contains("v1"));

  let mut latest_only = SearchOptions::new("widgets");
  latest_only.index_status = IndexStatusFilter::LatestOnly;
  assert_eq!(ctx.search.search(latest_only.clone()).await.expect("search").total, 0);

  ctx.worker.sweep().await;
  let response = ctx.search.search(latest_only).await.expect("search");
  assert_eq!(statuses(&response.results), vec![("Guide".into(), IndexStatus::Latest)]);
  assert!(response.results[0].content.contains("v2"));
}

#[tokio::test]
async fn test_hash_mismatch_without_request_is_outdated() {
  let ctx = TestContext::new();
  ctx.index("guide.md", "# Guide\nwidgets v1").await;

  // A change that never produced an event
  ctx
    .storage
    .save("guide.md", &Document::new("guide.md", "# Guide\nwidgets v2"))
    .await
    .expect("save");

  let response = ctx.search.search(SearchOptions::new("widgets")).await.expect("search");
  assert_eq!(statuses(&response.results), vec![("Guide".into(), IndexStatus::Outdated)]);
}

#[tokio::test]
async fn test_missing_document_is_outdated() {
  let ctx = TestContext::new();
  ctx.index("guide.md", "# Guide\nwidgets").await;
  ctx.storage.delete("guide.md").await.expect("delete");

  let response = ctx.search.search(SearchOptions::new("widgets")).await.expect("search");
  assert_eq!(statuses(&response.results), vec![("Guide".into(), IndexStatus::Outdated)]);
}

#[tokio::test]
async fn test_any_outstanding_request_blocks_latest() {
  let ctx = TestContext::new();
  ctx.index("a.md", "# A\nwidgets").await;
  ctx.index("b.md", "# B\nwidgets").await;

  // Unrelated hash, but still outstanding for a.md
  ctx.store.create_index_request("a.md", "some-other-hash").await.expect("request");

  let response = ctx.search.search(SearchOptions::new("widgets")).await.expect("search");
  let mut found = statuses(&response.results);
  found.sort_by(|a, b| a.0.cmp(&b.0));
  assert_eq!(
    found,
    vec![("A".into(), IndexStatus::Updating), ("B".into(), IndexStatus::Latest)]
  );
}

#[tokio::test]
async fn test_depth_list_filters_exactly() {
  let ctx = TestContext::new();
  ctx
    .index("guide.md", "# Top\nwidgets\n## Middle\nwidgets\n### Bottom\nwidgets")
    .await;

  let mut options = SearchOptions::new("widgets");
  options.depth = Some(DepthFilter::Many(vec![1, 3]));
  let response = ctx.search.search(options).await.expect("search");
  let mut depths: Vec<u8> = response.results.iter().map(|r| r.depth).collect();
  depths.sort();
  assert_eq!(depths, vec![1, 3]);

  let mut options = SearchOptions::new("widgets");
  options.depth = Some(DepthFilter::One(2));
  let response = ctx.search.search(options).await.expect("search");
  assert!(response.results.iter().all(|r| r.depth <= 2));
  assert_eq!(response.total, 2);
}

#[tokio::test]
async fn test_limit_is_clamped() {
  let ctx = TestContext::new();
  for i in 0..5 {
    ctx.index(&format!("doc{i}.md"), &format!("# Doc {i}\nwidgets")).await;
  }

  let mut options = SearchOptions::new("widgets");
  options.limit = Some(2);
  assert_eq!(ctx.search.search(options).await.expect("search").total, 2);

  let mut options = SearchOptions::new("widgets");
  options.limit = Some(10_000);
  assert_eq!(ctx.search.search(options).await.expect("search").total, 5);
}

#[tokio::test]
async fn test_empty_query_is_rejected() {
  let ctx = TestContext::new();
  let err = ctx.search.search(SearchOptions::new("   ")).await.unwrap_err();
  assert!(matches!(err, ServiceError::Validation(_)));
  assert_eq!(err.code(), -32602);
}

#[tokio::test]
async fn test_results_carry_latest_and_pending_flags() {
  let ctx = TestContext::new();
  ctx.index("fresh.md", "# Fresh\nwidgets").await;
  ctx.index("busy.md", "# Busy\nwidgets v1").await;
  ctx.edit("busy.md", "# Busy\nwidgets v2").await;
  ctx.index("stale.md", "# Stale\nwidgets v1").await;
  ctx
    .storage
    .save("stale.md", &Document::new("stale.md", "# Stale\nwidgets v2"))
    .await
    .expect("save");

  let mut options = SearchOptions::new("widgets");
  options.sort_by = SortBy::Path;
  let response = ctx.search.search(options).await.expect("search");
  let flags: Vec<(String, bool, bool)> = response
    .results
    .iter()
    .map(|r| (r.document_path.clone(), r.is_latest, r.has_pending_update))
    .collect();
  assert_eq!(
    flags,
    vec![
      ("busy.md".into(), false, true),
      ("fresh.md".into(), true, false),
      ("stale.md".into(), false, false),
    ]
  );
}

#[tokio::test]
async fn test_completed_only_drops_documents_in_flight() {
  let ctx = TestContext::new();
  ctx.index("fresh.md", "# Fresh\nwidgets").await;
  ctx.index("busy.md", "# Busy\nwidgets v1").await;
  ctx.edit("busy.md", "# Busy\nwidgets v2").await;
  ctx.index("stale.md", "# Stale\nwidgets v1").await;
  ctx
    .storage
    .save("stale.md", &Document::new("stale.md", "# Stale\nwidgets v2"))
    .await
    .expect("save");

  let mut options = SearchOptions::new("widgets");
  options.index_status = IndexStatusFilter::CompletedOnly;
  options.sort_by = SortBy::Path;
  let response = ctx.search.search(options).await.expect("search");
  assert_eq!(
    statuses(&response.results),
    vec![
      ("Fresh".into(), IndexStatus::Latest),
      ("Stale".into(), IndexStatus::Outdated),
    ]
  );

  let mut options = SearchOptions::new("widgets");
  options.index_status = IndexStatusFilter::LatestOnly;
  let response = ctx.search.search(options).await.expect("search");
  assert_eq!(statuses(&response.results), vec![("Fresh".into(), IndexStatus::Latest)]);
}

#[tokio::test]
async fn test_offset_pages_through_sorted_results() {
  let ctx = TestContext::new();
  for name in ["a", "b", "c", "d", "e"] {
    ctx.index(&format!("{name}.md"), &format!("# Doc {name}\nwidgets")).await;
  }

  let mut options = SearchOptions::new("widgets");
  options.sort_by = SortBy::Path;
  options.offset = 2;
  options.limit = Some(2);
  let response = ctx.search.search(options).await.expect("search");
  let paths: Vec<&str> = response.results.iter().map(|r| r.document_path.as_str()).collect();
  assert_eq!(paths, vec!["c.md", "d.md"]);
  assert_eq!(response.total, 2);

  let mut options = SearchOptions::new("widgets");
  options.offset = 10;
  assert_eq!(ctx.search.search(options).await.expect("search").total, 0);
}

#[tokio::test]
async fn test_sort_by_depth_puts_shallow_sections_first() {
  let ctx = TestContext::new();
  ctx
    .index("guide.md", "# Top\nwidgets\n## Middle\nwidgets\n### Bottom\nwidgets")
    .await;

  let mut options = SearchOptions::new("widgets");
  options.sort_by = SortBy::Depth;
  let response = ctx.search.search(options).await.expect("search");
  let depths: Vec<u8> = response.results.iter().map(|r| r.depth).collect();
  assert_eq!(depths, vec![1, 2, 3]);
}
