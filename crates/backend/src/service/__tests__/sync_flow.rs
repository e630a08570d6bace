use pretty_assertions::assert_eq;

use super::helpers::TestContext;
use crate::{
  actor::{FileEvent, FileEventKind},
  domain::{Document, IndexRequestStatus},
  engine::IndexStore,
  service::{RebuildReport, ServiceError, SyncReport},
  storage::DocumentStorage,
};

#[tokio::test]
async fn test_change_event_saves_document_and_queues_request() {
  let ctx = TestContext::new();
  ctx.edit("guide.md", "# Guide\nbody").await;

  let stored = ctx.storage.get("guide.md").await.expect("get").expect("stored");
  assert_eq!(stored.content, "# Guide\nbody");

  let requests = ctx.store.requests_for("guide.md");
  assert_eq!(requests.len(), 1);
  assert_eq!(requests[0].status, IndexRequestStatus::Pending);
  assert_eq!(requests[0].document_hash, stored.metadata.file_hash);
  assert!(ctx.store.sections().is_empty(), "nothing is indexed before a sweep");
}

#[tokio::test]
async fn test_unlink_removes_sections_and_document_immediately() {
  let ctx = TestContext::new();
  ctx.index("guide.md", "# Guide\nbody").await;
  assert!(!ctx.store.sections_for("guide.md").is_empty());

  ctx.remove("guide.md").await;
  assert!(ctx.store.sections_for("guide.md").is_empty());
  assert!(!ctx.storage.exists("guide.md").await.expect("exists"));
  // Deletions never go through the queue
  assert_eq!(ctx.store.requests_for("guide.md").len(), 1);
}

#[tokio::test]
async fn test_event_for_unreadable_file_is_an_error() {
  let ctx = TestContext::new();
  let result = ctx
    .sync
    .handle_event(&FileEvent::new(FileEventKind::Add, "missing.md"))
    .await;
  assert!(matches!(result, Err(ServiceError::Read { .. })));
  assert!(ctx.store.requests().is_empty());
}

#[tokio::test]
async fn test_index_document_skips_unchanged_unless_forced() {
  let ctx = TestContext::new();
  ctx.write("guide.md", "# Guide\nbody\n## Part\nmore");

  let first = ctx.sync.index_document("guide.md", false).await.expect("index");
  assert_eq!(first.sections_created, 2);
  assert!(!first.unchanged);

  let second = ctx.sync.index_document("guide.md", false).await.expect("index");
  assert!(second.unchanged);
  assert_eq!(ctx.store.add_calls(), 1);

  let forced = ctx.sync.index_document("guide.md", true).await.expect("index");
  assert_eq!(forced.sections_created, 2);
  assert_eq!(ctx.store.sections_for("guide.md").len(), 2, "forced reindex must not duplicate");
}

#[tokio::test]
async fn test_failed_forced_reindex_keeps_existing_sections() {
  let ctx = TestContext::new();
  ctx.write("guide.md", "# Guide\nbody\n## Part\nmore");
  ctx.sync.index_document("guide.md", false).await.expect("index");
  let before = ctx.store.sections_for("guide.md");

  ctx.store.fail_adds(true);
  let result = ctx.sync.index_document("guide.md", true).await;
  assert!(matches!(result, Err(ServiceError::Engine(_))));
  assert_eq!(ctx.store.sections_for("guide.md"), before);

  ctx.store.fail_adds(false);
  ctx.sync.index_document("guide.md", true).await.expect("index");
  let after = ctx.store.sections_for("guide.md");
  assert_eq!(after.len(), before.len());
  assert!(after.iter().all(|s| before.iter().all(|b| b.id != s.id)));
}

#[tokio::test]
async fn test_index_document_replaces_old_hash() {
  let ctx = TestContext::new();
  ctx.write("guide.md", "# Guide\nold");
  ctx.sync.index_document("guide.md", false).await.expect("index");
  ctx.write("guide.md", "# Guide\nnew");
  ctx.sync.index_document("guide.md", false).await.expect("index");

  let sections = ctx.store.sections_for("guide.md");
  assert_eq!(sections.len(), 1);
  assert!(sections[0].content.contains("new"));
}

#[tokio::test]
async fn test_rebuild_counts_failures_and_continues() {
  let ctx = TestContext::new();
  ctx.write("a.md", "# A\na");
  ctx.write("b.md", "# B\nb");

  let report = ctx
    .sync
    .rebuild_index(Some(vec!["a.md".into(), "missing.md".into(), "b.md".into()]))
    .await
    .expect("rebuild");
  assert_eq!(
    report,
    RebuildReport {
      documents_processed: 2,
      sections_created: 2,
      failed: 1,
    }
  );

  let everything = ctx.sync.rebuild_index(None).await.expect("rebuild");
  assert_eq!(everything.documents_processed, 2);
  assert_eq!(ctx.store.sections().len(), 2);
}

#[tokio::test]
async fn test_startup_sync_queues_new_and_removes_vanished() {
  let ctx = TestContext::new();
  ctx.write("a.md", "# A\na");
  ctx.write("docs/b.md", "# B\nb");

  // Indexed earlier, file since deleted
  ctx.storage.save("gone.md", &Document::new("gone.md", "# Gone\nx")).await.expect("save");
  ctx.sync.index_document("a.md", false).await.expect("index");
  std::fs::remove_file(ctx.path("a.md")).expect("remove");
  ctx.write("a.md", "# A\nchanged");

  let report = ctx.sync.startup_sync().await.expect("sync");
  assert_eq!(
    report,
    SyncReport {
      queued: 2,
      removed: 1,
      unchanged: 0,
      failed: 0,
    }
  );
  assert!(!ctx.storage.exists("gone.md").await.expect("exists"));
  assert!(!ctx.sync.is_syncing());

  ctx.worker.sweep().await;
  let again = ctx.sync.startup_sync().await.expect("sync");
  assert_eq!(again.unchanged, 2);
  assert_eq!(again.queued, 0);
}

#[tokio::test]
async fn test_status_reports_queue_and_index() {
  let ctx = TestContext::new();
  ctx.index("a.md", "# A\na\n## A2\nb").await;
  ctx.edit("b.md", "# B\nb").await;
  ctx.store.create_index_request("c.md", "nope").await.expect("request");
  ctx.worker.sweep().await;
  ctx.edit("a.md", "# A\nchanged").await;

  let status = ctx.sync.status(true).await.expect("status");
  assert_eq!(status.index.total_documents, 2);
  assert_eq!(status.requests.pending, 1);
  assert_eq!(status.requests.failed, 1, "c.md has no stored document");
  assert!(status.worker.running);
  assert!(!status.worker.syncing);
  assert_eq!(status.server.pid, std::process::id());
}

#[tokio::test]
async fn test_document_path_normalization() {
  let ctx = TestContext::new();
  assert_eq!(ctx.sync.document_path("./docs/a.md").expect("relative"), "docs/a.md");

  let absolute = ctx.path("docs/a.md");
  ctx.write("docs/a.md", "# A");
  assert_eq!(
    ctx.sync.document_path(&absolute.to_string_lossy()).expect("absolute"),
    "docs/a.md"
  );
  assert!(matches!(
    ctx.sync.document_path("/definitely/elsewhere.md"),
    Err(ServiceError::Validation(_))
  ));
}
