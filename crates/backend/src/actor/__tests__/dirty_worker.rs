use std::{sync::Arc, time::Duration};

use pretty_assertions::assert_eq;

use crate::{
  actor::{DirtyReport, DirtyWorker},
  engine::IndexStore,
  service::__tests__::helpers::TestContext,
  storage::DocumentStorage,
};

#[tokio::test]
async fn test_dirty_documents_are_reindexed_in_place() {
  let ctx = TestContext::new();
  ctx.index("a.md", "# A\nbody\n## A2\nmore").await;
  ctx.index("b.md", "# B\nbody").await;
  let before = ctx.store.sections_for("a.md");

  ctx.store.mark_dirty("a.md").await.expect("mark");
  assert_eq!(ctx.store.get_stats().await.expect("stats").dirty_count, before.len());

  let report = ctx.dirty.sweep().await;
  assert_eq!(
    report,
    DirtyReport {
      documents: 1,
      sections_created: before.len(),
      removed: 0,
      failed: 0,
    }
  );

  let after = ctx.store.sections_for("a.md");
  assert_eq!(after.len(), before.len());
  assert!(after.iter().all(|s| !s.is_dirty));
  assert!(after.iter().all(|s| before.iter().all(|b| b.id != s.id)), "sections are rebuilt");
  assert_eq!(ctx.store.sections_for("b.md").len(), 1);
}

#[tokio::test]
async fn test_dirty_sweep_with_nothing_dirty() {
  let ctx = TestContext::new();
  ctx.index("a.md", "# A\nbody").await;
  assert_eq!(ctx.dirty.sweep().await, DirtyReport::default());
}

#[tokio::test]
async fn test_dirty_document_missing_on_disk_is_removed() {
  let ctx = TestContext::new();
  ctx.index("a.md", "# A\nbody").await;
  ctx.store.mark_dirty("a.md").await.expect("mark");
  std::fs::remove_file(ctx.path("a.md")).expect("remove");

  let report = ctx.dirty.sweep().await;
  assert_eq!(report.documents, 1);
  assert_eq!(report.removed, 1);
  assert_eq!(report.failed, 0);
  assert!(ctx.store.sections_for("a.md").is_empty());
  assert!(ctx.storage.get("a.md").await.expect("get").is_none());
  assert_eq!(ctx.store.get_stats().await.expect("stats").dirty_count, 0);
}

#[tokio::test]
async fn test_unreadable_dirty_document_does_not_block_others() {
  let ctx = TestContext::new();
  ctx.index("a.md", "# A\nbody").await;
  ctx.index("b.md", "# B\nbody").await;
  ctx.store.mark_dirty("a.md").await.expect("mark a");
  ctx.store.mark_dirty("b.md").await.expect("mark b");
  std::fs::write(ctx.path("a.md"), [0xff, 0xfe, 0x00, 0xc3]).expect("corrupt");

  let dirty = DirtyWorker::new(ctx.store.clone(), Arc::clone(&ctx.sync), Duration::from_secs(60), 1);
  for _ in 0..3 {
    dirty.sweep().await;
  }

  assert_eq!(ctx.store.get_stats().await.expect("stats").dirty_count, 0);
  assert!(ctx.store.sections_for("a.md").is_empty());
  let b = ctx.store.sections_for("b.md");
  assert_eq!(b.len(), 1);
  assert!(!b[0].is_dirty);
}

#[tokio::test]
async fn test_deleted_dirty_document_does_not_starve_small_batches() {
  let ctx = TestContext::new();
  ctx.index("a.md", "# A\nbody").await;
  ctx.index("b.md", "# B\nbody").await;
  ctx.store.mark_dirty("a.md").await.expect("mark a");
  ctx.store.mark_dirty("b.md").await.expect("mark b");
  std::fs::remove_file(ctx.path("a.md")).expect("remove");

  let dirty = DirtyWorker::new(ctx.store.clone(), Arc::clone(&ctx.sync), Duration::from_secs(60), 1);
  let mut removed = 0;
  for _ in 0..5 {
    removed += dirty.sweep().await.removed;
  }

  assert_eq!(removed, 1);
  assert!(ctx.store.sections_for("b.md").iter().all(|s| !s.is_dirty));
  assert_eq!(ctx.store.get_stats().await.expect("stats").dirty_count, 0);
}
