use chrono::Utc;
use pretty_assertions::assert_eq;

use crate::{
  actor::{INTERRUPTED_ERROR, SweepReport},
  domain::{IndexRequest, IndexRequestStatus, RequestUpdate, content_hash},
  engine::IndexStore,
  service::__tests__::helpers::TestContext,
};

fn status_of(ctx: &TestContext, id: &str) -> IndexRequestStatus {
  ctx
    .store
    .requests()
    .into_iter()
    .find(|r| r.id == id)
    .map(|r| r.status)
    .expect("request exists")
}

#[tokio::test]
async fn test_three_pending_edits_process_only_the_latest() {
  let ctx = TestContext::new();
  ctx.edit("guide.md", "# Guide\nv1").await;
  ctx.edit("guide.md", "# Guide\nv2").await;
  ctx.edit("guide.md", "# Guide\nv3").await;

  let requests = ctx.store.requests_for("guide.md");
  assert_eq!(requests.len(), 3);
  let (t1, t2, t3) = (&requests[0], &requests[1], &requests[2]);
  assert!(t1.created_at < t2.created_at && t2.created_at < t3.created_at);

  let report = ctx.worker.sweep().await;
  assert_eq!(
    report,
    SweepReport {
      processed: 1,
      completed: 1,
      failed: 0,
      skipped: 2,
    }
  );

  assert_eq!(status_of(&ctx, &t1.id), IndexRequestStatus::Skipped);
  assert_eq!(status_of(&ctx, &t2.id), IndexRequestStatus::Skipped);
  assert_eq!(status_of(&ctx, &t3.id), IndexRequestStatus::Completed);
  assert_eq!(ctx.store.add_calls(), 1);

  let sections = ctx.store.sections_for("guide.md");
  assert_eq!(sections.len(), 1);
  assert_eq!(sections[0].document_hash, content_hash("# Guide\nv3"));
}

#[tokio::test]
async fn test_replayed_request_is_a_no_op() {
  let ctx = TestContext::new();
  ctx.index("guide.md", "# Guide\nbody\n## Part\nmore").await;
  let before = ctx.store.sections_for("guide.md");
  assert_eq!(before.len(), 2);

  let hash = content_hash("# Guide\nbody\n## Part\nmore");
  let replay = ctx.store.create_index_request("guide.md", &hash).await.expect("request");
  let report = ctx.worker.sweep().await;

  assert_eq!(report.completed, 1);
  assert_eq!(status_of(&ctx, &replay.id), IndexRequestStatus::Completed);
  assert_eq!(ctx.store.add_calls(), 1);
  assert_eq!(ctx.store.sections_for("guide.md"), before);
}

#[tokio::test]
async fn test_stale_hash_completes_without_indexing() {
  let ctx = TestContext::new();
  ctx.edit("guide.md", "# Guide\nv1").await;
  let stale = ctx.store.requests_for("guide.md").remove(0);

  // The document moved on, but its event has not been delivered yet
  ctx.write("guide.md", "# Guide\nv2");
  ctx
    .sync
    .index_document("guide.md", false)
    .await
    .expect("manual index");
  let adds = ctx.store.add_calls();

  ctx.worker.sweep().await;
  assert_eq!(status_of(&ctx, &stale.id), IndexRequestStatus::Completed);
  assert_eq!(ctx.store.add_calls(), adds);
  assert!(ctx.store.sections_for("guide.md")[0].content.contains("v2"));
}

#[tokio::test]
async fn test_failures_are_isolated_per_request() {
  let ctx = TestContext::new();
  let orphan = ctx.store.create_index_request("orphan.md", "abc").await.expect("request");
  ctx.edit("good.md", "# Good\nbody").await;

  let report = ctx.worker.sweep().await;
  assert_eq!(report.processed, 2);
  assert_eq!(report.failed, 1);
  assert_eq!(report.completed, 1);

  let failed = ctx
    .store
    .requests()
    .into_iter()
    .find(|r| r.id == orphan.id)
    .expect("orphan");
  assert_eq!(failed.status, IndexRequestStatus::Failed);
  assert_eq!(failed.error.as_deref(), Some("Document not found: orphan.md"));
  assert!(failed.started_at.is_some());
  assert!(failed.completed_at.is_some());
  assert_eq!(ctx.store.sections_for("good.md").len(), 1);
}

#[tokio::test]
async fn test_engine_failure_marks_request_failed() {
  let ctx = TestContext::new();
  ctx.edit("guide.md", "# Guide\nbody").await;
  ctx.store.fail_adds(true);

  let report = ctx.worker.sweep().await;
  assert_eq!(report.failed, 1);
  let request = ctx.store.requests_for("guide.md").remove(0);
  assert_eq!(request.status, IndexRequestStatus::Failed);
  assert!(request.error.as_deref().is_some_and(|e| e.contains("embedding failed")));

  // No automatic retry; a new event queues a new request
  ctx.store.fail_adds(false);
  assert_eq!(ctx.worker.sweep().await, SweepReport::default());
  ctx.edit("guide.md", "# Guide\nbody again").await;
  assert_eq!(ctx.worker.sweep().await.completed, 1);
}

#[tokio::test]
async fn test_recover_requeues_interrupted_requests() {
  let ctx = TestContext::new();
  ctx.write("guide.md", "# Guide\nbody");
  ctx.sync.startup_sync().await.expect("sync");
  let queued = ctx.store.requests_for("guide.md").remove(0);

  // Simulate a crash mid-processing
  let stuck = IndexRequest {
    id: "stuck".into(),
    status: IndexRequestStatus::Processing,
    started_at: Some(Utc::now()),
    ..queued.clone()
  };
  ctx.store.insert_request(stuck);

  assert_eq!(ctx.worker.recover().await.expect("recover"), 1);
  let requests = ctx.store.requests_for("guide.md");
  let failed = requests.iter().find(|r| r.id == "stuck").expect("stuck");
  assert_eq!(failed.status, IndexRequestStatus::Failed);
  assert_eq!(failed.error.as_deref(), Some(INTERRUPTED_ERROR));

  let pending: Vec<_> = requests
    .iter()
    .filter(|r| r.status == IndexRequestStatus::Pending)
    .collect();
  assert_eq!(pending.len(), 2);
  assert!(pending.iter().all(|r| r.document_hash == queued.document_hash));

  let report = ctx.worker.sweep().await;
  assert_eq!(report.completed, 1);
  assert_eq!(report.skipped, 1);
  assert_eq!(ctx.store.sections_for("guide.md").len(), 1);
}

#[tokio::test]
async fn test_sweeps_converge_to_latest_hash() {
  let ctx = TestContext::new();
  for round in 0..4 {
    ctx.edit("a.md", &format!("# A\nround {round}")).await;
    ctx.edit("b.md", &format!("# B\nround {round}")).await;
    if round % 2 == 1 {
      ctx.worker.sweep().await;
    }
  }
  ctx.worker.sweep().await;

  for (path, content) in [("a.md", "# A\nround 3"), ("b.md", "# B\nround 3")] {
    let sections = ctx.store.sections_for(path);
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].document_hash, content_hash(content));
  }
  assert!(
    ctx
      .store
      .requests()
      .iter()
      .all(|r| !r.status.is_outstanding())
  );
}

#[tokio::test]
async fn test_same_millisecond_requests_are_skipped() {
  let ctx = TestContext::new();
  ctx.edit("guide.md", "# Guide\nbody").await;
  let first = ctx.store.requests_for("guide.md").remove(0);
  let twin = IndexRequest {
    id: "twin".into(),
    ..first.clone()
  };
  ctx.store.insert_request(twin);

  let report = ctx.worker.sweep().await;
  assert_eq!(
    report,
    SweepReport {
      processed: 1,
      completed: 1,
      failed: 0,
      skipped: 1,
    }
  );
  assert_eq!(status_of(&ctx, &first.id), IndexRequestStatus::Skipped);
  assert_eq!(status_of(&ctx, "twin"), IndexRequestStatus::Completed);
  assert_eq!(ctx.store.add_calls(), 1);

  // Nothing is left to index a second time
  assert_eq!(ctx.worker.sweep().await, SweepReport::default());
}

#[tokio::test]
async fn test_finished_requests_never_move_backwards() {
  let ctx = TestContext::new();
  ctx.index("guide.md", "# Guide\nbody").await;
  let done = ctx.store.requests_for("guide.md").remove(0);
  assert_eq!(done.status, IndexRequestStatus::Completed);

  let err = ctx
    .store
    .update_index_request(&done.id, &RequestUpdate::processing(Utc::now()))
    .await
    .unwrap_err();
  assert!(err.to_string().contains("completed -> processing"));
  assert_eq!(status_of(&ctx, &done.id), IndexRequestStatus::Completed);

  // Bulk updates leave finished requests alone
  let filter = crate::domain::BulkRequestFilter {
    document_path: Some("guide.md".into()),
    ..Default::default()
  };
  let touched = ctx
    .store
    .update_many_index_requests(&filter, &RequestUpdate::skipped(Utc::now()))
    .await
    .expect("bulk");
  assert_eq!(touched, 0);
  assert_eq!(status_of(&ctx, &done.id), IndexRequestStatus::Completed);
}
