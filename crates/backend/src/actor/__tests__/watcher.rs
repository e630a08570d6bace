use std::{fs, time::Duration};

use tempfile::TempDir;
use tokio::{sync::mpsc, time::timeout};
use tokio_util::sync::CancellationToken;

use crate::{
  actor::{FileEvent, FileEventKind, WatcherTask},
  context::PathFilter,
  domain::config::{FilesConfig, WatcherConfig},
};

async fn next_event(rx: &mut mpsc::Receiver<FileEvent>) -> FileEvent {
  timeout(Duration::from_secs(5), rx.recv())
    .await
    .expect("timeout waiting for file event")
    .expect("watcher channel open")
}

#[tokio::test]
async fn test_watcher_task_integration() {
  let dir = TempDir::new().expect("tempdir");
  let filter = PathFilter::new(dir.path(), &FilesConfig::default()).expect("filter");
  let root = filter.root().to_path_buf();
  let config = WatcherConfig {
    debounce_ms: 50,
    await_write_finish_ms: 0,
    ..Default::default()
  };

  let (tx, mut rx) = mpsc::channel(16);
  let cancel = CancellationToken::new();
  let task = WatcherTask::spawn(filter, &config, tx, cancel.clone()).expect("watcher");

  // Give the watcher time to register
  tokio::time::sleep(Duration::from_millis(200)).await;

  fs::write(root.join("notes.txt"), "ignored").expect("write txt");
  let file = root.join("guide.md");
  fs::write(&file, "# Guide").expect("write");
  let event = next_event(&mut rx).await;
  assert_eq!(event.path, "guide.md");
  assert!(matches!(event.kind, FileEventKind::Add | FileEventKind::Change));

  fs::write(&file, "# Guide\nmore").expect("modify");
  assert_eq!(next_event(&mut rx).await, FileEvent::new(FileEventKind::Change, "guide.md"));

  fs::remove_file(&file).expect("remove");
  assert_eq!(next_event(&mut rx).await, FileEvent::new(FileEventKind::Unlink, "guide.md"));

  cancel.cancel();
  timeout(Duration::from_secs(2), task)
    .await
    .expect("watcher stops")
    .expect("join");
  assert!(rx.try_recv().is_err(), "txt file never produces an event");
}

#[tokio::test]
async fn test_watcher_stops_when_consumer_drops() {
  let dir = TempDir::new().expect("tempdir");
  let filter = PathFilter::new(dir.path(), &FilesConfig::default()).expect("filter");
  let root = filter.root().to_path_buf();
  let config = WatcherConfig {
    debounce_ms: 20,
    await_write_finish_ms: 0,
    ..Default::default()
  };

  let (tx, rx) = mpsc::channel(1);
  let task = WatcherTask::spawn(filter, &config, tx, CancellationToken::new()).expect("watcher");
  drop(rx);

  tokio::time::sleep(Duration::from_millis(100)).await;
  fs::write(root.join("a.md"), "# A").expect("write");

  timeout(Duration::from_secs(5), task)
    .await
    .expect("watcher exits once its consumer is gone")
    .expect("join");
}
