//! Supervised JSON-RPC channel to the engine process.
//!
//! One writer task owns the child's stdin, one reader task routes responses
//! by id, and a supervisor owns the [`Child`] and fails every pending call the
//! moment the process goes away. Calls carry their own timeout so a slow call
//! never blocks the others.

use std::{
  path::{Path, PathBuf},
  process::Stdio,
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::{
  process::{Child, ChildStderr, ChildStdin, ChildStdout, Command},
  sync::{Mutex, RwLock, mpsc, oneshot},
  task::JoinHandle,
  time::Instant,
};
use tokio_util::{
  codec::{AnyDelimiterCodec, FramedRead, FramedWrite, LinesCodec},
  sync::CancellationToken,
};
use tracing::{debug, error, info, trace, warn};

use super::{
  EngineError, IndexStore, Result,
  fields::{INDEX_REQUEST_FIELDS, SECTION_FIELDS, from_engine, to_engine},
  protocol::{InboundMessage, OutboundMessage},
  types::{self, EngineQuery, EngineStats, ModelInfo, SearchHit},
};
use crate::domain::{
  BulkRequestFilter, IndexRequest, IndexRequestStatus, RequestFilter, RequestUpdate, Section,
  config::{EngineConfig, IndexingConfig},
};

/// Longest line echoed back in a parse warning.
const MAX_LOGGED_LINE: usize = 200;

#[derive(Debug, Clone)]
pub struct ChannelOptions {
  pub command: String,
  pub args: Vec<String>,
  pub working_dir: Option<PathBuf>,
  pub ready_poll: Duration,
  pub ready_timeout: Duration,
  pub ping_timeout: Duration,
  pub request_timeout: Duration,
}

impl ChannelOptions {
  /// Options for the configured engine, pointed at `index_path`.
  pub fn from_config(engine: &EngineConfig, indexing: &IndexingConfig, index_path: &Path, root: &Path) -> Self {
    let mut args = engine.args.clone();
    args.push(format!("--db-path={}", index_path.display()));
    args.push(format!("--model={}", indexing.embedding_model));

    Self {
      command: engine.command.clone(),
      args,
      working_dir: Some(engine.working_dir.clone().unwrap_or_else(|| root.to_path_buf())),
      ready_poll: Duration::from_millis(engine.ready_poll_ms),
      ready_timeout: Duration::from_secs(engine.ready_timeout_secs),
      ping_timeout: Duration::from_millis(engine.ping_timeout_ms),
      request_timeout: Duration::from_millis(engine.request_timeout_ms),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
  Disconnected = 0,
  Connecting = 1,
  Ready = 2,
}

impl ChannelState {
  fn from_u8(value: u8) -> Self {
    match value {
      1 => Self::Connecting,
      2 => Self::Ready,
      _ => Self::Disconnected,
    }
  }
}

type Reply = oneshot::Sender<Result<Value>>;

/// How a session ended.
enum Exit {
  Exited(String),
  Killed,
}

/// State shared between the channel handle and its background tasks.
struct Shared {
  pending: DashMap<u64, Reply>,
  next_id: AtomicU64,
  state: AtomicU8,
  initialized: AtomicBool,
  outbound: RwLock<Option<mpsc::Sender<String>>>,
}

impl Shared {
  fn state(&self) -> ChannelState {
    ChannelState::from_u8(self.state.load(Ordering::SeqCst))
  }

  fn set_state(&self, state: ChannelState) {
    self.state.store(state as u8, Ordering::SeqCst);
  }

  /// Route one line from the engine to its waiting caller.
  fn dispatch(&self, line: &str) {
    let message = match InboundMessage::parse(line) {
      Ok(Some(message)) => message,
      Ok(None) => return,
      Err(e) => {
        let shown: String = line.chars().take(MAX_LOGGED_LINE).collect();
        warn!(error = %e, line = %shown, "Dropping unparseable engine output");
        return;
      }
    };

    let Some(id) = message.id else {
      warn!("Engine message without id");
      return;
    };

    match self.pending.remove(&id) {
      Some((_, reply)) => {
        let outcome = message.into_outcome().map_err(EngineError::from);
        if reply.send(outcome).is_err() {
          trace!(id, "Caller gone before response arrived");
        }
      }
      None => warn!(id, "Response for unknown or expired request"),
    }
  }

  fn fail_pending(&self, make_error: impl Fn() -> EngineError) {
    let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
      if let Some((_, reply)) = self.pending.remove(&id) {
        let _ = reply.send(Err(make_error()));
      }
    }
  }

  async fn teardown(&self, exit: Exit) {
    self.set_state(ChannelState::Disconnected);
    self.initialized.store(false, Ordering::SeqCst);
    *self.outbound.write().await = None;

    match exit {
      Exit::Exited(status) => self.fail_pending(|| EngineError::ProcessExited(status.clone())),
      Exit::Killed => self.fail_pending(|| EngineError::Disconnected),
    }
  }
}

/// Background tasks of one engine process.
struct Session {
  kill: CancellationToken,
  supervisor: JoinHandle<()>,
  io_tasks: Vec<JoinHandle<()>>,
}

impl Session {
  async fn shutdown(self) {
    self.kill.cancel();
    if let Err(e) = self.supervisor.await {
      warn!(error = %e, "Engine supervisor task failed");
    }
    for task in self.io_tasks {
      task.abort();
    }
  }
}

/// Handle to the engine process.
pub struct EngineChannel {
  options: ChannelOptions,
  shared: Arc<Shared>,
  session: Mutex<Option<Session>>,
  model: Mutex<Option<ModelInfo>>,
}

impl EngineChannel {
  pub fn new(options: ChannelOptions) -> Self {
    Self {
      options,
      shared: Arc::new(Shared {
        pending: DashMap::new(),
        next_id: AtomicU64::new(1),
        state: AtomicU8::new(ChannelState::Disconnected as u8),
        initialized: AtomicBool::new(false),
        outbound: RwLock::new(None),
      }),
      session: Mutex::new(None),
      model: Mutex::new(None),
    }
  }

  pub fn state(&self) -> ChannelState {
    self.shared.state()
  }

  pub fn is_ready(&self) -> bool {
    self.state() == ChannelState::Ready
  }

  pub fn is_initialized(&self) -> bool {
    self.shared.initialized.load(Ordering::SeqCst)
  }

  /// Number of calls awaiting a response.
  pub fn pending_calls(&self) -> usize {
    self.shared.pending.len()
  }

  // ==========================================================================
  // Lifecycle
  // ==========================================================================

  /// Start the engine and wait until it answers `ping`. Idempotent.
  pub async fn connect(&self) -> Result<()> {
    let mut session = self.session.lock().await;
    if self.state() == ChannelState::Ready {
      return Ok(());
    }

    // A previous process died on its own; reap its tasks first
    if let Some(stale) = session.take() {
      stale.shutdown().await;
    }

    *session = Some(self.spawn().await?);

    match self.wait_for_ready().await {
      Ok(()) => {
        self.shared.set_state(ChannelState::Ready);
        info!(command = %self.options.command, "Engine ready");
        Ok(())
      }
      Err(e) => {
        error!(error = %e, "Engine failed to become ready");
        if let Some(failed) = session.take() {
          failed.shutdown().await;
        }
        Err(e)
      }
    }
  }

  async fn spawn(&self) -> Result<Session> {
    let mut command = Command::new(&self.options.command);
    command
      .args(&self.options.args)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    if let Some(dir) = &self.options.working_dir {
      command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|e| EngineError::Spawn {
      command: self.options.command.clone(),
      message: e.to_string(),
    })?;
    info!(command = %self.options.command, args = ?self.options.args, pid = ?child.id(), "Spawned engine");

    let stdin = child.stdin.take().ok_or_else(|| EngineError::Io("engine stdin unavailable".into()))?;
    let stdout = child.stdout.take().ok_or_else(|| EngineError::Io("engine stdout unavailable".into()))?;
    let stderr = child.stderr.take();

    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    *self.shared.outbound.write().await = Some(outbound_tx);
    self.shared.set_state(ChannelState::Connecting);

    let mut io_tasks = vec![
      tokio::spawn(write_loop(stdin, outbound_rx)),
      tokio::spawn(read_loop(Arc::clone(&self.shared), stdout)),
    ];
    if let Some(stderr) = stderr {
      io_tasks.push(tokio::spawn(forward_stderr(stderr)));
    }

    let kill = CancellationToken::new();
    let supervisor = tokio::spawn(supervise(Arc::clone(&self.shared), child, kill.clone()));

    Ok(Session {
      kill,
      supervisor,
      io_tasks,
    })
  }

  async fn wait_for_ready(&self) -> Result<()> {
    let deadline = Instant::now() + self.options.ready_timeout;
    let mut attempt = 0u32;

    loop {
      attempt += 1;
      match self.call_raw("ping", json!({}), self.options.ping_timeout).await {
        Ok(_) => {
          debug!(attempt, "Engine answered ping");
          return Ok(());
        }
        Err(e) if e.is_connection_lost() => return Err(e),
        Err(e) => debug!(attempt, error = %e, "Engine not ready yet"),
      }

      if Instant::now() + self.options.ready_poll >= deadline {
        return Err(EngineError::StartupTimeout(self.options.ready_timeout.as_secs()));
      }
      tokio::time::sleep(self.options.ready_poll).await;
    }
  }

  /// Stop the engine process. Pending calls fail with `Disconnected`. Idempotent.
  pub async fn disconnect(&self) {
    let session = self.session.lock().await.take();
    if let Some(session) = session {
      session.shutdown().await;
      info!("Engine disconnected");
    }
    *self.model.lock().await = None;
  }

  // ==========================================================================
  // Calls
  // ==========================================================================

  /// Send one call and wait for its response or `timeout`.
  pub async fn call_raw(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
    if self.state() == ChannelState::Disconnected {
      return Err(EngineError::NotConnected);
    }
    let sender = self.shared.outbound.read().await.clone().ok_or(EngineError::NotConnected)?;

    let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
    let line = serde_json::to_string(&OutboundMessage::new(id, method, params))?;

    let (reply_tx, reply_rx) = oneshot::channel();
    self.shared.pending.insert(id, reply_tx);

    // Teardown may have drained the table just before our insert
    if self.state() == ChannelState::Disconnected {
      self.shared.pending.remove(&id);
      return Err(EngineError::NotConnected);
    }

    trace!(id, method, "Engine call");
    if sender.send(line).await.is_err() {
      self.shared.pending.remove(&id);
      return Err(EngineError::Disconnected);
    }

    match tokio::time::timeout(timeout, reply_rx).await {
      Ok(Ok(outcome)) => outcome,
      Ok(Err(_)) => Err(EngineError::Disconnected),
      Err(_) => {
        self.shared.pending.remove(&id);
        warn!(id, method, timeout_ms = timeout.as_millis() as u64, "Engine call timed out");
        Err(EngineError::Timeout {
          method: method.to_string(),
          timeout_ms: timeout.as_millis() as u64,
        })
      }
    }
  }

  /// Send a call with the default request timeout. Requires a ready channel.
  pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
    if !self.is_ready() {
      return Err(EngineError::NotConnected);
    }
    self.call_raw(method, params, self.options.request_timeout).await
  }

  /// A data-bearing call: requires the model to be initialized.
  async fn call(&self, method: &str, params: Value) -> Result<Value> {
    if !self.is_ready() {
      return Err(EngineError::NotConnected);
    }
    if !self.is_initialized() {
      return Err(EngineError::NotInitialized);
    }
    self.call_raw(method, params, self.options.request_timeout).await
  }

  pub async fn ping(&self) -> Result<()> {
    self.call_raw("ping", json!({}), self.options.ping_timeout).await?;
    Ok(())
  }

  /// Load the embedding model. Only the first successful call reaches the engine.
  pub async fn init_model(&self) -> Result<ModelInfo> {
    let mut model = self.model.lock().await;
    if let Some(info) = model.as_ref()
      && self.is_initialized()
    {
      return Ok(info.clone());
    }

    let raw = self.request("initModel", json!({})).await?;
    let info: ModelInfo = serde_json::from_value(raw)?;
    if !info.success {
      return Err(EngineError::InitFailed(
        info.model_name.clone().unwrap_or_else(|| "unknown model".into()),
      ));
    }

    info!(model = ?info.model_name, dimension = ?info.dimension, "Engine model initialized");
    self.shared.initialized.store(true, Ordering::SeqCst);
    *model = Some(info.clone());
    Ok(info)
  }
}

/// Pull `key` out of an object result.
fn take_field(mut value: Value, key: &str) -> Result<Value> {
  value
    .get_mut(key)
    .map(Value::take)
    .ok_or_else(|| EngineError::Serde(format!("engine result is missing '{key}'")))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
  Ok(serde_json::from_value(value)?)
}

fn decode_sections(result: Value) -> Result<Vec<Section>> {
  decode(from_engine(take_field(result, "sections")?, SECTION_FIELDS))
}

#[async_trait]
impl IndexStore for EngineChannel {
  #[tracing::instrument(level = "trace", skip(self, sections), fields(count = sections.len()))]
  async fn add_sections(&self, sections: &[Section]) -> Result<usize> {
    if sections.is_empty() {
      return Ok(0);
    }
    let records = to_engine(serde_json::to_value(sections)?, SECTION_FIELDS);
    let result = self.call("addSections", json!({ "sections": records })).await?;
    decode(take_field(result, "count")?)
  }

  #[tracing::instrument(level = "trace", skip(self))]
  async fn search(&self, query: &EngineQuery) -> Result<Vec<SearchHit>> {
    let result = self.call("search", query.to_params()).await?;
    decode(from_engine(take_field(result, "results")?, SECTION_FIELDS))
  }

  async fn get_sections_by_path(&self, document_path: &str) -> Result<Vec<Section>> {
    let result = self
      .call("getSectionsByPath", json!({ "documentPath": document_path }))
      .await?;
    decode_sections(result)
  }

  async fn get_section_by_id(&self, id: &str) -> Result<Option<Section>> {
    match self.call("getSectionById", json!({ "sectionId": id })).await {
      Ok(result) => decode(from_engine(take_field(result, "section")?, SECTION_FIELDS)).map(Some),
      Err(EngineError::Rpc { message, .. }) if message.starts_with("Section not found") => Ok(None),
      Err(e) => Err(e),
    }
  }

  async fn delete_sections_by_path(&self, document_path: &str) -> Result<()> {
    self
      .call("deleteSectionsByPath", json!({ "documentPath": document_path }))
      .await?;
    Ok(())
  }

  async fn delete_sections_by_ids(&self, ids: &[String]) -> Result<()> {
    self.call("deleteSectionsByIds", json!({ "sectionIds": ids })).await?;
    Ok(())
  }

  async fn find_sections_by_path_and_hash(&self, document_path: &str, document_hash: &str) -> Result<Vec<Section>> {
    let result = self
      .call(
        "findSectionsByPathAndHash",
        json!({ "documentPath": document_path, "documentHash": document_hash }),
      )
      .await?;
    decode_sections(result)
  }

  async fn delete_sections_by_path_except_hash(&self, document_path: &str, keep_hash: &str) -> Result<()> {
    self
      .call(
        "deleteSectionsByPathExceptHash",
        json!({ "documentPath": document_path, "documentHash": keep_hash }),
      )
      .await?;
    Ok(())
  }

  async fn mark_dirty(&self, document_path: &str) -> Result<()> {
    self.call("markDirty", json!({ "documentPath": document_path })).await?;
    Ok(())
  }

  async fn get_dirty_sections(&self, limit: usize) -> Result<Vec<Section>> {
    let result = self.call("getDirtySections", json!({ "limit": limit })).await?;
    decode_sections(result)
  }

  async fn get_stats(&self) -> Result<EngineStats> {
    let result = self.call("getStats", json!({})).await?;
    decode(result)
  }

  async fn create_index_request(&self, document_path: &str, document_hash: &str) -> Result<IndexRequest> {
    let result = self
      .call("createIndexRequest", types::create_request_params(document_path, document_hash))
      .await?;
    decode(from_engine(result, INDEX_REQUEST_FIELDS))
  }

  async fn find_index_requests(&self, filter: &RequestFilter) -> Result<Vec<IndexRequest>> {
    let result = self
      .call("findIndexRequests", types::find_requests_params(filter))
      .await?;
    decode(from_engine(take_field(result, "requests")?, INDEX_REQUEST_FIELDS))
  }

  async fn update_index_request(&self, id: &str, update: &RequestUpdate) -> Result<()> {
    self
      .call("updateIndexRequest", types::update_request_params(id, update))
      .await?;
    Ok(())
  }

  async fn update_many_index_requests(&self, filter: &BulkRequestFilter, update: &RequestUpdate) -> Result<usize> {
    let result = self
      .call("updateManyIndexRequests", types::update_many_params(filter, update))
      .await?;
    decode(take_field(result, "count")?)
  }

  async fn get_paths_with_status(&self, statuses: &[IndexRequestStatus]) -> Result<Vec<String>> {
    let names: Vec<&str> = statuses.iter().map(IndexRequestStatus::as_str).collect();
    let result = self
      .call("getPathsWithStatus", json!({ "statuses": names }))
      .await?;
    decode(take_field(result, "paths")?)
  }
}

// ============================================================================
// Background tasks
// ============================================================================

async fn write_loop(stdin: ChildStdin, mut outbound: mpsc::Receiver<String>) {
  let mut sink = FramedWrite::new(stdin, LinesCodec::new());
  while let Some(line) = outbound.recv().await {
    if let Err(e) = sink.send(line).await {
      error!(error = %e, "Failed to write to engine");
      break;
    }
  }
  debug!("Engine writer exited");
}

/// Reassembles lines across partial reads; a bad line is logged, never fatal.
async fn read_loop(shared: Arc<Shared>, stdout: ChildStdout) {
  let mut lines = FramedRead::new(stdout, AnyDelimiterCodec::new(b"\n".to_vec(), Vec::new()));
  while let Some(frame) = lines.next().await {
    match frame {
      Ok(bytes) => {
        let line = String::from_utf8_lossy(&bytes);
        shared.dispatch(line.trim_end_matches('\r'));
      }
      Err(e) => {
        error!(error = %e, "Failed to read from engine");
        break;
      }
    }
  }
  debug!("Engine reader exited");
}

async fn forward_stderr(stderr: ChildStderr) {
  let mut lines = FramedRead::new(stderr, LinesCodec::new());
  while let Some(line) = lines.next().await {
    match line {
      Ok(line) => debug!(target: "searchdocs::engine::stderr", "{line}"),
      Err(e) => {
        debug!(error = %e, "Engine stderr closed");
        break;
      }
    }
  }
}

async fn supervise(shared: Arc<Shared>, mut child: Child, kill: CancellationToken) {
  let exit = tokio::select! {
    status = child.wait() => {
      let status = match status {
        Ok(status) => status.to_string(),
        Err(e) => e.to_string(),
      };
      warn!(status = %status, "Engine process exited");
      Exit::Exited(status)
    }
    _ = kill.cancelled() => {
      if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill engine process");
      }
      Exit::Killed
    }
  };
  shared.teardown(exit).await;
}
