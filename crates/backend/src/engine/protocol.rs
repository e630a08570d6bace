//! Line-delimited message envelopes exchanged with the engine process.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC "method not found".
pub const METHOD_NOT_FOUND: i32 = -32601;
/// JSON-RPC "internal error".
pub const INTERNAL_ERROR: i32 = -32603;

/// `{ jsonrpc, method, params, id }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
  pub jsonrpc: String,
  pub method: String,
  pub params: Value,
  pub id: u64,
}

impl OutboundMessage {
  pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
    Self {
      jsonrpc: JSONRPC_VERSION.to_string(),
      method: method.into(),
      params,
      id,
    }
  }
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
  pub code: i32,
  pub message: String,
  pub data: Option<Value>,
}

/// `{ id, result }` or `{ id, error }`
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
  pub id: Option<u64>,
  pub result: Option<Value>,
  pub error: Option<RpcError>,
}

impl InboundMessage {
  /// Parse one line. Blank lines yield `Ok(None)`.
  pub fn parse(line: &str) -> Result<Option<Self>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
      return Ok(None);
    }
    serde_json::from_str(line).map(Some)
  }

  /// The outcome for the waiting caller.
  pub fn into_outcome(self) -> Result<Value, RpcError> {
    match (self.error, self.result) {
      (Some(error), _) => Err(error),
      (None, Some(result)) => Ok(result),
      (None, None) => Ok(Value::Null),
    }
  }
}
