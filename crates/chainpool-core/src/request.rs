//! JSON-RPC 2.0 wire types.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::TransportError;

/// JSON-RPC request ID: string, number, or null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(u64),
    String(String),
    #[default]
    Null,
}

impl std::fmt::Display for RpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: RpcId,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request.
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id: RpcId::Number(id),
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// A JSON-RPC 2.0 response.
///
/// `result: null` is a legitimate answer (e.g. an unknown receipt), so a
/// present-but-null `result` deserializes to `Some(Value::Null)` and only a
/// missing member yields `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: RpcId,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

fn present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

impl JsonRpcResponse {
    /// Build a successful response (mostly useful for scripted transports).
    pub fn success(id: RpcId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn failure(id: RpcId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Returns `true` if this is a successful response (has result, no error).
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.result.is_some()
    }

    /// Check the envelope is well formed: version `2.0` and exactly one of
    /// `result` / `error`.
    pub fn check_envelope(&self) -> Result<(), String> {
        if self.jsonrpc != "2.0" {
            return Err(format!("unexpected jsonrpc version {:?}", self.jsonrpc));
        }
        match (&self.result, &self.error) {
            (Some(_), Some(_)) => Err("response carries both result and error".into()),
            (None, None) => Err("response carries neither result nor error".into()),
            _ => Ok(()),
        }
    }

    /// Unwrap the result value or return the node's error.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        if let Some(err) = self.error {
            Err(err)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

/// What goes on the wire for one round trip: a single object or a batch array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RequestPayload {
    Single(JsonRpcRequest),
    Batch(Vec<JsonRpcRequest>),
}

impl RequestPayload {
    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }

    /// Number of requests carried.
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Batch(reqs) => reqs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A validated response body, shaped like the request that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    Single(JsonRpcResponse),
    Batch(Vec<JsonRpcResponse>),
}

impl ResponsePayload {
    /// Parse a raw JSON body, requiring an array for batches and an object for
    /// single calls. Every element must be a well-formed envelope.
    pub fn parse(body: Value, batch: bool) -> Result<Self, TransportError> {
        match (body, batch) {
            (Value::Array(items), true) => {
                let mut responses = Vec::with_capacity(items.len());
                for (pos, item) in items.into_iter().enumerate() {
                    let resp = parse_envelope(item)
                        .map_err(|e| TransportError::InvalidEnvelope(format!("element {pos}: {e}")))?;
                    responses.push(resp);
                }
                Ok(Self::Batch(responses))
            }
            (item @ Value::Object(_), false) => parse_envelope(item)
                .map(Self::Single)
                .map_err(TransportError::InvalidEnvelope),
            (other, true) => Err(TransportError::InvalidEnvelope(format!(
                "expected a batch array, got {}",
                kind_of(&other)
            ))),
            (other, false) => Err(TransportError::InvalidEnvelope(format!(
                "expected a response object, got {}",
                kind_of(&other)
            ))),
        }
    }
}

fn parse_envelope(item: Value) -> Result<JsonRpcResponse, String> {
    if !item.is_object() {
        return Err(format!("expected a response object, got {}", kind_of(&item)));
    }
    let resp: JsonRpcResponse = serde_json::from_value(item).map_err(|e| e.to_string())?;
    resp.check_envelope()?;
    Ok(resp)
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
