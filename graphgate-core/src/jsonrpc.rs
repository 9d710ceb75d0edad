//! JSON-RPC 2.0 message types, parsing and classification.
//!
//! Both transports hand the dispatcher an already-decoded `serde_json::Value`.
//! [`parse_bytes`] turns raw bytes (an HTTP body or an NDJSON line) into that
//! value and [`parse_message`] validates the envelope.
//!
//! # JSON-RPC 2.0 Compliance
//!
//! - Requests have `id`, `method`, and optional `params`
//! - Notifications are requests without `id`
//! - `id` type (string or integer) is preserved in responses
//! - Batches are rejected with an invalid-request error

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::borrow::Cow;
use uuid::Uuid;

use crate::error::GraphGateError;
use crate::error::jsonrpc::JsonRpcError;

/// JSON-RPC 2.0 version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// Generate a correlation id for an error response.
pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// JSON-RPC 2.0 request ID.
///
/// Never coerce between types: if the client sends `"id": 1`, respond with
/// `"id": 1`, not `"id": "1"`. An explicit `"id": null` is distinct from a
/// missing `id` (which marks a notification).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JsonRpcId {
    /// Integer ID (e.g., `"id": 1`)
    Number(i64),
    /// String ID (e.g., `"id": "abc-123"`)
    String(String),
    /// Explicit null ID
    Null,
}

impl JsonRpcId {
    /// Parse an id from a JSON value. Floats, booleans, arrays and objects
    /// are not valid ids.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(JsonRpcId::Number),
            Value::String(s) => Some(JsonRpcId::String(s.clone())),
            Value::Null => Some(JsonRpcId::Null),
            _ => None,
        }
    }

    /// Convert back into the JSON value the client sent.
    pub fn to_value(&self) -> Value {
        match self {
            JsonRpcId::Number(n) => Value::from(*n),
            JsonRpcId::String(s) => Value::String(s.clone()),
            JsonRpcId::Null => Value::Null,
        }
    }
}

impl std::fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsonRpcId::Number(n) => write!(f, "{n}"),
            JsonRpcId::String(s) => write!(f, "{s:?}"),
            JsonRpcId::Null => f.write_str("null"),
        }
    }
}

impl Serialize for JsonRpcId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            JsonRpcId::Number(n) => serializer.serialize_i64(*n),
            JsonRpcId::String(s) => serializer.serialize_str(s),
            JsonRpcId::Null => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for JsonRpcId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        JsonRpcId::from_value(&value).ok_or_else(|| {
            serde::de::Error::custom("JSON-RPC ID must be string, integer, or null")
        })
    }
}

/// Transport-agnostic JSON-RPC 2.0 message classification.
///
/// Determined by presence/absence of `id` and `method` fields:
/// - Request: has both `id` and `method`
/// - Response: has `id` but no `method`
/// - Notification: has `method` but no `id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonRpcMessageKind {
    /// A request expecting a response.
    Request { id: JsonRpcId, method: String },
    /// A response to a server-initiated request.
    Response { id: JsonRpcId },
    /// A fire-and-forget notification.
    Notification { method: String },
}

/// Errors that can occur during JSON-RPC message classification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JsonRpcClassifyError {
    /// The `jsonrpc` field is missing or not `"2.0"`.
    #[error("missing or invalid jsonrpc version field")]
    InvalidVersion,
    /// The `id` field is present but not a valid JSON-RPC ID.
    #[error("invalid id field")]
    InvalidId,
    /// The `method` field is present but not a string.
    #[error("method must be a string")]
    InvalidMethod,
    /// The message has neither `id` nor `method`.
    #[error("message has neither id nor method")]
    Unclassifiable,
}

/// Classify a parsed JSON-RPC value without taking ownership.
pub fn classify_jsonrpc(value: &Value) -> Result<JsonRpcMessageKind, JsonRpcClassifyError> {
    let version = value.get("jsonrpc").and_then(|v| v.as_str());
    if version != Some(JSONRPC_VERSION) {
        return Err(JsonRpcClassifyError::InvalidVersion);
    }

    let id = match value.get("id") {
        Some(raw) => Some(JsonRpcId::from_value(raw).ok_or(JsonRpcClassifyError::InvalidId)?),
        None => None,
    };
    let method = match value.get("method") {
        Some(Value::String(m)) => Some(m.clone()),
        Some(_) => return Err(JsonRpcClassifyError::InvalidMethod),
        None => None,
    };

    match (id, method) {
        (Some(id), Some(method)) => Ok(JsonRpcMessageKind::Request { id, method }),
        (Some(id), None) => Ok(JsonRpcMessageKind::Response { id }),
        (None, Some(method)) => Ok(JsonRpcMessageKind::Notification { method }),
        (None, None) => Err(JsonRpcClassifyError::Unclassifiable),
    }
}

/// Best-effort id extraction for error responses to invalid envelopes.
pub fn extract_id(value: &Value) -> Option<JsonRpcId> {
    value.get("id").and_then(JsonRpcId::from_value)
}

/// Validated inbound JSON-RPC request or notification.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcRequest {
    /// Request ID (None for notifications)
    pub id: Option<JsonRpcId>,
    /// Method name
    pub method: String,
    /// Method parameters
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Returns true if this is a notification (no ID).
    #[inline]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Returns true for an `initialize` request.
    pub fn is_initialize(&self) -> bool {
        self.method == "initialize" && self.id.is_some()
    }
}

/// A validated inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// Request or notification from the client.
    Request(JsonRpcRequest),
    /// Response from the client to a server-initiated request.
    Response { id: JsonRpcId },
}

/// Decode raw bytes into a single JSON-RPC object.
///
/// # Errors
///
/// - `ParseError` for empty input or invalid JSON
/// - `InvalidRequest` for batches (arrays) and non-object values
pub fn parse_bytes(bytes: &[u8]) -> Result<Value, GraphGateError> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(GraphGateError::ParseError {
            details: "Invalid JSON: empty input".to_string(),
        });
    }

    let value: Value = serde_json::from_slice(bytes).map_err(|e| GraphGateError::ParseError {
        details: format!("Invalid JSON: {e}"),
    })?;

    match value {
        Value::Object(_) => Ok(value),
        Value::Array(_) => Err(GraphGateError::InvalidRequest {
            details: "Batch requests are not supported".to_string(),
        }),
        _ => Err(GraphGateError::InvalidRequest {
            details: "Request must be an object".to_string(),
        }),
    }
}

/// Validate a decoded JSON-RPC envelope.
///
/// # Errors
///
/// Returns `InvalidRequest` if the version, id, method or params fields are
/// not valid JSON-RPC 2.0.
pub fn parse_message(value: Value) -> Result<IncomingMessage, GraphGateError> {
    let kind = classify_jsonrpc(&value).map_err(|e| GraphGateError::InvalidRequest {
        details: e.to_string(),
    })?;

    let (id, method) = match kind {
        JsonRpcMessageKind::Response { id } => return Ok(IncomingMessage::Response { id }),
        JsonRpcMessageKind::Request { id, method } => (Some(id), method),
        JsonRpcMessageKind::Notification { method } => (None, method),
    };

    let params = match value {
        Value::Object(mut obj) => obj.remove("params"),
        _ => None,
    };
    if let Some(p) = &params {
        if !p.is_object() && !p.is_array() {
            return Err(GraphGateError::InvalidRequest {
                details: "params must be an object or array".to_string(),
            });
        }
    }

    Ok(IncomingMessage::Request(JsonRpcRequest { id, method, params }))
}

/// JSON-RPC 2.0 response.
///
/// The `id` field always serializes: `None` becomes `"id": null`, which is
/// what a parse-error response carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always "2.0"
    pub jsonrpc: Cow<'static, str>,
    /// Request ID
    pub id: Option<JsonRpcId>,
    /// Result (mutually exclusive with error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (mutually exclusive with result)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Option<JsonRpcId>, result: Value) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Option<JsonRpcId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Create an error response from a protocol error, minting a fresh
    /// correlation id.
    pub fn from_error(id: Option<JsonRpcId>, error: &GraphGateError) -> Self {
        Self::error(id, error.to_jsonrpc_error(&new_correlation_id()))
    }

    /// Serialize into a JSON value for the transport.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
