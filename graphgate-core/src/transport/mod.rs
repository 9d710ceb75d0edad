//! Minimal transport interface between the MCP dispatcher and the wire.
//!
//! The dispatcher only needs `{send, receive, close, on_close}`. HTTP
//! sessions use [`ChannelTransport`]; the stdio entry point uses
//! [`StdioTransport`] fed through a [`StartupBuffer`].

pub mod buffer;
pub mod channel;
pub mod stdio;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GraphGateError;

pub use buffer::{ChunkSink, StartupBuffer};
pub use channel::ChannelTransport;
pub use stdio::{LineFramer, MAX_MESSAGE_BYTES, StdioTransport};

/// Runs once when a transport closes.
pub type CloseCallback = Box<dyn FnOnce() + Send + 'static>;

/// Bidirectional JSON-RPC message channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a message to the client.
    async fn send(&self, message: Value) -> Result<(), TransportError>;

    /// Next message from the client. `None` once the transport is closed or
    /// the input reached EOF.
    async fn receive(&self) -> Option<Result<Value, FramingError>>;

    /// Close the transport. Closing twice is a no-op.
    async fn close(&self) -> Result<(), TransportError>;

    /// Register a callback for when the transport closes. Registering on an
    /// already-closed transport runs the callback immediately.
    fn on_close(&self, callback: CloseCallback);
}

/// Failure to deliver an outbound message.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Inbound bytes that do not form a JSON-RPC object.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum FramingError {
    /// Checked before JSON parsing.
    #[error("Message exceeds maximum size of {max_bytes} bytes")]
    MessageTooLarge { max_bytes: usize },

    #[error("Malformed JSON: {reason}")]
    MalformedJson { reason: String },

    #[error("JSON-RPC batch requests (arrays) are not supported")]
    UnsupportedBatch,

    #[error("Message must be a JSON object")]
    NotAnObject,
}

impl From<FramingError> for GraphGateError {
    fn from(err: FramingError) -> Self {
        match err {
            FramingError::MessageTooLarge { .. } | FramingError::MalformedJson { .. } => {
                GraphGateError::ParseError {
                    details: err.to_string(),
                }
            }
            FramingError::UnsupportedBatch | FramingError::NotAnObject => {
                GraphGateError::InvalidRequest {
                    details: err.to_string(),
                }
            }
        }
    }
}

/// Decode one framed message into a JSON object.
pub fn decode_message(bytes: &[u8]) -> Result<Value, FramingError> {
    if bytes.len() > MAX_MESSAGE_BYTES {
        return Err(FramingError::MessageTooLarge {
            max_bytes: MAX_MESSAGE_BYTES,
        });
    }
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| FramingError::MalformedJson {
            reason: e.to_string(),
        })?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Array(_) => Err(FramingError::UnsupportedBatch),
        _ => Err(FramingError::NotAnObject),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_message() {
        assert!(decode_message(br#"{"jsonrpc":"2.0","method":"ping","id":1}"#).is_ok());
        assert_eq!(
            decode_message(b"[1]").unwrap_err(),
            FramingError::UnsupportedBatch
        );
        assert_eq!(decode_message(b"42").unwrap_err(), FramingError::NotAnObject);
        assert!(matches!(
            decode_message(b"{oops").unwrap_err(),
            FramingError::MalformedJson { .. }
        ));
    }

    #[test]
    fn test_framing_error_codes() {
        let parse: GraphGateError = FramingError::MessageTooLarge { max_bytes: 1 }.into();
        assert_eq!(parse.to_jsonrpc_code(), -32700);
        let batch: GraphGateError = FramingError::UnsupportedBatch.into();
        assert_eq!(batch.to_jsonrpc_code(), -32600);
    }
}
