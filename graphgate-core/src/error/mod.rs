//! Error handling for GraphGate.
//!
//! This module defines the protocol-facing error type and its JSON-RPC 2.0
//! representation.
//!
//! ## Module Organization
//!
//! - `jsonrpc` - JSON-RPC 2.0 error response structures
//! - `GraphGateError` - errors surfaced to MCP clients on either transport
//!
//! Internal failure causes (token exchange, GraphQL calls, argument shaping)
//! have their own error types next to the code that produces them and are
//! collapsed into a `GraphGateError` at the protocol boundary.

pub mod jsonrpc;

use jsonrpc::{ErrorData, JsonRpcError};
use thiserror::Error;

use crate::auth::EndpointKind;

/// All error types that can be returned to an MCP client.
///
/// Each variant maps to a JSON-RPC error code and a machine-readable
/// `error_type`. Upstream GraphQL failures are deliberately absent: they are
/// reported as tool results with `isError: true`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphGateError {
    /// Invalid JSON in the request body or NDJSON line.
    #[error("Parse error: {details}")]
    ParseError {
        /// Description of the parse error
        details: String,
    },

    /// Request is not a valid JSON-RPC 2.0 message.
    #[error("Invalid Request: {details}")]
    InvalidRequest {
        /// Description of what makes the request invalid
        details: String,
    },

    /// The requested method does not exist.
    #[error("Method not found: {method}")]
    MethodNotFound {
        /// The method name that was not found
        method: String,
    },

    /// The method parameters are invalid.
    #[error("Invalid params: {details}")]
    InvalidParams {
        /// Description of the parameter validation failure
        details: String,
    },

    /// Missing or invalid credential.
    ///
    /// The specific cause (malformed key, rejected by the token endpoint,
    /// token endpoint unreachable) is logged but never returned.
    #[error("Unauthorized: invalid or missing credentials")]
    Unauthorized,

    /// A session id was presented that the server does not know.
    #[error("Session not found")]
    SessionNotFound,

    /// A session id was presented on an endpoint other than the one it was
    /// created under.
    #[error("Session was created on the {session_endpoint} endpoint and cannot be used on {requested_endpoint}")]
    SessionEndpointMismatch {
        /// Endpoint recorded for the session
        session_endpoint: EndpointKind,
        /// Endpoint the request arrived on
        requested_endpoint: EndpointKind,
    },

    /// A request without a session id that is not an `initialize` request.
    #[error("Bad Request: {details}")]
    MalformedRequest {
        /// What was missing
        details: String,
    },

    /// The server is shutting down and does not accept new sessions.
    #[error("Service unavailable: {reason}")]
    ServiceUnavailable {
        /// Reason for unavailability
        reason: String,
    },

    /// Internal server error.
    #[error("Internal error. Reference: {correlation_id}")]
    InternalError {
        /// Correlation ID for finding the failure in logs
        correlation_id: String,
    },
}

impl GraphGateError {
    /// Maps the error to its JSON-RPC 2.0 error code.
    ///
    /// Standard codes (-32700 to -32603) are used for protocol errors;
    /// GraphGate codes (-32000 to -32003) for transport and auth errors.
    pub fn to_jsonrpc_code(&self) -> i32 {
        match self {
            Self::ParseError { .. } => -32700,
            Self::InvalidRequest { .. } => -32600,
            Self::MethodNotFound { .. } => -32601,
            Self::InvalidParams { .. } => -32602,
            Self::InternalError { .. } => -32603,

            Self::MalformedRequest { .. } => -32000,
            Self::Unauthorized => -32001,
            Self::SessionNotFound | Self::SessionEndpointMismatch { .. } => -32002,
            Self::ServiceUnavailable { .. } => -32003,
        }
    }

    /// Returns the error type name for metrics and logging.
    pub fn error_type_name(&self) -> &'static str {
        match self {
            Self::ParseError { .. } => "parse_error",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::MethodNotFound { .. } => "method_not_found",
            Self::InvalidParams { .. } => "invalid_params",
            Self::Unauthorized => "unauthorized",
            Self::SessionNotFound => "session_not_found",
            Self::SessionEndpointMismatch { .. } => "session_endpoint_mismatch",
            Self::MalformedRequest { .. } => "malformed_request",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::InternalError { .. } => "internal_error",
        }
    }

    /// Returns safe details for client consumption (no sensitive data).
    pub fn safe_details(&self) -> Option<serde_json::Value> {
        match self {
            Self::MethodNotFound { method } => Some(serde_json::json!({ "method": method })),
            Self::SessionEndpointMismatch {
                session_endpoint,
                requested_endpoint,
            } => Some(serde_json::json!({
                "session_endpoint": session_endpoint.as_str(),
                "requested_endpoint": requested_endpoint.as_str(),
            })),
            _ => None,
        }
    }

    /// Converts the error to a JSON-RPC error object.
    pub fn to_jsonrpc_error(&self, correlation_id: &str) -> JsonRpcError {
        JsonRpcError {
            code: self.to_jsonrpc_code(),
            message: self.to_string(),
            data: Some(ErrorData {
                correlation_id: correlation_id.to_string(),
                error_type: self.error_type_name().to_string(),
                details: self.safe_details(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            GraphGateError::ParseError {
                details: "x".to_string()
            }
            .to_jsonrpc_code(),
            -32700
        );
        assert_eq!(
            GraphGateError::InvalidRequest {
                details: "x".to_string()
            }
            .to_jsonrpc_code(),
            -32600
        );
        assert_eq!(
            GraphGateError::MethodNotFound {
                method: "x".to_string()
            }
            .to_jsonrpc_code(),
            -32601
        );
        assert_eq!(
            GraphGateError::InvalidParams {
                details: "x".to_string()
            }
            .to_jsonrpc_code(),
            -32602
        );
        assert_eq!(GraphGateError::Unauthorized.to_jsonrpc_code(), -32001);
        assert_eq!(GraphGateError::SessionNotFound.to_jsonrpc_code(), -32002);
        assert_eq!(
            GraphGateError::MalformedRequest {
                details: "x".to_string()
            }
            .to_jsonrpc_code(),
            -32000
        );
    }

    #[test]
    fn test_session_errors_share_code_but_not_type() {
        let unknown = GraphGateError::SessionNotFound;
        let mismatch = GraphGateError::SessionEndpointMismatch {
            session_endpoint: EndpointKind::Partner,
            requested_endpoint: EndpointKind::Manager,
        };

        assert_eq!(unknown.to_jsonrpc_code(), mismatch.to_jsonrpc_code());
        assert_ne!(unknown.error_type_name(), mismatch.error_type_name());
    }

    #[test]
    fn test_mismatch_details() {
        let err = GraphGateError::SessionEndpointMismatch {
            session_endpoint: EndpointKind::Partner,
            requested_endpoint: EndpointKind::Manager,
        };
        let rpc = err.to_jsonrpc_error("corr-1");
        let data = rpc.data.unwrap();
        assert_eq!(data.error_type, "session_endpoint_mismatch");
        let details = data.details.unwrap();
        assert_eq!(details["session_endpoint"], "partner");
        assert_eq!(details["requested_endpoint"], "manager");
        assert!(rpc.message.contains("partner"));
    }

    #[test]
    fn test_unauthorized_has_no_details() {
        let rpc = GraphGateError::Unauthorized.to_jsonrpc_error("corr-2");
        assert_eq!(rpc.code, -32001);
        assert!(rpc.data.unwrap().details.is_none());
    }
}
