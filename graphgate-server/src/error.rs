//! HTTP mapping for protocol errors.
//!
//! Every error the Streamable HTTP endpoints return is a JSON-RPC error
//! response body; only the status code differs.
//!
//! | Error | Status |
//! |-------|--------|
//! | parse, invalid request, malformed request | 400 |
//! | unauthorized | 401 |
//! | session not found | 404 |
//! | session endpoint mismatch | 400 |
//! | method not found, invalid params | 200 |
//! | service unavailable | 503 |
//! | internal | 500 |

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use graphgate_core::GraphGateError;
use graphgate_core::jsonrpc::{JsonRpcId, JsonRpcResponse};
use tracing::{debug, error};

/// A protocol error plus the request id it answers, if one was readable.
#[derive(Debug)]
pub struct HttpError {
    pub error: GraphGateError,
    pub id: Option<JsonRpcId>,
}

impl HttpError {
    pub fn new(error: GraphGateError) -> Self {
        Self { error, id: None }
    }

    pub fn with_id(mut self, id: Option<JsonRpcId>) -> Self {
        self.id = id;
        self
    }
}

impl From<GraphGateError> for HttpError {
    fn from(error: GraphGateError) -> Self {
        Self::new(error)
    }
}

pub fn status_for(error: &GraphGateError) -> StatusCode {
    match error {
        GraphGateError::ParseError { .. }
        | GraphGateError::InvalidRequest { .. }
        | GraphGateError::MalformedRequest { .. }
        | GraphGateError::SessionEndpointMismatch { .. } => StatusCode::BAD_REQUEST,
        GraphGateError::Unauthorized => StatusCode::UNAUTHORIZED,
        GraphGateError::SessionNotFound => StatusCode::NOT_FOUND,
        GraphGateError::MethodNotFound { .. } | GraphGateError::InvalidParams { .. } => StatusCode::OK,
        GraphGateError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        GraphGateError::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);
        let body = JsonRpcResponse::from_error(self.id, &self.error);

        if status.is_server_error() {
            error!(error = %self.error, error_type = self.error.error_type_name(), "Request failed");
        } else {
            debug!(error = %self.error, error_type = self.error.error_type_name(), %status, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphgate_core::auth::EndpointKind;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&GraphGateError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&GraphGateError::SessionNotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&GraphGateError::SessionEndpointMismatch {
                session_endpoint: EndpointKind::Partner,
                requested_endpoint: EndpointKind::Manager,
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&GraphGateError::MalformedRequest {
                details: "x".to_string()
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&GraphGateError::ServiceUnavailable {
                reason: "x".to_string()
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_error_body_carries_id() {
        let response = HttpError::new(GraphGateError::SessionNotFound)
            .with_id(Some(JsonRpcId::Number(4)))
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["id"], 4);
        assert_eq!(body["error"]["code"], -32002);
        assert_eq!(body["error"]["data"]["error_type"], "session_not_found");
    }

    #[tokio::test]
    async fn test_parse_error_has_null_id() {
        let response = HttpError::new(GraphGateError::ParseError {
            details: "bad".to_string(),
        })
        .into_response();
        let body = body_json(response).await;
        assert!(body["id"].is_null());
        assert_eq!(body["error"]["code"], -32700);
    }
}
