//! Streamable HTTP handlers for `/partner/mcp` and `/manager/mcp`.
//!
//! - `POST` without `Mcp-Session-Id`: must be `initialize`; authenticates,
//!   creates a session and returns the response with the new session id.
//! - `POST` with a session id: forwards to the session's dispatcher. Requests
//!   get `200` with the response; notifications and responses get `202`.
//! - `GET`: SSE stream of server-initiated messages for the session.
//! - `DELETE`: closes the session.

use std::convert::Infallible;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, post};
use futures_util::Stream;
use graphgate_core::GraphGateError;
use graphgate_core::auth::{BoundToken, EndpointKind, parse_bearer};
use graphgate_core::jsonrpc::{
    IncomingMessage, JsonRpcId, new_correlation_id, extract_id, parse_bytes, parse_message,
};
use graphgate_core::session::SessionEntry;
use serde_json::Value;
use std::sync::Arc;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error, warn};

use crate::error::HttpError;
use crate::state::AppState;

pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";
pub const API_KEY_HEADER: &str = "x-api-key";

/// POST / GET / DELETE routes for one endpoint.
pub fn mcp_route(endpoint: EndpointKind) -> MethodRouter<AppState> {
    post(
        move |State(state): State<AppState>, headers: HeaderMap, body: Result<Bytes, BytesRejection>| async move {
            match body {
                Ok(body) => handle_post(state, endpoint, headers, body).await,
                Err(rejection) => Err(body_rejected(rejection)),
            }
        },
    )
    .get(move |State(state): State<AppState>, headers: HeaderMap| async move {
        handle_get(state, endpoint, headers).await
    })
    .delete(move |State(state): State<AppState>, headers: HeaderMap| async move {
        handle_delete(state, endpoint, headers).await
    })
}

fn session_id(headers: &HeaderMap) -> Result<Option<String>, HttpError> {
    match headers.get(MCP_SESSION_ID_HEADER) {
        None => Ok(None),
        Some(value) => match value.to_str() {
            Ok(id) if !id.trim().is_empty() => Ok(Some(id.trim().to_string())),
            _ => Err(malformed("Mcp-Session-Id header is not a valid session id").into()),
        },
    }
}

fn require_session_id(headers: &HeaderMap) -> Result<String, HttpError> {
    session_id(headers)?.ok_or_else(|| malformed("Mcp-Session-Id header is required").into())
}

/// Oversized or unreadable bodies answer with a JSON-RPC parse error.
fn body_rejected(rejection: BytesRejection) -> HttpError {
    debug!(status = %rejection.status(), "Request body rejected");
    GraphGateError::ParseError {
        details: rejection.body_text(),
    }
    .into()
}

fn malformed(details: &str) -> GraphGateError {
    GraphGateError::MalformedRequest {
        details: details.to_string(),
    }
}

async fn handle_post(
    state: AppState,
    endpoint: EndpointKind,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError> {
    let value = parse_bytes(&body)?;
    let id = extract_id(&value);
    let message = parse_message(value.clone()).map_err(|e| HttpError::new(e).with_id(id.clone()))?;

    match session_id(&headers).map_err(|e| e.with_id(id.clone()))? {
        None => open_session(&state, endpoint, &headers, message, value)
            .await
            .map_err(|e| e.with_id(id)),
        Some(session_id) => {
            let entry = state
                .sessions
                .lookup(&session_id, endpoint)
                .map_err(|e| HttpError::new(e).with_id(id.clone()))?;
            forward(&entry, message, value)
                .await
                .map_err(|e| HttpError::new(e).with_id(id))
        }
    }
}

async fn open_session(
    state: &AppState,
    endpoint: EndpointKind,
    headers: &HeaderMap,
    message: IncomingMessage,
    value: Value,
) -> Result<Response, HttpError> {
    let is_initialize = matches!(&message, IncomingMessage::Request(req) if req.is_initialize());
    if !is_initialize {
        return Err(malformed("Missing Mcp-Session-Id header; only initialize may open a session").into());
    }
    if state.lifecycle.is_shutting_down() {
        return Err(GraphGateError::ServiceUnavailable {
            reason: "server is shutting down".to_string(),
        }
        .into());
    }

    let token = authenticate(state, endpoint, headers).await?;
    let entry = state.sessions.create(endpoint, token);

    let mut response = forward(&entry, message, value).await?;
    let header_value = HeaderValue::from_str(&entry.id).map_err(|e| {
        let correlation_id = new_correlation_id();
        error!(correlation_id = %correlation_id, error = %e, "Session id is not a valid header value");
        HttpError::new(GraphGateError::InternalError { correlation_id })
    })?;
    response.headers_mut().insert(MCP_SESSION_ID_HEADER, header_value);
    Ok(response)
}

/// Resolve the token a new session is bound to.
///
/// Partner sessions exchange the `X-API-Key` credential through the token
/// cache; manager sessions pass the bearer token through unmodified.
async fn authenticate(
    state: &AppState,
    endpoint: EndpointKind,
    headers: &HeaderMap,
) -> Result<BoundToken, GraphGateError> {
    match endpoint {
        EndpointKind::Partner => {
            let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) else {
                warn!(endpoint = %endpoint, reason = "missing", "Missing X-API-Key header");
                return Err(GraphGateError::Unauthorized);
            };
            state.tokens.authenticate(key).await
        }
        EndpointKind::Manager => {
            let bearer = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_bearer);
            match bearer {
                Some(token) => Ok(BoundToken::bearer(token)),
                None => {
                    warn!(endpoint = %endpoint, reason = "missing", "Missing bearer token");
                    Err(GraphGateError::Unauthorized)
                }
            }
        }
    }
}

/// Deliver a message to a session and build the HTTP response.
async fn forward(
    entry: &Arc<SessionEntry>,
    message: IncomingMessage,
    value: Value,
) -> Result<Response, GraphGateError> {
    let request_id = match message {
        IncomingMessage::Request(req) => req.id,
        IncomingMessage::Response { .. } => None,
    };

    let Some(id) = request_id else {
        entry
            .transport
            .deliver(value)
            .await
            .map_err(|_| GraphGateError::SessionNotFound)?;
        return Ok(StatusCode::ACCEPTED.into_response());
    };

    let reply = await_reply(entry, id, value).await?;
    Ok((StatusCode::OK, Json(reply)).into_response())
}

async fn await_reply(entry: &SessionEntry, id: JsonRpcId, value: Value) -> Result<Value, GraphGateError> {
    let rx = entry
        .transport
        .request(id, value)
        .await
        .map_err(|_| GraphGateError::SessionNotFound)?;

    match rx.await {
        Ok(reply) => Ok(reply),
        Err(_) if entry.transport.is_closed() => Err(GraphGateError::SessionNotFound),
        Err(_) => {
            // Another in-flight request reused this id and took the slot.
            let correlation_id = new_correlation_id();
            warn!(
                correlation_id = %correlation_id,
                session_id = %entry.id,
                "Response waiter dropped before reply"
            );
            Err(GraphGateError::InternalError { correlation_id })
        }
    }
}

async fn handle_get(
    state: AppState,
    endpoint: EndpointKind,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, HttpError> {
    let session_id = require_session_id(&headers)?;
    let entry = state.sessions.lookup(&session_id, endpoint)?;
    debug!(session_id = %session_id, "SSE stream opened");

    let stream = BroadcastStream::new(entry.transport.subscribe()).filter_map(|message| match message {
        Ok(value) => {
            let data = serde_json::to_string(&value).ok()?;
            Some(Ok(Event::default().event("message").data(data)))
        }
        // Lagged subscribers skip what they missed.
        Err(_) => None,
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn handle_delete(
    state: AppState,
    endpoint: EndpointKind,
    headers: HeaderMap,
) -> Result<StatusCode, HttpError> {
    let session_id = require_session_id(&headers)?;
    state.sessions.terminate(&session_id, endpoint).await?;
    Ok(StatusCode::OK)
}
