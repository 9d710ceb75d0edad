//! Service status endpoints: `/health`, `/` and `/metrics`.

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use graphgate_core::protocol::{SERVER_NAME, SERVER_VERSION};
use graphgate_core::session::SessionCounts;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "shutting_down"
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub sessions: SessionCounts,
    pub cached_credentials: usize,
}

/// Liveness plus session and cache counts. 503 once shutdown has begun.
pub async fn health(State(state): State<AppState>) -> Response {
    let shutting_down = state.lifecycle.is_shutting_down();
    let body = HealthResponse {
        status: if shutting_down { "shutting_down" } else { "healthy" },
        version: state.lifecycle.version(),
        uptime_seconds: state.lifecycle.uptime_seconds(),
        sessions: state.sessions.counts(),
        cached_credentials: state.tokens.len(),
    };
    let status = if shutting_down {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(body)).into_response()
}

pub async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "name": SERVER_NAME,
        "version": SERVER_VERSION,
        "endpoints": {
            "partner": "/partner/mcp",
            "manager": "/manager/mcp",
            "health": "/health",
            "metrics": "/metrics",
        }
    }))
}

/// OpenMetrics text encoding of the shared registry.
pub async fn metrics(State(state): State<AppState>) -> Response {
    let mut buffer = String::new();

    if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &state.prom_registry) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {e}"),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buffer,
    )
        .into_response()
}
