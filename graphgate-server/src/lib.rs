//! GraphGate Streamable HTTP server.
//!
//! # Routes
//!
//! | Path | Methods | Purpose |
//! |------|---------|---------|
//! | `/partner/mcp` | POST, GET, DELETE | MCP over Streamable HTTP, API-key auth |
//! | `/manager/mcp` | POST, GET, DELETE | MCP over Streamable HTTP, bearer auth |
//! | `/health` | GET | liveness, session and cache counts |
//! | `/metrics` | GET | OpenMetrics |
//! | `/` | GET | service name, version and paths |

pub mod error;
pub mod mcp_http;
pub mod state;
pub mod status;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use graphgate_core::auth::EndpointKind;
use graphgate_core::transport::MAX_MESSAGE_BYTES;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/partner/mcp", mcp_http::mcp_route(EndpointKind::Partner))
        .route("/manager/mcp", mcp_http::mcp_route(EndpointKind::Manager))
        .route("/health", get(status::health))
        .route("/metrics", get(status::metrics))
        .route("/", get(status::index))
        .layer(DefaultBodyLimit::max(MAX_MESSAGE_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the lifecycle shutdown token fires.
///
/// Sessions are closed as soon as shutdown begins so open SSE streams end
/// and graceful shutdown can finish draining connections.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let shutdown = state.lifecycle.shutdown_token();
    let sessions = Arc::clone(&state.sessions);
    let app = router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!("HTTP server shutting down");
            sessions.close_all().await;
        })
        .await
}
