//! In-process client for the GraphGate router.

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use graphgate_core::config::{
    ENV_MANAGER_GRAPHQL_URL, ENV_PARTNER_GRAPHQL_URL, ENV_TOKEN_URL, GraphGateConfig,
};
use graphgate_server::{AppState, router};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use super::mock_graphql::MockGraphql;

pub const SESSION_HEADER: &str = "mcp-session-id";

/// Router plus the state and mock upstream behind it.
pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub upstream: MockGraphql,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn session_id(&self) -> Option<String> {
        self.headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn error_code(&self) -> Option<i64> {
        self.body["error"]["code"].as_i64()
    }
}

pub async fn test_app() -> TestApp {
    let upstream = MockGraphql::start().await;
    let partner = upstream.url("/partner/graphql");
    let manager = upstream.url("/manager/graphql");
    let token = upstream.url("/auth/token");

    let config = GraphGateConfig::from_lookup(move |name: &str| match name {
        n if n == ENV_PARTNER_GRAPHQL_URL => Some(partner.clone()),
        n if n == ENV_MANAGER_GRAPHQL_URL => Some(manager.clone()),
        n if n == ENV_TOKEN_URL => Some(token.clone()),
        _ => None,
    })
    .unwrap();

    let state = AppState::from_config(&config).unwrap();
    let router = router(state.clone());
    TestApp {
        state,
        router,
        upstream,
    }
}

pub fn initialize_request(id: i64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "1.0"}
        }
    })
}

pub fn tool_call(id: i64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// POST a raw body with the given headers.
    pub async fn post_raw(&self, path: &str, headers: &[(&str, &str)], body: impl Into<Body>) -> TestResponse {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(body.into()).unwrap()).await
    }

    pub async fn post(&self, path: &str, headers: &[(&str, &str)], body: &Value) -> TestResponse {
        self.post_raw(path, headers, body.to_string()).await
    }

    pub async fn get(&self, path: &str, headers: &[(&str, &str)]) -> TestResponse {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// GET the session's SSE stream without buffering the body.
    pub async fn open_stream(&self, path: &str, session_id: &str) -> Response {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header(SESSION_HEADER, session_id)
            .header("accept", "text/event-stream")
            .body(Body::empty())
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn delete(&self, path: &str, session_id: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::DELETE)
            .uri(path)
            .header(SESSION_HEADER, session_id)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Open a partner session with the given API key.
    pub async fn open_partner(&self, api_key: &str) -> TestResponse {
        self.post("/partner/mcp", &[("x-api-key", api_key)], &initialize_request(1))
            .await
    }

    /// Open a manager session with the given bearer token.
    pub async fn open_manager(&self, token: &str) -> TestResponse {
        let auth = format!("Bearer {token}");
        self.post("/manager/mcp", &[("authorization", auth.as_str())], &initialize_request(1))
            .await
    }
}
