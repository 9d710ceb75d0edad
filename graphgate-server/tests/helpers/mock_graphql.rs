//! Mock upstream for integration testing.
//!
//! Serves `/auth/token` and `/{partner,manager}/graphql` on an ephemeral
//! port and records what it receives.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

pub const GOOD_API_KEY: &str = "good-key";
pub const GOOD_CLIENT_CREDENTIAL: &str = "client:secret";
pub const UPSTREAM_TOKEN: &str = "upstream-token-1";
pub const PARTNER_CODE: &str = "PC-1";

/// One GraphQL request as seen by the mock.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub endpoint: String,
    pub authorization: Option<String>,
    pub partner_code: Option<String>,
    pub body: Value,
}

impl RecordedRequest {
    pub fn variables(&self) -> &Value {
        &self.body["variables"]
    }

    pub fn query(&self) -> &str {
        self.body["query"].as_str().unwrap_or("")
    }
}

#[derive(Debug, Default)]
struct MockState {
    token_calls: RwLock<u32>,
    graphql_requests: RwLock<Vec<RecordedRequest>>,
}

/// Handle to the running mock upstream.
pub struct MockGraphql {
    pub addr: SocketAddr,
    state: Arc<MockState>,
    _handle: JoinHandle<()>,
}

impl MockGraphql {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());

        let app = Router::new()
            .route("/auth/token", post(handle_token))
            .route("/{endpoint}/graphql", post(handle_graphql))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            _handle: handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn token_calls(&self) -> u32 {
        *self.state.token_calls.read().await
    }

    pub async fn graphql_requests(&self) -> Vec<RecordedRequest> {
        self.state.graphql_requests.read().await.clone()
    }

    pub async fn last_graphql_request(&self) -> Option<RecordedRequest> {
        self.state.graphql_requests.read().await.last().cloned()
    }
}

async fn handle_token(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    *state.token_calls.write().await += 1;

    let accepted = match body["grant_type"].as_str() {
        Some("api_key") => body["api_key"] == GOOD_API_KEY,
        Some("client_credentials") => {
            format!(
                "{}:{}",
                body["client_id"].as_str().unwrap_or(""),
                body["client_secret"].as_str().unwrap_or("")
            ) == GOOD_CLIENT_CREDENTIAL
        }
        _ => false,
    };

    if !accepted {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid_client"}))).into_response();
    }

    Json(json!({
        "access_token": UPSTREAM_TOKEN,
        "expires_in": 3600,
        "partner_code": PARTNER_CODE,
    }))
    .into_response()
}

async fn handle_graphql(
    State(state): State<Arc<MockState>>,
    Path(endpoint): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.graphql_requests.write().await.push(RecordedRequest {
        endpoint,
        authorization: header("authorization"),
        partner_code: header("x-partner-code"),
        body: body.clone(),
    });

    Json(canned_response(&body)).into_response()
}

/// Canned payloads keyed on the operation name in the document.
fn canned_response(body: &Value) -> Value {
    let query = body["query"].as_str().unwrap_or("");
    let variables = &body["variables"];

    if query.contains("query ListCustomers") {
        json!({"data": {"customers": {
            "edges": [{"cursor": "c1", "node": {"id": "cus_1", "name": {"first": "Ada", "last": "Lovelace"}}}],
            "pageInfo": {"hasNextPage": false, "endCursor": "c1"},
            "totalCount": 1
        }}})
    } else if query.contains("query GetCustomer") {
        if variables["id"] == "missing" {
            json!({"data": null, "errors": [{"message": "Customer not found"}]})
        } else {
            json!({"data": {"customer": {"id": variables["id"], "name": {"first": "Ada", "last": "Lovelace"}}}})
        }
    } else if query.contains("mutation CreateCustomer") {
        json!({"data": {"createCustomer": {"customer": {
            "id": "cus_new",
            "name": variables["input"]["name"],
        }}}})
    } else if query.contains("query ListPartners") {
        json!({"data": {"partners": {
            "edges": [{"cursor": "p1", "node": {"id": "ptn_1", "name": "Acme"}}],
            "pageInfo": {"hasNextPage": false, "endCursor": "p1"},
            "totalCount": 1
        }}})
    } else {
        json!({"data": null, "errors": [{"message": "Unknown operation"}]})
    }
}
