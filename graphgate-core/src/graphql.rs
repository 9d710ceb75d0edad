//! Upstream GraphQL client.
//!
//! Both upstreams (partner and manager) are plain GraphQL-over-HTTP
//! endpoints. Each call POSTs `{query, variables}` with the session's bearer
//! token and returns the `data` object.
//!
//! # Error Classification
//!
//! Upstream failures are not protocol errors. The dispatcher turns every
//! [`GraphqlError`] into a tool result with `isError: true`, so the message
//! here is what the calling agent reads.
//!
//! # Security
//!
//! - TLS via rustls; certificate verification enabled
//! - No automatic retry (mutations must not run twice)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{BoundToken, EndpointKind};
use crate::metrics::GraphGateMetrics;

/// Header carrying the partner code returned by the token exchange.
pub const PARTNER_CODE_HEADER: &str = "X-Partner-Code";

/// HTTP client settings shared by the token exchanger and GraphQL client.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Request timeout (includes connection + response)
    pub timeout: Duration,
    /// Connection timeout (TCP + TLS handshake)
    pub connect_timeout: Duration,
    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,
    /// Idle connection timeout
    pub pool_idle_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            pool_max_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

impl UpstreamConfig {
    /// Build the pooled reqwest client.
    pub fn build_client(&self) -> Result<Client, reqwest::Error> {
        Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .pool_idle_timeout(self.pool_idle_timeout)
            .tcp_nodelay(true)
            .build()
    }
}

/// Failure of a single GraphQL call.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum GraphqlError {
    /// Connection failure or timeout.
    #[error("upstream request failed: {0}")]
    Transport(String),

    /// Non-2xx HTTP status.
    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },

    /// The response carried a non-empty `errors` array.
    #[error("GraphQL error: {}", .0.join("; "))]
    Errors(Vec<String>),

    /// Neither `data` nor `errors` was present.
    #[error("upstream response has no data")]
    MissingData,

    /// The body was not a GraphQL response.
    #[error("invalid upstream response: {0}")]
    Decode(String),
}

/// Executes a GraphQL document against one of the upstreams.
#[async_trait]
pub trait GraphqlExecutor: Send + Sync {
    /// Returns the response's `data` object.
    async fn execute(
        &self,
        endpoint: EndpointKind,
        token: &BoundToken,
        document: &str,
        variables: Value,
    ) -> Result<Value, GraphqlError>;
}

#[derive(Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphqlErrorEntry>>,
}

#[derive(Deserialize)]
struct GraphqlErrorEntry {
    message: String,
}

/// reqwest-backed [`GraphqlExecutor`].
#[derive(Clone)]
pub struct GraphqlClient {
    client: Client,
    urls: HashMap<EndpointKind, String>,
    metrics: Option<Arc<GraphGateMetrics>>,
}

impl GraphqlClient {
    pub fn new(client: Client, partner_url: impl Into<String>, manager_url: impl Into<String>) -> Self {
        let urls = HashMap::from([
            (EndpointKind::Partner, partner_url.into()),
            (EndpointKind::Manager, manager_url.into()),
        ]);
        Self {
            client,
            urls,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<GraphGateMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn url(&self, endpoint: EndpointKind) -> Result<&str, GraphqlError> {
        self.urls
            .get(&endpoint)
            .map(String::as_str)
            .ok_or_else(|| GraphqlError::Transport(format!("no URL configured for {endpoint}")))
    }
}

#[async_trait]
impl GraphqlExecutor for GraphqlClient {
    #[tracing::instrument(skip_all, fields(endpoint = %endpoint))]
    async fn execute(
        &self,
        endpoint: EndpointKind,
        token: &BoundToken,
        document: &str,
        variables: Value,
    ) -> Result<Value, GraphqlError> {
        let url = self.url(endpoint)?;

        let mut request = self
            .client
            .post(url)
            .bearer_auth(&token.token)
            .json(&serde_json::json!({ "query": document, "variables": variables }));
        if endpoint == EndpointKind::Partner {
            if let Some(code) = &token.partner_code {
                request = request.header(PARTNER_CODE_HEADER, code);
            }
        }

        let started = std::time::Instant::now();
        let result = request.send().await;
        if let Some(metrics) = &self.metrics {
            metrics.record_upstream_duration(endpoint, started.elapsed().as_secs_f64() * 1000.0);
        }

        let response = result.map_err(|e| {
            warn!(error = %e, "GraphQL request failed");
            if e.is_timeout() {
                GraphqlError::Transport("upstream request timed out".to_string())
            } else {
                GraphqlError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "GraphQL upstream returned error status");
            return Err(GraphqlError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| GraphqlError::Transport(e.to_string()))?;
        let parsed: GraphqlResponse =
            serde_json::from_slice(&body).map_err(|e| GraphqlError::Decode(e.to_string()))?;

        debug!(bytes = body.len(), "GraphQL response received");
        into_data(parsed)
    }
}

fn into_data(response: GraphqlResponse) -> Result<Value, GraphqlError> {
    if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
        return Err(GraphqlError::Errors(
            errors.into_iter().map(|e| e.message).collect(),
        ));
    }
    match response.data {
        Some(Value::Null) | None => Err(GraphqlError::MissingData),
        Some(data) => Ok(data),
    }
}
