//! MCP protocol dispatcher.
//!
//! One [`McpServer`] serves every session on both transports. A session is a
//! [`Transport`] plus a [`SessionContext`] carrying the endpoint and the
//! token bound at authentication time; [`McpServer::serve`] runs the receive
//! loop until the transport closes or its input ends.
//!
//! ## Methods
//!
//! | Method | Result |
//! |--------|--------|
//! | `initialize` | negotiated version, capabilities, server info |
//! | `ping` | `{}` |
//! | `tools/list` | the session endpoint's tools |
//! | `tools/call` | tool result, `isError: true` on upstream failure |
//!
//! Requests run concurrently; each response carries its request's id.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info_span, trace, warn};

use crate::auth::{BoundToken, EndpointKind};
use crate::error::GraphGateError;
use crate::graphql::GraphqlExecutor;
use crate::jsonrpc::{
    IncomingMessage, JsonRpcId, JsonRpcRequest, JsonRpcResponse, extract_id, parse_message,
};
use crate::metrics::{GraphGateMetrics, outcome};
use crate::tools::{ToolDefinition, ToolRegistry};
use crate::transport::Transport;

pub const SERVER_NAME: &str = "graphgate";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol versions this server speaks, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// The client's requested version if supported, otherwise the newest.
pub fn negotiate_version(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|r| SUPPORTED_PROTOCOL_VERSIONS.iter().find(|v| **v == r))
        .copied()
        .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0])
}

fn instructions(endpoint: EndpointKind) -> &'static str {
    match endpoint {
        EndpointKind::Partner => {
            "Partner tools for customers, orders and locations. List tools accept \
             `first` and `after` for cursor pagination."
        }
        EndpointKind::Manager => {
            "Manager tools for partner accounts and their users. List tools accept \
             `first` and `after` for cursor pagination."
        }
    }
}

/// Per-session state visible to the dispatcher.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub endpoint: EndpointKind,
    pub token: BoundToken,
    /// `None` on stdio.
    pub session_id: Option<String>,
}

pub struct McpServer {
    tools: Arc<ToolRegistry>,
    executor: Arc<dyn GraphqlExecutor>,
    metrics: Option<Arc<GraphGateMetrics>>,
}

impl McpServer {
    pub fn new(tools: Arc<ToolRegistry>, executor: Arc<dyn GraphqlExecutor>) -> Self {
        Self {
            tools,
            executor,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<GraphGateMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run the receive loop for one session.
    ///
    /// Returns once the transport yields no more messages, after every
    /// in-flight request has sent its response.
    pub async fn serve(self: Arc<Self>, transport: Arc<dyn Transport>, ctx: Arc<SessionContext>) {
        let span = info_span!(
            "mcp_session",
            endpoint = %ctx.endpoint,
            session_id = ctx.session_id.as_deref().unwrap_or("stdio"),
        );
        self.serve_loop(transport, ctx).instrument(span).await
    }

    async fn serve_loop(self: Arc<Self>, transport: Arc<dyn Transport>, ctx: Arc<SessionContext>) {
        let mut in_flight = JoinSet::new();

        while let Some(received) = transport.receive().await {
            while let Some(joined) = in_flight.try_join_next() {
                log_join(joined);
            }

            let value = match received {
                Ok(value) => value,
                Err(framing) => {
                    debug!(error = %framing, "Rejected inbound message");
                    let err: GraphGateError = framing.into();
                    send_response(&*transport, JsonRpcResponse::from_error(None, &err)).await;
                    continue;
                }
            };

            let id = extract_id(&value);
            let request = match parse_message(value) {
                Ok(IncomingMessage::Request(request)) => request,
                Ok(IncomingMessage::Response { id }) => {
                    debug!(id = %id, "Ignoring client response, no server requests are pending");
                    continue;
                }
                Err(err) => {
                    send_response(&*transport, JsonRpcResponse::from_error(id, &err)).await;
                    continue;
                }
            };

            if request.is_notification() {
                handle_notification(&request);
                continue;
            }

            let server = Arc::clone(&self);
            let transport = Arc::clone(&transport);
            let ctx = Arc::clone(&ctx);
            in_flight.spawn(
                async move {
                    let response = server.handle_request(&ctx, request).await;
                    send_response(&*transport, response).await;
                }
                .in_current_span(),
            );
        }

        debug!(in_flight = in_flight.len(), "Input ended, draining in-flight requests");
        while let Some(joined) = in_flight.join_next().await {
            log_join(joined);
        }
    }

    /// Handle one request (never a notification) and build its response.
    pub async fn handle_request(&self, ctx: &SessionContext, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        trace!(method = %request.method, "Dispatching request");

        let result = match request.method.as_str() {
            "initialize" => Ok(self.initialize(ctx, request.params.as_ref())),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.list_tools(ctx.endpoint)),
            "tools/call" => self.call_tool(ctx, request.params).await,
            other => Err(GraphGateError::MethodNotFound {
                method: other.to_string(),
            }),
        };

        respond(id, result)
    }

    fn initialize(&self, ctx: &SessionContext, params: Option<&Value>) -> Value {
        let requested = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str);
        let version = negotiate_version(requested);
        if requested.is_some_and(|r| r != version) {
            debug!(requested, negotiated = version, "Protocol version downgraded");
        }

        json!({
            "protocolVersion": version,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION,
            },
            "instructions": instructions(ctx.endpoint),
        })
    }

    fn list_tools(&self, endpoint: EndpointKind) -> Value {
        let tools: Vec<Value> = self
            .tools
            .for_endpoint(endpoint)
            .map(ToolDefinition::to_listing)
            .collect();
        json!({ "tools": tools })
    }

    async fn call_tool(
        &self,
        ctx: &SessionContext,
        params: Option<Value>,
    ) -> Result<Value, GraphGateError> {
        let params = match params {
            Some(Value::Object(map)) => map,
            _ => return Err(invalid_params("tools/call params must be an object")),
        };
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_params("tools/call requires a string 'name'"))?;
        let empty = Map::new();
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(map)) => map,
            Some(_) => return Err(invalid_params("'arguments' must be an object")),
        };

        let Some(tool) = self.tools.get_for(ctx.endpoint, name) else {
            return Err(invalid_params(&format!("Unknown tool: {name}")));
        };

        let variables = match tool.shape_arguments(arguments) {
            Ok(v) => v,
            Err(e) => {
                self.record_tool_call(tool.name, outcome::INVALID_PARAMS);
                return Err(invalid_params(&e.to_string()));
            }
        };

        match self
            .executor
            .execute(tool.endpoint, &ctx.token, tool.document, variables)
            .await
        {
            Ok(data) => {
                self.record_tool_call(tool.name, outcome::SUCCESS);
                Ok(tool_success(tool.extract_result(&data)))
            }
            Err(e) => {
                warn!(tool = tool.name, error = %e, "Upstream GraphQL call failed");
                self.record_tool_call(tool.name, outcome::UPSTREAM_ERROR);
                Ok(tool_error(&e.to_string()))
            }
        }
    }

    fn record_tool_call(&self, tool: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_tool_call(tool, outcome);
        }
    }
}

fn handle_notification(request: &JsonRpcRequest) {
    match request.method.as_str() {
        "notifications/initialized" => debug!("Client initialized"),
        // In-flight upstream calls are not aborted.
        "notifications/cancelled" => debug!(params = ?request.params, "Client cancelled a request"),
        other => debug!(method = other, "Ignoring notification"),
    }
}

fn invalid_params(details: &str) -> GraphGateError {
    GraphGateError::InvalidParams {
        details: details.to_string(),
    }
}

fn respond(id: Option<JsonRpcId>, result: Result<Value, GraphGateError>) -> JsonRpcResponse {
    match result {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(err) => {
            debug!(error = %err, error_type = err.error_type_name(), "Request failed");
            JsonRpcResponse::from_error(id, &err)
        }
    }
}

fn tool_success(result: Value) -> Value {
    let text = serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string());
    json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": { "result": result },
        "isError": false,
    })
}

fn tool_error(message: &str) -> Value {
    json!({
        "content": [{ "type": "text", "text": message }],
        "isError": true,
    })
}

async fn send_response(transport: &dyn Transport, response: JsonRpcResponse) {
    let value = match response.to_value() {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Failed to encode response");
            return;
        }
    };
    if let Err(e) = transport.send(value).await {
        debug!(error = %e, "Response not delivered");
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        warn!(error = %e, "Request task failed");
    }
}
