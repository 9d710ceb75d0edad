//! Prometheus metrics using the prometheus-client crate.
//!
//! `GraphGateMetrics` registers every metric on a caller-owned `Registry`;
//! the HTTP server encodes that registry on `/metrics` in OpenMetrics text
//! format.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

use crate::auth::EndpointKind;

/// Upstream GraphQL latency buckets in milliseconds.
const UPSTREAM_BUCKETS: &[f64] = &[
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
];

/// Labels for tool call counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ToolCallLabels {
    /// Tool name from the static catalog (bounded cardinality)
    pub tool: String,
    /// "success", "upstream_error" or "invalid_params"
    pub outcome: String,
}

/// Labels for token exchange counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ExchangeLabels {
    /// "hit", "miss" or "failure"
    pub outcome: String,
}

/// Labels keyed by logical endpoint.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EndpointLabels {
    /// "partner" or "manager"
    pub endpoint: String,
}

/// Tool call outcome label values.
pub mod outcome {
    pub const SUCCESS: &str = "success";
    pub const UPSTREAM_ERROR: &str = "upstream_error";
    pub const INVALID_PARAMS: &str = "invalid_params";

    pub const HIT: &str = "hit";
    pub const MISS: &str = "miss";
    pub const FAILURE: &str = "failure";
}

/// All GraphGate metrics.
pub struct GraphGateMetrics {
    /// Tool calls by tool and outcome.
    pub tool_calls_total: Family<ToolCallLabels, Counter>,

    /// Token cache lookups by outcome.
    pub token_exchanges_total: Family<ExchangeLabels, Counter>,

    /// Active MCP sessions per endpoint.
    pub sessions_active: Family<EndpointLabels, Gauge>,

    /// Upstream GraphQL call latency in milliseconds.
    pub upstream_duration_ms: Family<EndpointLabels, Histogram>,
}

impl GraphGateMetrics {
    /// Create and register all metrics with the given registry.
    pub fn new(registry: &mut Registry) -> Self {
        let tool_calls_total = Family::<ToolCallLabels, Counter>::default();
        registry.register(
            "graphgate_tool_calls",
            "MCP tool calls by tool and outcome",
            tool_calls_total.clone(),
        );

        let token_exchanges_total = Family::<ExchangeLabels, Counter>::default();
        registry.register(
            "graphgate_token_exchanges",
            "Token cache lookups by outcome",
            token_exchanges_total.clone(),
        );

        let sessions_active = Family::<EndpointLabels, Gauge>::default();
        registry.register(
            "graphgate_sessions_active",
            "Active MCP sessions per endpoint",
            sessions_active.clone(),
        );

        let upstream_duration_ms = Family::<EndpointLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(UPSTREAM_BUCKETS.iter().copied())
        });
        registry.register(
            "graphgate_upstream_duration_ms",
            "Upstream GraphQL call latency in milliseconds",
            upstream_duration_ms.clone(),
        );

        Self {
            tool_calls_total,
            token_exchanges_total,
            sessions_active,
            upstream_duration_ms,
        }
    }

    pub fn record_tool_call(&self, tool: &str, outcome: &str) {
        self.tool_calls_total
            .get_or_create(&ToolCallLabels {
                tool: tool.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
    }

    pub fn record_token_lookup(&self, outcome: &str) {
        self.token_exchanges_total
            .get_or_create(&ExchangeLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    /// Set the active session gauge for an endpoint.
    pub fn set_sessions_active(&self, endpoint: EndpointKind, count: usize) {
        self.sessions_active
            .get_or_create(&EndpointLabels {
                endpoint: endpoint.as_str().to_string(),
            })
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn record_upstream_duration(&self, endpoint: EndpointKind, duration_ms: f64) {
        self.upstream_duration_ms
            .get_or_create(&EndpointLabels {
                endpoint: endpoint.as_str().to_string(),
            })
            .observe(duration_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(registry: &Registry) -> String {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, registry)
            .expect("encoding should succeed");
        buffer
    }

    #[test]
    fn test_metrics_registration() {
        let mut registry = Registry::default();
        let metrics = GraphGateMetrics::new(&mut registry);

        metrics.record_tool_call("list_customers", outcome::SUCCESS);
        metrics.record_token_lookup(outcome::MISS);
        metrics.set_sessions_active(EndpointKind::Partner, 3);
        metrics.record_upstream_duration(EndpointKind::Manager, 42.0);

        let buffer = encode(&registry);
        assert!(buffer.contains("graphgate_tool_calls_total"));
        assert!(buffer.contains("tool=\"list_customers\""));
        assert!(buffer.contains("graphgate_token_exchanges_total"));
        assert!(buffer.contains("graphgate_sessions_active{endpoint=\"partner\"} 3"));
        assert!(buffer.contains("graphgate_upstream_duration_ms"));
    }

    #[test]
    fn test_session_gauge_overwrites() {
        let mut registry = Registry::default();
        let metrics = GraphGateMetrics::new(&mut registry);

        metrics.set_sessions_active(EndpointKind::Manager, 5);
        metrics.set_sessions_active(EndpointKind::Manager, 1);

        let buffer = encode(&registry);
        assert!(buffer.contains("graphgate_sessions_active{endpoint=\"manager\"} 1"));
    }
}
