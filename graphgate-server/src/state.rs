//! Shared handler state.

use std::sync::Arc;
use std::time::Duration;

use graphgate_core::auth::TokenCache;
use graphgate_core::config::{ConfigError, GraphGateConfig};
use graphgate_core::graphql::GraphqlExecutor;
use graphgate_core::lifecycle::LifecycleManager;
use graphgate_core::metrics::GraphGateMetrics;
use graphgate_core::protocol::McpServer;
use graphgate_core::session::SessionRegistry;
use graphgate_core::tools::ToolRegistry;
use prometheus_client::registry::Registry;
use tokio::task::JoinHandle;
use tracing::debug;

/// How often expired token cache entries are dropped.
pub const TOKEN_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub tokens: Arc<TokenCache>,
    pub lifecycle: Arc<LifecycleManager>,
    pub prom_registry: Arc<Registry>,
}

impl AppState {
    /// Wire the production stack from configuration.
    pub fn from_config(config: &GraphGateConfig) -> Result<Self, ConfigError> {
        let mut registry = Registry::default();
        let metrics = Arc::new(GraphGateMetrics::new(&mut registry));
        let (tokens, graphql) = config.build_upstreams(Some(Arc::clone(&metrics)))?;
        Ok(Self::assemble(tokens, Arc::new(graphql), registry, metrics))
    }

    /// Wire the handler state around an existing token cache and executor.
    pub fn assemble(
        tokens: TokenCache,
        executor: Arc<dyn GraphqlExecutor>,
        registry: Registry,
        metrics: Arc<GraphGateMetrics>,
    ) -> Self {
        let server = McpServer::new(Arc::new(ToolRegistry::builtin()), executor)
            .with_metrics(Arc::clone(&metrics));
        let sessions = SessionRegistry::new(Arc::new(server)).with_metrics(metrics);
        Self {
            sessions: Arc::new(sessions),
            tokens: Arc::new(tokens),
            lifecycle: Arc::new(LifecycleManager::new()),
            prom_registry: Arc::new(registry),
        }
    }

    /// Periodically prune the token cache until shutdown.
    pub fn spawn_token_pruner(&self, interval: Duration) -> JoinHandle<()> {
        let tokens = Arc::clone(&self.tokens);
        let shutdown = self.lifecycle.shutdown_token();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let pruned = tokens.prune_expired();
                        if pruned > 0 {
                            debug!(pruned, remaining = tokens.len(), "Pruned expired tokens");
                        }
                    }
                }
            }
        })
    }
}
