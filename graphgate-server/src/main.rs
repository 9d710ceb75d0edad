//! GraphGate HTTP server entry point.
//!
//! Startup: logging, configuration, upstream wiring, bind, ready. SIGINT or
//! SIGTERM begins shutdown: new sessions are refused, every session is
//! closed, then the listener drains.

use std::sync::Arc;

use clap::Parser;
use graphgate_core::config::GraphGateConfig;
use graphgate_core::lifecycle::LifecycleManager;
use graphgate_server::state::{AppState, TOKEN_PRUNE_INTERVAL};
use tokio::net::TcpListener;
use tracing::{error, info};

/// Streamable HTTP MCP server for the partner and manager GraphQL APIs.
///
/// Upstream URLs, token lifetimes and timeouts are read from the
/// `GRAPHGATE_*` environment variables.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Config {
    /// Bind address
    #[arg(long, env = "GRAPHGATE_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port
    #[arg(short, long, env = "GRAPHGATE_PORT", default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The guard must live until exit so buffered logs are flushed.
    let (non_blocking, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Config::parse();

    let config = GraphGateConfig::from_env().unwrap_or_else(|e| {
        error!(error = %e, "Invalid configuration, refusing to start");
        std::process::exit(1);
    });
    info!(
        partner_graphql_url = %config.partner_graphql_url,
        manager_graphql_url = %config.manager_graphql_url,
        token_url = %config.token_url,
        token_ttl_secs = config.token_ttl.as_secs(),
        "Configuration loaded"
    );

    let state = AppState::from_config(&config).unwrap_or_else(|e| {
        error!(error = %e, "Failed to initialize upstream clients");
        std::process::exit(1);
    });

    setup_signal_handlers(Arc::clone(&state.lifecycle));
    let pruner = state.spawn_token_pruner(TOKEN_PRUNE_INTERVAL);

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr = %addr, error = %e, "Failed to bind listener");
            std::process::exit(1);
        }
    };
    info!(addr = %addr, "GraphGate listening");
    state.lifecycle.mark_ready();

    let lifecycle = Arc::clone(&state.lifecycle);
    let result = graphgate_server::serve(listener, state).await;

    pruner.abort();
    lifecycle.mark_stopped();
    result.map_err(Into::into)
}

/// SIGINT and SIGTERM both begin graceful shutdown.
fn setup_signal_handlers(lifecycle: Arc<LifecycleManager>) {
    let lifecycle_sigint = Arc::clone(&lifecycle);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                lifecycle_sigint.begin_shutdown();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGINT");
            }
        }
    });

    #[cfg(unix)]
    {
        let lifecycle_sigterm = lifecycle;
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM, initiating graceful shutdown");
                    lifecycle_sigterm.begin_shutdown();
                }
                Err(e) => {
                    error!(error = %e, "Failed to listen for SIGTERM");
                }
            }
        });
    }

    #[cfg(not(unix))]
    let _ = lifecycle;
}
