//! Stdio session runner.
//!
//! Stdin is read from the moment the runner starts. Chunks go into a
//! [`StartupBuffer`] until authentication resolves; on success a
//! [`StdioTransport`] is attached and the buffer replays into it, on failure
//! the buffer is discarded unread.

use std::future::Future;
use std::sync::Arc;

use bytes::BytesMut;
use graphgate_core::auth::{BoundToken, EndpointKind};
use graphgate_core::config::GraphGateConfig;
use graphgate_core::protocol::{McpServer, SessionContext};
use graphgate_core::tools::ToolRegistry;
use graphgate_core::transport::{ChunkSink, StartupBuffer, StdioTransport, Transport};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cli::StdioArgs;
use crate::error::StdioError;

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Run `graphgate stdio` against the real stdin/stdout and upstreams.
pub async fn run_stdio(args: StdioArgs) -> Result<(), StdioError> {
    let endpoint: EndpointKind = args.endpoint.into();
    let credential = args.credential()?.to_string();

    let config = GraphGateConfig::from_env()?;
    let (tokens, graphql) = config.build_upstreams(None)?;
    let server = Arc::new(McpServer::new(
        Arc::new(ToolRegistry::builtin()),
        Arc::new(graphql),
    ));

    let authenticate = async move {
        match endpoint {
            EndpointKind::Partner => tokens
                .authenticate(&credential)
                .await
                .map_err(|_| StdioError::AuthenticationFailed { endpoint }),
            EndpointKind::Manager => Ok(BoundToken::bearer(credential)),
        }
    };

    serve_stdio(
        server,
        endpoint,
        authenticate,
        tokio::io::stdin(),
        tokio::io::stdout(),
    )
    .await
}

/// Serve one MCP session over `input` / `output` once `authenticate`
/// resolves.
///
/// Returns when `input` reaches EOF and every in-flight request has been
/// answered, or with the authentication error. Nothing is written to
/// `output` unless authentication succeeds.
pub async fn serve_stdio<R, W, A>(
    server: Arc<McpServer>,
    endpoint: EndpointKind,
    authenticate: A,
    input: R,
    output: W,
) -> Result<(), StdioError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    A: Future<Output = Result<BoundToken, StdioError>>,
{
    let buffer = Arc::new(StartupBuffer::new());
    let pump = spawn_input_pump(input, Arc::clone(&buffer));

    let token = match authenticate.await {
        Ok(token) => token,
        Err(e) => {
            let discarded = buffer.discard();
            debug!(discarded_chunks = discarded, "Discarded buffered input");
            pump.abort();
            return Err(e);
        }
    };
    info!(endpoint = %endpoint, method = token.method.as_str(), "Authenticated, serving stdio");

    let transport = Arc::new(StdioTransport::new(output));
    let replayed = buffer.attach(Arc::clone(&transport) as Arc<dyn ChunkSink>);
    debug!(replayed_chunks = replayed, "Replayed buffered input");

    let ctx = Arc::new(SessionContext {
        endpoint,
        token,
        session_id: None,
    });
    server
        .serve(Arc::clone(&transport) as Arc<dyn Transport>, ctx)
        .await;

    if let Err(e) = transport.close().await {
        warn!(error = %e, "Failed to close stdio transport");
    }
    pump.abort();
    info!("Stdin closed, exiting");
    Ok(())
}

/// Read `input` into `buffer` until EOF or a read error.
fn spawn_input_pump<R>(mut input: R, buffer: Arc<StartupBuffer>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = BytesMut::with_capacity(READ_CHUNK_BYTES);
        loop {
            chunk.reserve(READ_CHUNK_BYTES);
            match input.read_buf(&mut chunk).await {
                Ok(0) => break,
                Ok(_) => buffer.push(chunk.split().freeze()),
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin, treating as EOF");
                    break;
                }
            }
        }
        buffer.end();
    })
}
