//! Stdio sessions: startup buffering, framing and EOF handling.
//!
//! Stdin and stdout are in-memory duplex pipes; the GraphQL upstream is a
//! fake executor.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use graphgate::error::StdioError;
use graphgate::stdio::serve_stdio;
use graphgate_core::auth::{BoundToken, EndpointKind};
use graphgate_core::graphql::{GraphqlError, GraphqlExecutor};
use graphgate_core::protocol::McpServer;
use graphgate_core::tools::ToolRegistry;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::oneshot;

#[derive(Default)]
struct RecordingExecutor {
    tokens: Mutex<Vec<String>>,
}

#[async_trait]
impl GraphqlExecutor for RecordingExecutor {
    async fn execute(
        &self,
        _endpoint: EndpointKind,
        token: &BoundToken,
        _document: &str,
        _variables: Value,
    ) -> Result<Value, GraphqlError> {
        self.tokens.lock().unwrap().push(token.token.clone());
        Ok(json!({"partners": {"totalCount": 0, "edges": []}}))
    }
}

fn server(executor: Arc<RecordingExecutor>) -> Arc<McpServer> {
    Arc::new(McpServer::new(Arc::new(ToolRegistry::builtin()), executor))
}

fn line(value: Value) -> Vec<u8> {
    let mut bytes = serde_json::to_vec(&value).unwrap();
    bytes.push(b'\n');
    bytes
}

fn initialize(id: i64) -> Vec<u8> {
    line(json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {"protocolVersion": "2025-03-26", "capabilities": {}}
    }))
}

async fn read_response(reader: &mut BufReader<DuplexStream>) -> Value {
    let mut buf = String::new();
    let read = tokio::time::timeout(Duration::from_secs(5), reader.read_line(&mut buf))
        .await
        .expect("timed out waiting for output")
        .unwrap();
    assert!(read > 0, "output closed before a response arrived");
    serde_json::from_str(&buf).unwrap()
}

#[tokio::test]
async fn test_input_written_during_auth_is_replayed_in_order() {
    let executor = Arc::new(RecordingExecutor::default());
    let (mut stdin, input) = tokio::io::duplex(64 * 1024);
    let (output, stdout) = tokio::io::duplex(64 * 1024);
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let authenticate = async move {
        release_rx.await.unwrap();
        Ok(BoundToken::bearer("mgr-token"))
    };
    let session = tokio::spawn(serve_stdio(
        server(executor.clone()),
        EndpointKind::Manager,
        authenticate,
        input,
        output,
    ));

    // Written while authentication is still pending, split mid-line.
    let init = initialize(1);
    let (head, tail) = init.split_at(10);
    stdin.write_all(head).await.unwrap();
    tokio::task::yield_now().await;
    stdin.write_all(tail).await.unwrap();
    stdin
        .write_all(&line(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})))
        .await
        .unwrap();

    release_tx.send(()).unwrap();

    let mut reader = BufReader::new(stdout);
    let first = read_response(&mut reader).await;
    assert_eq!(first["id"], 1);
    assert_eq!(first["result"]["protocolVersion"], "2025-03-26");

    // Live input after attach flows straight through.
    stdin
        .write_all(&line(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "list_partners", "arguments": {}}
        })))
        .await
        .unwrap();
    let second = read_response(&mut reader).await;
    assert_eq!(second["id"], 2);
    assert_eq!(second["result"]["isError"], false);
    assert_eq!(executor.tokens.lock().unwrap().as_slice(), ["mgr-token"]);

    drop(stdin);
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_auth_failure_discards_input_and_writes_nothing() {
    let executor = Arc::new(RecordingExecutor::default());
    let (mut stdin, input) = tokio::io::duplex(64 * 1024);
    let (output, mut stdout) = tokio::io::duplex(64 * 1024);

    stdin.write_all(&initialize(1)).await.unwrap();

    let authenticate = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Err(StdioError::AuthenticationFailed {
            endpoint: EndpointKind::Partner,
        })
    };
    let result = serve_stdio(
        server(executor.clone()),
        EndpointKind::Partner,
        authenticate,
        input,
        output,
    )
    .await;

    assert!(matches!(
        result,
        Err(StdioError::AuthenticationFailed {
            endpoint: EndpointKind::Partner
        })
    ));
    let mut written = Vec::new();
    stdout.read_to_end(&mut written).await.unwrap();
    assert!(written.is_empty());
    assert!(executor.tokens.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_eof_before_auth_still_answers_buffered_requests() {
    let executor = Arc::new(RecordingExecutor::default());
    let (mut stdin, input) = tokio::io::duplex(64 * 1024);
    let (output, stdout) = tokio::io::duplex(64 * 1024);

    stdin.write_all(&initialize(1)).await.unwrap();
    // Trailing line without a newline is still processed at EOF.
    stdin
        .write_all(br#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#)
        .await
        .unwrap();
    drop(stdin);

    let authenticate = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(BoundToken::bearer("mgr-token"))
    };
    serve_stdio(server(executor), EndpointKind::Manager, authenticate, input, output)
        .await
        .unwrap();

    let mut reader = BufReader::new(stdout);
    let mut ids = vec![
        read_response(&mut reader).await["id"].as_i64().unwrap(),
        read_response(&mut reader).await["id"].as_i64().unwrap(),
    ];
    ids.sort_unstable();
    assert_eq!(ids, [1, 2]);
}

#[tokio::test]
async fn test_framing_errors_are_reported_and_session_continues() {
    let executor = Arc::new(RecordingExecutor::default());
    let (mut stdin, input) = tokio::io::duplex(64 * 1024);
    let (output, stdout) = tokio::io::duplex(64 * 1024);

    let session = tokio::spawn(serve_stdio(
        server(executor),
        EndpointKind::Manager,
        async { Ok(BoundToken::bearer("mgr-token")) },
        input,
        output,
    ));
    let mut reader = BufReader::new(stdout);

    stdin.write_all(b"\n   \n{broken\n").await.unwrap();
    let parse_error = read_response(&mut reader).await;
    assert_eq!(parse_error["error"]["code"], -32700);
    assert_eq!(parse_error["id"], Value::Null);

    stdin.write_all(b"[1,2]\n").await.unwrap();
    let batch = read_response(&mut reader).await;
    assert_eq!(batch["error"]["code"], -32600);

    stdin
        .write_all(&line(json!({"jsonrpc": "2.0", "id": 3, "method": "resources/list"})))
        .await
        .unwrap();
    let unknown = read_response(&mut reader).await;
    assert_eq!(unknown["id"], 3);
    assert_eq!(unknown["error"]["code"], -32601);

    drop(stdin);
    session.await.unwrap().unwrap();
}
