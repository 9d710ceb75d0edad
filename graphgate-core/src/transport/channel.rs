//! In-process transport backing one Streamable HTTP session.
//!
//! HTTP handlers push client messages in with [`ChannelTransport::deliver`]
//! or [`ChannelTransport::request`]. Responses the dispatcher sends are routed
//! back to the waiting POST by JSON-RPC id; everything else goes out on the
//! session's SSE stream.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{CloseCallback, FramingError, Transport, TransportError};
use crate::jsonrpc::JsonRpcId;

const INBOUND_CAPACITY: usize = 256;
const SSE_CAPACITY: usize = 64;

pub struct ChannelTransport {
    inbound_tx: mpsc::Sender<Value>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<Value>>,
    pending: DashMap<JsonRpcId, oneshot::Sender<Value>>,
    sse: broadcast::Sender<Value>,
    cancel: CancellationToken,
    closed: AtomicBool,
    callbacks: Mutex<Vec<CloseCallback>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (sse, _) = broadcast::channel(SSE_CAPACITY);
        Self {
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            pending: DashMap::new(),
            sse,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Hand a notification or client response to the dispatcher.
    pub async fn deliver(&self, message: Value) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.inbound_tx
            .send(message)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Hand a request to the dispatcher and get a receiver for its response.
    ///
    /// The receiver errors if the transport closes before the response is
    /// sent.
    pub async fn request(
        &self,
        id: JsonRpcId,
        message: Value,
    ) -> Result<oneshot::Receiver<Value>, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);
        if let Err(e) = self.deliver(message).await {
            self.pending.remove(&id);
            return Err(e);
        }
        Ok(rx)
    }

    /// Subscribe to server-initiated messages (the SSE stream).
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.sse.subscribe()
    }

    /// Resolves when the transport closes.
    pub fn closed(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn response_id(message: &Value) -> Option<JsonRpcId> {
    if message.get("method").is_some() {
        return None;
    }
    message.get("id").and_then(JsonRpcId::from_value)
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, message: Value) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        if let Some(id) = response_id(&message) {
            if let Some((_, waiter)) = self.pending.remove(&id) {
                // The POST may have gone away; its result is discarded.
                if waiter.send(message).is_err() {
                    debug!(id = %id, "Response waiter dropped");
                }
                return Ok(());
            }
        }

        if self.sse.send(message).is_err() {
            trace!("No SSE subscribers for server message");
        }
        Ok(())
    }

    async fn receive(&self) -> Option<Result<Value, FramingError>> {
        let mut rx = self.inbound_rx.lock().await;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            msg = rx.recv() => msg.map(Ok),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.cancel.cancel();
        self.pending.clear();

        let callbacks = match self.callbacks.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for callback in callbacks {
            callback();
        }
        Ok(())
    }

    fn on_close(&self, callback: CloseCallback) {
        // Checked under the lock `close` drains with, so no callback is lost.
        let mut guard = match self.callbacks.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.is_closed() {
            drop(guard);
            callback();
            return;
        }
        guard.push(callback);
    }
}
