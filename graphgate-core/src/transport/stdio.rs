//! Newline-delimited JSON transport over a byte-chunk input and an
//! `AsyncWrite` output (normally stdin / stdout).
//!
//! Input arrives as raw chunks through [`ChunkSink`] so the same code path
//! handles chunks replayed from the startup buffer and chunks read live.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ChunkSink, CloseCallback, FramingError, Transport, TransportError, decode_message};

/// Maximum NDJSON message size (10 MB).
pub const MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;

/// Splits a byte stream into NDJSON lines.
///
/// Blank lines are skipped. A line longer than the limit yields one
/// `MessageTooLarge` error and the rest of that line is discarded.
#[derive(Debug)]
pub struct LineFramer {
    buf: BytesMut,
    // Prefix of `buf` already known to hold no newline.
    scanned: usize,
    max_bytes: usize,
    discarding: bool,
}

impl LineFramer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            scanned: 0,
            max_bytes,
            discarding: false,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line, if one is buffered.
    pub fn next_line(&mut self) -> Option<Result<Bytes, FramingError>> {
        loop {
            let newline = self.buf[self.scanned..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|offset| self.scanned + offset);
            match newline {
                Some(pos) => {
                    let mut line = self.buf.split_to(pos + 1);
                    self.scanned = 0;
                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }
                    line.truncate(pos);
                    if let Some(result) = self.complete(line) {
                        return Some(result);
                    }
                }
                None => {
                    if self.discarding {
                        self.buf.clear();
                    } else if self.buf.len() > self.max_bytes {
                        self.buf.clear();
                        self.discarding = true;
                        self.scanned = 0;
                        return Some(Err(self.too_large()));
                    }
                    self.scanned = self.buf.len();
                    return None;
                }
            }
        }
    }

    /// Flush an unterminated trailing line at EOF.
    pub fn finish(&mut self) -> Option<Result<Bytes, FramingError>> {
        self.scanned = 0;
        if self.discarding {
            self.buf.clear();
            self.discarding = false;
            return None;
        }
        let rest = self.buf.split();
        self.complete(rest)
    }

    fn complete(&self, mut line: BytesMut) -> Option<Result<Bytes, FramingError>> {
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        if line.len() > self.max_bytes {
            return Some(Err(self.too_large()));
        }
        Some(Ok(line.freeze()))
    }

    fn too_large(&self) -> FramingError {
        FramingError::MessageTooLarge {
            max_bytes: self.max_bytes,
        }
    }
}

struct InputState {
    rx: mpsc::UnboundedReceiver<Bytes>,
    framer: LineFramer,
    eof: bool,
}

/// NDJSON transport. Feed input through its [`ChunkSink`] impl.
pub struct StdioTransport {
    input_tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    input: tokio::sync::Mutex<InputState>,
    output: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    cancel: CancellationToken,
    closed: AtomicBool,
    callbacks: Mutex<Vec<CloseCallback>>,
}

impl StdioTransport {
    pub fn new<W>(output: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_limit(output, MAX_MESSAGE_BYTES)
    }

    pub fn with_limit<W>(output: W, max_bytes: usize) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            input_tx: Mutex::new(Some(tx)),
            input: tokio::sync::Mutex::new(InputState {
                rx,
                framer: LineFramer::new(max_bytes),
                eof: false,
            }),
            output: tokio::sync::Mutex::new(Box::new(output)),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    fn take_callbacks(&self) -> Vec<CloseCallback> {
        match self.callbacks.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl ChunkSink for StdioTransport {
    fn push_chunk(&self, chunk: Bytes) {
        let guard = match self.input_tx.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(tx) = guard.as_ref() {
            if tx.send(chunk).is_err() {
                debug!("Input chunk dropped after transport closed");
            }
        }
    }

    fn end_of_input(&self) {
        let mut guard = match self.input_tx.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.take();
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, message: Value) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');

        let mut out = self.output.lock().await;
        out.write_all(&line).await?;
        out.flush().await?;
        Ok(())
    }

    async fn receive(&self) -> Option<Result<Value, FramingError>> {
        let mut state = self.input.lock().await;
        loop {
            if let Some(line) = state.framer.next_line() {
                return Some(line.and_then(|l| decode_message(&l)));
            }
            if state.eof {
                return state
                    .framer
                    .finish()
                    .map(|line| line.and_then(|l| decode_message(&l)));
            }

            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                chunk = state.rx.recv() => chunk,
            };
            match chunk {
                Some(bytes) => state.framer.push(&bytes),
                None => {
                    debug!("Input reached EOF");
                    state.eof = true;
                }
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.cancel.cancel();
        self.end_of_input();

        let flushed = self.output.lock().await.flush().await;
        for callback in self.take_callbacks() {
            callback();
        }
        if let Err(e) = &flushed {
            warn!(error = %e, "Failed to flush output on close");
        }
        flushed.map_err(TransportError::from)
    }

    fn on_close(&self, callback: CloseCallback) {
        // `close` sets `closed` before draining under this lock, so a
        // callback registered here is either drained or run immediately.
        let mut guard = match self.callbacks.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.closed.load(Ordering::SeqCst) {
            drop(guard);
            callback();
            return;
        }
        guard.push(callback);
    }
}
