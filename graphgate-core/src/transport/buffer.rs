//! Ordered buffering of raw input while startup authentication runs.
//!
//! A parent process may write its `initialize` line before the token
//! exchange finishes. The stdin reader pushes every chunk here from process
//! start. Once authentication succeeds the transport is attached and the
//! queued chunks are replayed into it, in arrival order, before any live
//! chunk. On failure the queue is discarded without being inspected.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tracing::debug;

/// Receives raw input chunks. Implementations must not block.
pub trait ChunkSink: Send + Sync {
    fn push_chunk(&self, chunk: Bytes);

    /// No further chunks will arrive.
    fn end_of_input(&self);
}

enum State {
    Buffering { chunks: VecDeque<Bytes>, eof: bool },
    Attached(Arc<dyn ChunkSink>),
    Discarded,
}

pub struct StartupBuffer {
    state: Mutex<State>,
}

impl StartupBuffer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Buffering {
                chunks: VecDeque::new(),
                eof: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queue a chunk, or forward it if a sink is attached.
    pub fn push(&self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        match &mut *self.lock() {
            State::Buffering { chunks, .. } => chunks.push_back(chunk),
            State::Attached(sink) => sink.push_chunk(chunk),
            State::Discarded => {}
        }
    }

    /// Record end of input.
    pub fn end(&self) {
        match &mut *self.lock() {
            State::Buffering { eof, .. } => *eof = true,
            State::Attached(sink) => sink.end_of_input(),
            State::Discarded => {}
        }
    }

    /// Replay buffered chunks into `sink` and forward everything after.
    ///
    /// Returns the number of chunks replayed. Replay happens under the same
    /// lock as [`push`](Self::push), so no live chunk can overtake a
    /// buffered one.
    pub fn attach(&self, sink: Arc<dyn ChunkSink>) -> usize {
        let mut state = self.lock();
        let previous = std::mem::replace(&mut *state, State::Attached(Arc::clone(&sink)));
        match previous {
            State::Buffering { chunks, eof } => {
                let replayed = chunks.len();
                for chunk in chunks {
                    sink.push_chunk(chunk);
                }
                if eof {
                    sink.end_of_input();
                }
                debug!(replayed, eof, "Startup buffer attached");
                replayed
            }
            State::Attached(_) => 0,
            State::Discarded => {
                *state = State::Discarded;
                0
            }
        }
    }

    /// Drop buffered input and ignore anything that arrives later.
    pub fn discard(&self) -> usize {
        let previous = std::mem::replace(&mut *self.lock(), State::Discarded);
        match previous {
            State::Buffering { chunks, .. } => chunks.len(),
            _ => 0,
        }
    }

    pub fn buffered_chunks(&self) -> usize {
        match &*self.lock() {
            State::Buffering { chunks, .. } => chunks.len(),
            _ => 0,
        }
    }
}

impl Default for StartupBuffer {
    fn default() -> Self {
        Self::new()
    }
}
