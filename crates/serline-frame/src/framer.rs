use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;

use bytes::{Bytes, BytesMut};

use crate::codec::{Decoded, Delimiter, LineConfig, LineDecoder};
use crate::error::{FramerError, StreamError};

const INITIAL_BUFFER_CAPACITY: usize = 1024;

type LineObserver = Box<dyn FnMut(&Bytes) + Send>;
type ErrorObserver = Box<dyn FnMut(&StreamError) + Send>;

/// Lifecycle of a [`LineFramer`]. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    Open,
    Closed,
}

/// Turns a chunked byte stream into delimiter-terminated lines and hands
/// each line to registered observers.
///
/// Delivery is synchronous: observers run inside [`feed`](Self::feed) and
/// [`fail`](Self::fail), in registration order, so a slow observer delays
/// the lines behind it. Use [`subscribe`](Self::subscribe) for queued
/// delivery instead. A panicking observer is isolated; the framer and the
/// remaining observers are unaffected.
///
/// Bytes left without a terminating delimiter when the framer closes are
/// dropped and never reported.
pub struct LineFramer {
    state: FramerState,
    buf: BytesMut,
    decoder: LineDecoder,
    line_observers: Vec<LineObserver>,
    error_observers: Vec<ErrorObserver>,
}

impl LineFramer {
    /// Create an unbounded framer for `delimiter`.
    pub fn new(delimiter: Delimiter) -> Self {
        Self::with_config(&LineConfig {
            delimiter,
            ..LineConfig::default()
        })
    }

    /// Create a framer with explicit configuration.
    pub fn with_config(config: &LineConfig) -> Self {
        Self {
            state: FramerState::Open,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            decoder: config.decoder(),
            line_observers: Vec::new(),
            error_observers: Vec::new(),
        }
    }

    /// Register a callback for every completed line.
    pub fn on_line<F>(&mut self, observer: F)
    where
        F: FnMut(&Bytes) + Send + 'static,
    {
        if self.is_closed() {
            return;
        }
        self.line_observers.push(Box::new(observer));
    }

    /// Register a callback for stream errors.
    pub fn on_error<F>(&mut self, observer: F)
    where
        F: FnMut(&StreamError) + Send + 'static,
    {
        if self.is_closed() {
            return;
        }
        self.error_observers.push(Box::new(observer));
    }

    /// Queue lines into a channel instead of calling back.
    ///
    /// The receiver disconnects once the framer closes and the queue drains.
    pub fn subscribe(&mut self) -> mpsc::Receiver<Bytes> {
        let (tx, rx) = mpsc::channel();
        self.on_line(move |line| {
            let _ = tx.send(line.clone());
        });
        rx
    }

    /// Append a chunk and deliver every line it completes.
    ///
    /// Returns the number of lines delivered. When a line exceeds the
    /// configured maximum it is discarded, the rest of the chunk is still
    /// processed, and `LineTooLong` is returned at the end.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<usize, FramerError> {
        if self.is_closed() {
            return Err(FramerError::InvalidState);
        }
        if chunk.is_empty() {
            return Ok(0);
        }

        self.buf.extend_from_slice(chunk);

        let mut emitted = 0usize;
        let mut oversized = None;
        loop {
            match self.decoder.decode_next(&mut self.buf) {
                Decoded::Line(line) => {
                    self.emit(&line);
                    emitted += 1;
                }
                Decoded::Oversized { size, max } => {
                    tracing::warn!(size, max, "discarding oversized line");
                    oversized.get_or_insert(FramerError::LineTooLong { size, max });
                }
                Decoded::Incomplete => break,
            }
        }

        match oversized {
            Some(err) => Err(err),
            None => Ok(emitted),
        }
    }

    /// Report a stream error: notify error observers once, then close.
    ///
    /// Returns `false` when the framer was already closed and nothing was
    /// delivered.
    pub fn fail(&mut self, err: StreamError) -> bool {
        if self.is_closed() {
            tracing::debug!(error = %err, "stream error after close ignored");
            return false;
        }

        tracing::debug!(error = %err, "stream error, closing framer");
        for (index, observer) in self.error_observers.iter_mut().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| observer(&err))).is_err() {
                tracing::warn!(observer = index, "error observer panicked");
            }
        }
        self.close();
        true
    }

    /// Close the framer. Idempotent.
    ///
    /// Releases the buffer and all observers.
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.state = FramerState::Closed;

        let dropped = self.buf.len();
        if dropped > 0 {
            tracing::debug!(dropped, "dropping undelimited trailing bytes");
        }
        self.buf = BytesMut::new();
        self.decoder.reset();
        self.line_observers.clear();
        self.error_observers.clear();
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == FramerState::Closed
    }

    /// Bytes held for a line that has not been terminated yet.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    pub fn delimiter(&self) -> &Delimiter {
        self.decoder.delimiter()
    }

    fn emit(&mut self, line: &Bytes) {
        for (index, observer) in self.line_observers.iter_mut().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| observer(line))).is_err() {
                tracing::warn!(observer = index, "line observer panicked");
            }
        }
    }
}

impl std::fmt::Debug for LineFramer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineFramer")
            .field("state", &self.state)
            .field("delimiter", self.decoder.delimiter())
            .field("buffered", &self.buf.len())
            .field("line_observers", &self.line_observers.len())
            .field("error_observers", &self.error_observers.len())
            .finish()
    }
}
