use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::error::{FramerError, StreamError};
use crate::framer::{FramerState, LineFramer};

/// Clonable, thread-safe handle to a [`LineFramer`].
///
/// For hosts whose stream events arrive on more than one thread. Every call
/// takes one lock, so buffer mutation and observer delivery stay serialized.
/// Observers run while the lock is held and must not call back into the
/// same handle.
#[derive(Clone, Debug)]
pub struct SharedFramer {
    inner: Arc<Mutex<LineFramer>>,
}

impl SharedFramer {
    pub fn new(framer: LineFramer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(framer)),
        }
    }

    pub fn feed(&self, chunk: &[u8]) -> Result<usize, FramerError> {
        self.lock().feed(chunk)
    }

    pub fn fail(&self, err: StreamError) -> bool {
        self.lock().fail(err)
    }

    pub fn close(&self) {
        self.lock().close();
    }

    pub fn on_line<F>(&self, observer: F)
    where
        F: FnMut(&Bytes) + Send + 'static,
    {
        self.lock().on_line(observer);
    }

    pub fn on_error<F>(&self, observer: F)
    where
        F: FnMut(&StreamError) + Send + 'static,
    {
        self.lock().on_error(observer);
    }

    pub fn subscribe(&self) -> mpsc::Receiver<Bytes> {
        self.lock().subscribe()
    }

    pub fn state(&self) -> FramerState {
        self.lock().state()
    }

    pub fn buffered_len(&self) -> usize {
        self.lock().buffered_len()
    }

    // A panic inside feed is already caught per observer, so a poisoned
    // lock still guards a consistent framer.
    fn lock(&self) -> MutexGuard<'_, LineFramer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
