use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{FramerError, StreamError};
use crate::framer::LineFramer;
use crate::shared::SharedFramer;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Receiving end of a pump: the framer operations a byte source drives.
pub trait LineSink {
    fn feed(&mut self, chunk: &[u8]) -> Result<usize, FramerError>;
    fn fail(&mut self, err: StreamError) -> bool;
    fn close(&mut self);
}

impl LineSink for LineFramer {
    fn feed(&mut self, chunk: &[u8]) -> Result<usize, FramerError> {
        LineFramer::feed(self, chunk)
    }

    fn fail(&mut self, err: StreamError) -> bool {
        LineFramer::fail(self, err)
    }

    fn close(&mut self) {
        LineFramer::close(self)
    }
}

impl LineSink for SharedFramer {
    fn feed(&mut self, chunk: &[u8]) -> Result<usize, FramerError> {
        SharedFramer::feed(self, chunk)
    }

    fn fail(&mut self, err: StreamError) -> bool {
        SharedFramer::fail(self, err)
    }

    fn close(&mut self) {
        SharedFramer::close(self)
    }
}

/// Why [`pump`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpExit {
    /// The source reported end of stream. The sink was closed.
    EndOfStream,
    /// The stop flag was raised. The sink was closed.
    Stopped,
    /// The source failed. The error went to the sink's error observers.
    Failed(StreamError),
    /// The sink was closed by someone else.
    Closed,
}

/// Move bytes from `source` into `sink` until the stream ends, fails, or
/// `stop` is raised.
///
/// Read timeouts are not errors: they are the points where `stop` is
/// checked, so sources should carry a finite read timeout.
pub fn pump<R, S>(source: &mut R, sink: &mut S, stop: &AtomicBool) -> PumpExit
where
    R: Read + ?Sized,
    S: LineSink + ?Sized,
{
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        if stop.load(Ordering::SeqCst) {
            sink.close();
            return PumpExit::Stopped;
        }

        let read = match source.read(&mut chunk) {
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                continue
            }
            Err(err) => {
                let err = StreamError::from(err);
                sink.fail(err.clone());
                return PumpExit::Failed(err);
            }
        };

        if read == 0 {
            tracing::debug!("byte source reached end of stream");
            sink.close();
            return PumpExit::EndOfStream;
        }

        match sink.feed(&chunk[..read]) {
            Ok(_) => {}
            Err(FramerError::LineTooLong { size, max }) => {
                tracing::warn!(size, max, "oversized line dropped");
            }
            Err(FramerError::InvalidState) => return PumpExit::Closed,
        }
    }
}
