use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use serline_transport::SerialStream;

use crate::codec::{Decoded, LineConfig, LineDecoder};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete lines from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete lines,
/// delimiter excluded.
pub struct LineReader<T> {
    inner: T,
    buf: BytesMut,
    decoder: LineDecoder,
    config: LineConfig,
}

impl<T: Read> LineReader<T> {
    /// Create a new line reader with default configuration (`\r\n`, unbounded).
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, LineConfig::default())
    }

    /// Create a new line reader with explicit configuration.
    pub fn with_config(inner: T, config: LineConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            decoder: config.decoder(),
            config,
        }
    }

    /// Read the next complete line (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached; an
    /// undelimited tail is dropped. Read timeouts surface as
    /// `FrameError::Io` and leave buffered bytes in place, so the call can
    /// be retried.
    pub fn read_line(&mut self) -> Result<Bytes> {
        loop {
            match self.decoder.decode_next(&mut self.buf) {
                Decoded::Line(line) => return Ok(line),
                Decoded::Oversized { size, max } => {
                    return Err(FrameError::LineTooLong { size, max })
                }
                Decoded::Incomplete => {}
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if !self.buf.is_empty() {
                    tracing::debug!(dropped = self.buf.len(), "dropping undelimited tail at EOF");
                    self.buf.clear();
                    self.decoder.reset();
                }
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Iterate over lines until the stream closes.
    ///
    /// `ConnectionClosed` ends the iteration; any other error is yielded.
    pub fn lines(&mut self) -> Lines<'_, T> {
        Lines { reader: self }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum line length for subsequent reads.
    pub fn set_max_line_length(&mut self, max_line_length: Option<usize>) {
        self.config.max_line_length = max_line_length;
        self.decoder.set_max_line_length(max_line_length);
    }

    /// Current line reader configuration.
    pub fn config(&self) -> &LineConfig {
        &self.config
    }
}

impl LineReader<SerialStream> {
    /// Create a line reader for a serial port and apply the read timeout from config.
    pub fn with_config_serial(mut inner: SerialStream, config: LineConfig) -> Result<Self> {
        if let Some(timeout) = config.read_timeout {
            inner
                .set_timeout(timeout)
                .map_err(transport_to_frame_error)?;
        }
        Ok(Self::with_config(inner, config))
    }
}

fn transport_to_frame_error(err: serline_transport::TransportError) -> FrameError {
    match err {
        serline_transport::TransportError::Io(io) => FrameError::Io(io),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

/// Iterator returned by [`LineReader::lines`].
pub struct Lines<'a, T> {
    reader: &'a mut LineReader<T>,
}

impl<T: Read> Iterator for Lines<'_, T> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_line() {
            Ok(line) => Some(Ok(line)),
            Err(FrameError::ConnectionClosed) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
