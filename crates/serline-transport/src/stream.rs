use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::SerialConfig;
use crate::error::{Result, TransportError};

/// An open serial device. Implements `Read` and `Write`.
///
/// Reads block for at most the configured timeout and then fail with
/// `ErrorKind::TimedOut`; callers that poll treat that as "no data yet".
pub struct SerialStream {
    inner: Box<dyn serialport::SerialPort>,
    path: PathBuf,
}

impl SerialStream {
    /// Open and configure a serial device.
    pub fn open(path: impl AsRef<Path>, config: &SerialConfig) -> Result<Self> {
        let path = path.as_ref();
        let name = path.to_string_lossy();
        let inner = config
            .builder(&name)?
            .open()
            .map_err(|source| TransportError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::debug!(
            path = %path.display(),
            baud = config.baud_rate,
            "serial port opened"
        );

        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }

    /// Wrap an already opened port.
    pub fn from_port(inner: Box<dyn serialport::SerialPort>) -> Self {
        let path = PathBuf::from(inner.name().unwrap_or_default());
        Self { inner, path }
    }

    /// Device path this stream was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Port name as reported by the driver, if any.
    pub fn name(&self) -> Option<String> {
        self.inner.name()
    }

    /// Set the read timeout on the underlying port.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.inner
            .set_timeout(timeout)
            .map_err(|err| TransportError::Io(err.into()))
    }

    /// Current read timeout.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout()
    }

    /// Try to clone this stream (shares the same device handle).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self
            .inner
            .try_clone()
            .map_err(|err| TransportError::Io(err.into()))?;
        Ok(Self {
            inner: cloned,
            path: self.path.clone(),
        })
    }

    /// Close the port. Dropping the stream has the same effect.
    pub fn close(self) {
        tracing::debug!(path = %self.path.display(), "serial port closed");
    }
}

impl Read for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for SerialStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialStream")
            .field("path", &self.path)
            .finish()
    }
}
