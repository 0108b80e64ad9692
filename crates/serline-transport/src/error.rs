use std::path::PathBuf;

/// Errors that can occur in serial transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the specified device.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: serialport::Error,
    },

    /// A port setting was rejected before or after opening.
    #[error("invalid serial setting: {0}")]
    Configure(String),

    /// Port enumeration failed.
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(serialport::Error),

    /// An I/O error occurred on the serial stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Best-effort `io::ErrorKind` for exit-code mapping.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            TransportError::Open { source, .. } | TransportError::Enumerate(source) => {
                match source.kind() {
                    serialport::ErrorKind::Io(kind) => Some(kind),
                    serialport::ErrorKind::NoDevice => Some(std::io::ErrorKind::NotFound),
                    serialport::ErrorKind::InvalidInput => Some(std::io::ErrorKind::InvalidInput),
                    serialport::ErrorKind::Unknown => None,
                }
            }
            TransportError::Io(err) => Some(err.kind()),
            TransportError::Configure(_) => Some(std::io::ErrorKind::InvalidInput),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
