/// Errors from line readers, writers and codecs.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A delimiter must contain at least one byte.
    #[error("delimiter must not be empty")]
    EmptyDelimiter,

    /// An escaped delimiter string could not be parsed.
    #[error("invalid delimiter escape: {0}")]
    InvalidEscape(String),

    /// A line exceeded the configured maximum length.
    #[error("line too long ({size} bytes, max {max})")]
    LineTooLong { size: usize, max: usize },

    /// An outgoing payload contains the delimiter and would split on the wire.
    #[error("payload contains the line delimiter")]
    EmbeddedDelimiter,

    /// An I/O error occurred while reading or writing lines.
    #[error("line I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended. Any undelimited trailing bytes were dropped.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;

/// Errors returned synchronously by [`LineFramer`](crate::LineFramer) calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramerError {
    /// The framer is closed; no further input is accepted.
    #[error("framer is closed")]
    InvalidState,

    /// A line grew past the configured maximum and was discarded.
    ///
    /// `size` counts the bytes seen when the limit tripped, not the full
    /// length of the discarded line.
    #[error("line too long ({size} bytes, max {max})")]
    LineTooLong { size: usize, max: usize },
}

/// An error reported by the byte stream source.
///
/// Delivered to error observers before the framer closes. The description is
/// opaque; `kind` is kept when the error came from an `io::Error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StreamError {
    message: String,
    kind: Option<std::io::ErrorKind>,
}

impl StreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> Option<std::io::ErrorKind> {
        self.kind
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        Self {
            message: err.to_string(),
            kind: Some(err.kind()),
        }
    }
}
