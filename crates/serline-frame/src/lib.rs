//! Delimiter-based line framing over chunked serial byte streams.
//!
//! The core is [`LineFramer`]: feed it chunks as they arrive and it calls
//! registered observers once per completed line, delimiter excluded. A
//! delimiter split across chunks is still found; bytes after the last
//! delimiter wait for more input and are dropped if the framer closes
//! first.
//!
//! Around the framer:
//! - [`pump`] drives a framer from any blocking `Read` source
//! - [`LineReader`] / [`LineWriter`] give pull-style reads and writes
//! - [`SharedFramer`] serializes access for multi-threaded hosts
//! - [`LineCodec`] adapts the same scanner to `tokio_util` (feature `async`)

pub mod codec;
pub mod error;
pub mod framer;
pub mod pump;
pub mod reader;
pub mod shared;
pub mod writer;

#[cfg(feature = "async")]
pub mod line_codec;

pub use codec::{encode_line, find_delimiter, Decoded, Delimiter, LineConfig, LineDecoder};
pub use error::{FrameError, FramerError, Result, StreamError};
pub use framer::{FramerState, LineFramer};
#[cfg(feature = "async")]
pub use line_codec::LineCodec;
pub use pump::{pump, LineSink, PumpExit};
pub use reader::{LineReader, Lines};
pub use shared::SharedFramer;
pub use writer::LineWriter;
