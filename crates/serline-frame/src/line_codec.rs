//! `tokio_util` codec for async line framing.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_line, Decoded, Delimiter, LineConfig, LineDecoder};
use crate::error::FrameError;

/// Line codec for `FramedRead` / `FramedWrite`.
///
/// Decoding shares the scanner used by [`LineFramer`](crate::LineFramer).
/// At end of stream an undelimited tail is dropped rather than reported.
#[derive(Debug, Clone)]
pub struct LineCodec {
    decoder: LineDecoder,
    delimiter: Delimiter,
}

impl LineCodec {
    pub fn new(delimiter: Delimiter) -> Self {
        Self::with_config(&LineConfig {
            delimiter,
            ..LineConfig::default()
        })
    }

    pub fn with_config(config: &LineConfig) -> Self {
        Self {
            decoder: config.decoder(),
            delimiter: config.delimiter.clone(),
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::with_config(&LineConfig::default())
    }
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        match self.decoder.decode_next(src) {
            Decoded::Line(line) => Ok(Some(line)),
            Decoded::Oversized { size, max } => Err(FrameError::LineTooLong { size, max }),
            Decoded::Incomplete => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if !src.is_empty() {
            tracing::debug!(dropped = src.len(), "dropping undelimited tail at EOF");
            src.clear();
            self.decoder.reset();
        }
        Ok(None)
    }
}

impl Encoder<&[u8]> for LineCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_line(item, &self.delimiter, dst)
    }
}

impl Encoder<Bytes> for LineCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_line(&item, &self.delimiter, dst)
    }
}
