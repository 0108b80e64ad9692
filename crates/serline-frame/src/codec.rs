use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Line delimiter: an immutable, non-empty byte sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Delimiter(Bytes);

#[allow(clippy::len_without_is_empty)]
impl Delimiter {
    /// Create a delimiter from raw bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(FrameError::EmptyDelimiter);
        }
        Ok(Self(bytes))
    }

    /// `"\n"`.
    pub fn lf() -> Self {
        Self(Bytes::from_static(b"\n"))
    }

    /// `"\r\n"`.
    pub fn crlf() -> Self {
        Self(Bytes::from_static(b"\r\n"))
    }

    /// Parse a delimiter written with backslash escapes.
    ///
    /// Understands `\r`, `\n`, `\t`, `\0`, `\\` and `\xHH`. Everything else is
    /// taken literally as UTF-8.
    pub fn from_escaped(input: &str) -> Result<Self> {
        let mut out = Vec::with_capacity(input.len());
        let mut chars = input.chars();

        while let Some(c) = chars.next() {
            if c != '\\' {
                let mut utf8 = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
                continue;
            }

            match chars.next() {
                Some('r') => out.push(b'\r'),
                Some('n') => out.push(b'\n'),
                Some('t') => out.push(b'\t'),
                Some('0') => out.push(0),
                Some('\\') => out.push(b'\\'),
                Some('x') => {
                    let hex: String = chars.by_ref().take(2).collect();
                    let byte = u8::from_str_radix(&hex, 16)
                        .ok()
                        .filter(|_| hex.len() == 2)
                        .ok_or_else(|| FrameError::InvalidEscape(format!("\\x{hex}")))?;
                    out.push(byte);
                }
                Some(other) => return Err(FrameError::InvalidEscape(format!("\\{other}"))),
                None => return Err(FrameError::InvalidEscape("trailing backslash".to_string())),
            }
        }

        Self::new(out)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Self::crlf()
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.0.iter() {
            match b {
                b'\r' => f.write_str("\\r")?,
                b'\n' => f.write_str("\\n")?,
                b'\t' => f.write_str("\\t")?,
                b'\\' => f.write_str("\\\\")?,
                0 => f.write_str("\\0")?,
                0x20..=0x7e => write!(f, "{}", b as char)?,
                other => write!(f, "\\x{other:02x}")?,
            }
        }
        Ok(())
    }
}

/// Position of the leftmost `delimiter` occurrence in `haystack`.
pub fn find_delimiter(haystack: &[u8], delimiter: &[u8]) -> Option<usize> {
    match delimiter {
        [] => None,
        [single] => haystack.iter().position(|b| b == single),
        _ => haystack
            .windows(delimiter.len())
            .position(|window| window == delimiter),
    }
}

/// Append `payload` followed by the delimiter.
///
/// Wire format:
/// ```text
/// ┌──────────────────────┬────────────────┐
/// │ Payload (any length) │ Delimiter      │
/// │ must not contain the │ (≥ 1 byte,     │
/// │ delimiter            │  e.g. \r\n)    │
/// └──────────────────────┴────────────────┘
/// ```
pub fn encode_line(payload: &[u8], delimiter: &Delimiter, dst: &mut BytesMut) -> Result<()> {
    if find_delimiter(payload, delimiter.as_bytes()).is_some() {
        return Err(FrameError::EmbeddedDelimiter);
    }
    dst.reserve(payload.len() + delimiter.len());
    dst.put_slice(payload);
    dst.put_slice(delimiter.as_bytes());
    Ok(())
}

/// Outcome of one [`LineDecoder::decode_next`] step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete line, delimiter excluded.
    Line(Bytes),
    /// A line exceeded the maximum length and was dropped.
    ///
    /// `size` is the line length when the limit tripped. For a line whose
    /// delimiter has not arrived yet, that excludes bytes that may start the
    /// delimiter and the bytes discarded afterwards.
    Oversized { size: usize, max: usize },
    /// No complete line in the buffer yet.
    Incomplete,
}

/// Incremental delimiter scanner over an accumulation buffer.
///
/// The search always covers the whole buffer, so a delimiter split across
/// two reads is found. Bytes already scanned are not scanned again, except
/// for the last `delimiter.len() - 1`, which may start a straddling match.
///
/// When a maximum length is set, an oversized line is reported once and
/// then skipped up to and including its delimiter.
#[derive(Debug, Clone)]
pub struct LineDecoder {
    delimiter: Delimiter,
    max_line_length: Option<usize>,
    next_index: usize,
    discarding: bool,
}

impl LineDecoder {
    pub fn new(delimiter: Delimiter, max_line_length: Option<usize>) -> Self {
        Self {
            delimiter,
            max_line_length,
            next_index: 0,
            discarding: false,
        }
    }

    pub fn delimiter(&self) -> &Delimiter {
        &self.delimiter
    }

    pub fn max_line_length(&self) -> Option<usize> {
        self.max_line_length
    }

    pub fn set_max_line_length(&mut self, max_line_length: Option<usize>) {
        self.max_line_length = max_line_length;
    }

    /// Forget scan progress. Call when the buffer is cleared externally.
    pub fn reset(&mut self) {
        self.next_index = 0;
        self.discarding = false;
    }

    /// Split the next line off the front of `src`.
    pub fn decode_next(&mut self, src: &mut BytesMut) -> Decoded {
        let dlen = self.delimiter.len();

        loop {
            let start = self.next_index.min(src.len());
            let Some(offset) = find_delimiter(&src[start..], self.delimiter.as_bytes()) else {
                return self.incomplete(src);
            };
            let idx = start + offset;
            self.next_index = 0;

            if self.discarding {
                src.advance(idx + dlen);
                self.discarding = false;
                continue;
            }

            if let Some(max) = self.max_line_length {
                if idx > max {
                    src.advance(idx + dlen);
                    return Decoded::Oversized { size: idx, max };
                }
            }

            let line = src.split_to(idx).freeze();
            src.advance(dlen);
            return Decoded::Line(line);
        }
    }

    fn incomplete(&mut self, src: &mut BytesMut) -> Decoded {
        // The tail may hold the first bytes of a delimiter.
        let keep = self.delimiter.len() - 1;
        let settled = src.len().saturating_sub(keep);

        if self.discarding {
            src.advance(settled);
            self.next_index = 0;
            return Decoded::Incomplete;
        }

        if let Some(max) = self.max_line_length {
            if settled > max {
                src.advance(settled);
                self.next_index = 0;
                self.discarding = true;
                return Decoded::Oversized { size: settled, max };
            }
        }

        self.next_index = settled;
        Decoded::Incomplete
    }
}

/// Configuration shared by framers, readers, writers and codecs.
#[derive(Debug, Clone)]
pub struct LineConfig {
    /// Line delimiter. Default: `"\r\n"`.
    pub delimiter: Delimiter,
    /// Maximum line length in bytes, delimiter excluded. Default: unbounded.
    pub max_line_length: Option<usize>,
    /// Read timeout applied to serial streams by
    /// [`LineReader::with_config_serial`](crate::LineReader::with_config_serial).
    pub read_timeout: Option<std::time::Duration>,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::crlf(),
            max_line_length: None,
            read_timeout: None,
        }
    }
}

impl LineConfig {
    pub(crate) fn decoder(&self) -> LineDecoder {
        LineDecoder::new(self.delimiter.clone(), self.max_line_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(decoder: &mut LineDecoder, buf: &mut BytesMut) -> Vec<Decoded> {
        let mut out = Vec::new();
        loop {
            match decoder.decode_next(buf) {
                Decoded::Incomplete => return out,
                other => out.push(other),
            }
        }
    }

    fn line(s: &'static [u8]) -> Decoded {
        Decoded::Line(Bytes::from_static(s))
    }

    #[test]
    fn empty_delimiter_rejected() {
        assert!(matches!(
            Delimiter::new(Vec::<u8>::new()),
            Err(FrameError::EmptyDelimiter)
        ));
    }

    #[test]
    fn escaped_delimiters_parse() {
        assert_eq!(Delimiter::from_escaped("\\r\\n").unwrap(), Delimiter::crlf());
        assert_eq!(Delimiter::from_escaped("\\n").unwrap(), Delimiter::lf());
        assert_eq!(
            Delimiter::from_escaped("\\x03;").unwrap().as_bytes(),
            &[0x03, b';']
        );
        assert_eq!(Delimiter::from_escaped("END").unwrap().as_bytes(), b"END");
    }

    #[test]
    fn bad_escapes_rejected() {
        assert!(matches!(
            Delimiter::from_escaped("\\q"),
            Err(FrameError::InvalidEscape(_))
        ));
        assert!(matches!(
            Delimiter::from_escaped("\\xZ1"),
            Err(FrameError::InvalidEscape(_))
        ));
        assert!(matches!(
            Delimiter::from_escaped("\\x4"),
            Err(FrameError::InvalidEscape(_))
        ));
        assert!(matches!(
            Delimiter::from_escaped("abc\\"),
            Err(FrameError::InvalidEscape(_))
        ));
        assert!(matches!(
            Delimiter::from_escaped(""),
            Err(FrameError::EmptyDelimiter)
        ));
    }

    #[test]
    fn display_escapes_control_bytes() {
        assert_eq!(Delimiter::crlf().to_string(), "\\r\\n");
        assert_eq!(Delimiter::new(vec![0x03u8]).unwrap().to_string(), "\\x03");
    }

    #[test]
    fn find_single_and_multi_byte() {
        assert_eq!(find_delimiter(b"ab\ncd", b"\n"), Some(2));
        assert_eq!(find_delimiter(b"ab\r\ncd", b"\r\n"), Some(2));
        assert_eq!(find_delimiter(b"ab\r", b"\r\n"), None);
        assert_eq!(find_delimiter(b"", b"\n"), None);
    }

    #[test]
    fn decodes_lines_and_keeps_tail() {
        let mut decoder = LineDecoder::new(Delimiter::crlf(), None);
        let mut buf = BytesMut::from(&b"A\r\n\r\nB"[..]);

        assert_eq!(lines(&mut decoder, &mut buf), vec![line(b"A"), line(b"")]);
        assert_eq!(&buf[..], b"B");
    }

    #[test]
    fn straddling_delimiter_is_found_after_more_bytes() {
        let mut decoder = LineDecoder::new(Delimiter::crlf(), None);
        let mut buf = BytesMut::from(&b"hello\r"[..]);
        assert_eq!(decoder.decode_next(&mut buf), Decoded::Incomplete);

        buf.extend_from_slice(b"\nworld");
        assert_eq!(decoder.decode_next(&mut buf), line(b"hello"));
        assert_eq!(&buf[..], b"world");
    }

    #[test]
    fn long_delimiter_straddling_many_reads() {
        let mut decoder = LineDecoder::new(Delimiter::new(&b"<EOM>"[..]).unwrap(), None);
        let mut buf = BytesMut::new();
        for chunk in [&b"msg<"[..], b"E", b"O", b"M", b">next"] {
            buf.extend_from_slice(chunk);
            if let Decoded::Line(l) = decoder.decode_next(&mut buf) {
                assert_eq!(l.as_ref(), b"msg");
                assert_eq!(&buf[..], b"next");
                return;
            }
        }
        panic!("delimiter was never found");
    }

    #[test]
    fn oversized_complete_line_is_skipped() {
        let mut decoder = LineDecoder::new(Delimiter::lf(), Some(4));
        let mut buf = BytesMut::from(&b"toolong\nok\n"[..]);

        assert_eq!(
            lines(&mut decoder, &mut buf),
            vec![Decoded::Oversized { size: 7, max: 4 }, line(b"ok")]
        );
    }

    #[test]
    fn oversized_partial_line_discards_until_delimiter() {
        let mut decoder = LineDecoder::new(Delimiter::lf(), Some(4));
        let mut buf = BytesMut::from(&b"abcdef"[..]);

        assert_eq!(
            decoder.decode_next(&mut buf),
            Decoded::Oversized { size: 6, max: 4 }
        );
        assert!(buf.is_empty());

        buf.extend_from_slice(b"gh\nfine\n");
        assert_eq!(lines(&mut decoder, &mut buf), vec![line(b"fine")]);
    }

    #[test]
    fn oversized_partial_size_excludes_pending_delimiter_bytes() {
        let mut decoder = LineDecoder::new(Delimiter::crlf(), Some(4));
        let mut buf = BytesMut::from(&b"abcdef\r"[..]);

        assert_eq!(
            decoder.decode_next(&mut buf),
            Decoded::Oversized { size: 6, max: 4 }
        );
        assert_eq!(&buf[..], b"\r");

        buf.extend_from_slice(b"\nnext\r\n");
        assert_eq!(lines(&mut decoder, &mut buf), vec![line(b"next")]);
    }

    #[test]
    fn line_at_exact_limit_is_accepted() {
        let mut decoder = LineDecoder::new(Delimiter::crlf(), Some(4));
        let mut buf = BytesMut::from(&b"abcd\r"[..]);
        assert_eq!(decoder.decode_next(&mut buf), Decoded::Incomplete);
        buf.extend_from_slice(b"\n");
        assert_eq!(decoder.decode_next(&mut buf), line(b"abcd"));
    }

    #[test]
    fn encode_appends_delimiter() {
        let mut buf = BytesMut::new();
        encode_line(b"ATZ", &Delimiter::crlf(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"ATZ\r\n");
    }

    #[test]
    fn encode_rejects_embedded_delimiter() {
        let mut buf = BytesMut::new();
        let err = encode_line(b"a\r\nb", &Delimiter::crlf(), &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::EmbeddedDelimiter));
        assert!(buf.is_empty());
    }
}
