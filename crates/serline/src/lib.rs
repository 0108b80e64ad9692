//! Read delimiter-terminated lines from serial ports.
//!
//! serline opens a serial device, splits its byte stream into lines, and
//! hands each line to observers. Errors from the device are reported once
//! and close the framer; bytes after the last delimiter are never surfaced.
//!
//! # Crate Structure
//!
//! - [`transport`]: serial port byte source (open, configure, enumerate)
//! - [`frame`]: line framing: framer, pump, reader, writer, async codec

/// Re-export transport types.
pub mod transport {
    pub use serline_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use serline_frame::*;
}
