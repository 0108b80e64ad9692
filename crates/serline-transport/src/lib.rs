//! Serial port byte stream source.
//!
//! Opens and configures a serial device and hands back a [`SerialStream`]
//! implementing `Read + Write`. Everything above the raw byte stream
//! (delimiting, observers, the CLI) lives in other serline crates.
//!
//! Baud rate, parity and friends are entirely this crate's concern; the
//! framing layer only ever sees bytes.

pub mod config;
pub mod error;
pub mod ports;
pub mod stream;

pub use config::{FlowControl, Parity, SerialConfig, StopBits, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT};
pub use error::{Result, TransportError};
pub use ports::{available_ports, PortInfo, PortKind};
pub use stream::SerialStream;
