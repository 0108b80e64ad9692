//! Print every line a serial device sends until it disconnects or Ctrl-C.
//!
//! Run with:
//!   cargo run --example read-port -- /dev/ttyUSB0 9600
//!
//! Lines are split on `\r\n`; a trailing partial line is dropped on exit.

use std::sync::atomic::AtomicBool;

use serline::frame::{pump, Delimiter, LineFramer, PumpExit};
use serline::transport::{SerialConfig, SerialStream};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let path = args.next().ok_or("usage: read-port <device> [baud]")?;
    let baud_rate = match args.next() {
        Some(baud) => baud.parse()?,
        None => serline::transport::DEFAULT_BAUD_RATE,
    };

    let config = SerialConfig {
        baud_rate,
        ..SerialConfig::default()
    };
    let mut stream = SerialStream::open(&path, &config)?;
    eprintln!("Reading {path} at {baud_rate} baud");

    let mut framer = LineFramer::new(Delimiter::crlf());
    framer.on_line(|line| println!("{}", String::from_utf8_lossy(line)));
    framer.on_error(|err| eprintln!("stream error: {err}"));

    match pump(&mut stream, &mut framer, &AtomicBool::new(false)) {
        PumpExit::Failed(err) => Err(err.into()),
        exit => {
            eprintln!("Stopped: {exit:?}");
            Ok(())
        }
    }
}
