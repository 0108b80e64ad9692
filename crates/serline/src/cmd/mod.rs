use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use serline_frame::{Delimiter, LineConfig};
use serline_transport::{FlowControl, Parity, SerialConfig, StopBits, DEFAULT_BAUD_RATE};

use crate::exit::{frame_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod monitor;
pub mod ports;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print every line received on a serial port.
    Monitor(MonitorArgs),
    /// Write one line to a serial port.
    Send(SendArgs),
    /// List available serial ports.
    Ports(PortsArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Monitor(args) => monitor::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Ports(args) => ports::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ParityArg {
    None,
    Odd,
    Even,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum StopBitsArg {
    #[value(name = "1")]
    One,
    #[value(name = "2")]
    Two,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum FlowControlArg {
    None,
    Software,
    Hardware,
}

#[derive(Args, Debug, Clone)]
pub struct SerialArgs {
    /// Serial device (e.g. /dev/ttyUSB0, COM3).
    #[arg(env = "SERLINE_PORT")]
    pub port: PathBuf,
    /// Baud rate.
    #[arg(long, short = 'b', default_value_t = DEFAULT_BAUD_RATE, env = "SERLINE_BAUD")]
    pub baud: u32,
    /// Data bits per character.
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u8).range(5..=8))]
    pub data_bits: u8,
    /// Parity.
    #[arg(long, value_enum, default_value_t = ParityArg::None)]
    pub parity: ParityArg,
    /// Stop bits.
    #[arg(long, value_enum, default_value_t = StopBitsArg::One)]
    pub stop_bits: StopBitsArg,
    /// Flow control.
    #[arg(long, value_enum, default_value_t = FlowControlArg::None)]
    pub flow_control: FlowControlArg,
    /// Read timeout; also how often Ctrl-C is noticed (e.g. 500ms, 2s).
    #[arg(long, default_value = "1s")]
    pub timeout: String,
}

impl SerialArgs {
    pub fn to_config(&self) -> CliResult<SerialConfig> {
        Ok(SerialConfig {
            baud_rate: self.baud,
            data_bits: self.data_bits,
            parity: match self.parity {
                ParityArg::None => Parity::None,
                ParityArg::Odd => Parity::Odd,
                ParityArg::Even => Parity::Even,
            },
            stop_bits: match self.stop_bits {
                StopBitsArg::One => StopBits::One,
                StopBitsArg::Two => StopBits::Two,
            },
            flow_control: match self.flow_control {
                FlowControlArg::None => FlowControl::None,
                FlowControlArg::Software => FlowControl::Software,
                FlowControlArg::Hardware => FlowControl::Hardware,
            },
            timeout: parse_duration(&self.timeout)?,
        })
    }

    pub fn port_name(&self) -> String {
        self.port.display().to_string()
    }
}

#[derive(Args, Debug, Clone)]
pub struct LineArgs {
    /// Line delimiter, with backslash escapes (\r \n \t \0 \\ \xHH).
    #[arg(long, short = 'd', default_value = "\\r\\n")]
    pub delimiter: String,
    /// Maximum line length in bytes. Longer lines are dropped.
    #[arg(long, value_name = "BYTES")]
    pub max_line_length: Option<usize>,
}

impl LineArgs {
    pub fn to_config(&self) -> CliResult<LineConfig> {
        let delimiter = Delimiter::from_escaped(&self.delimiter)
            .map_err(|err| frame_error("invalid --delimiter", err))?;
        Ok(LineConfig {
            delimiter,
            max_line_length: self.max_line_length,
            read_timeout: None,
        })
    }
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub serial: SerialArgs,
    #[command(flatten)]
    pub line: LineArgs,
    /// Exit after printing N lines.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub count: Option<u64>,
    /// Split each line on SEP and trim every field.
    #[arg(long, value_name = "SEP")]
    pub fields: Option<String>,
    /// Keep lines that start with a NUL byte (skipped by default).
    #[arg(long)]
    pub keep_nul: bool,
    /// Run SCRIPT for every line, with the timestamped record as its argument.
    #[arg(long, value_name = "SCRIPT")]
    pub exec: Option<PathBuf>,
    /// Reopen the port after this delay when it fails or closes (e.g. 60s).
    #[arg(long, value_name = "DURATION")]
    pub reconnect_delay: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub serial: SerialArgs,
    #[command(flatten)]
    pub line: LineArgs,
    /// Line to send (delimiter is appended).
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub data: Option<String>,
    /// Read the line to send from a file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Wait for one response line and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug, Default)]
pub struct PortsArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serial_args() -> SerialArgs {
        SerialArgs {
            port: PathBuf::from("/dev/ttyUSB0"),
            baud: 115_200,
            data_bits: 7,
            parity: ParityArg::Even,
            stop_bits: StopBitsArg::Two,
            flow_control: FlowControlArg::Hardware,
            timeout: "250ms".to_string(),
        }
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn serial_args_map_to_config() {
        let cfg = serial_args().to_config().unwrap();
        assert_eq!(cfg.baud_rate, 115_200);
        assert_eq!(cfg.data_bits, 7);
        assert_eq!(cfg.parity, Parity::Even);
        assert_eq!(cfg.stop_bits, StopBits::Two);
        assert_eq!(cfg.flow_control, FlowControl::Hardware);
        assert_eq!(cfg.timeout, Duration::from_millis(250));
    }

    #[test]
    fn line_args_parse_escaped_delimiter() {
        let args = LineArgs {
            delimiter: "\\n".to_string(),
            max_line_length: Some(80),
        };
        let cfg = args.to_config().unwrap();
        assert_eq!(cfg.delimiter, Delimiter::lf());
        assert_eq!(cfg.max_line_length, Some(80));
    }

    #[test]
    fn empty_delimiter_is_usage_error() {
        let args = LineArgs {
            delimiter: String::new(),
            max_line_length: None,
        };
        assert_eq!(args.to_config().unwrap_err().code, USAGE);
    }
}
