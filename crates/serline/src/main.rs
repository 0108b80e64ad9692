mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "serline", version, about = "Line-oriented serial port CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Also append log output to this file.
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = init_logging(cli.log_format, cli.log_level, cli.log_file.as_deref()) {
        eprintln!("error: cannot open log file: {err}");
        std::process::exit(exit::USAGE);
    }

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            tracing::error!(code = err.code, "{err}");
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_monitor_subcommand() {
        let cli = Cli::try_parse_from([
            "serline",
            "monitor",
            "/dev/ttyUSB0",
            "--baud",
            "115200",
            "--delimiter",
            "\\n",
            "--count",
            "3",
        ])
        .expect("monitor args should parse");

        match cli.command {
            Command::Monitor(args) => {
                assert_eq!(args.serial.baud, 115_200);
                assert_eq!(args.line.delimiter, "\\n");
                assert_eq!(args.count, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn monitor_defaults() {
        let cli = Cli::try_parse_from(["serline", "monitor", "/dev/ttyS0"])
            .expect("monitor args should parse");

        match cli.command {
            Command::Monitor(args) => {
                assert_eq!(args.serial.baud, 9600);
                assert_eq!(args.serial.data_bits, 8);
                assert_eq!(args.line.delimiter, "\\r\\n");
                assert!(!args.keep_nul);
                assert!(args.exec.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from(["serline", "send", "/dev/ttyUSB0", "--data", "AT"])
            .expect("send args should parse");

        assert!(matches!(cli.command, Command::Send(_)));
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "serline",
            "send",
            "/dev/ttyUSB0",
            "--file",
            "/tmp/payload",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_out_of_range_data_bits() {
        let err = Cli::try_parse_from(["serline", "monitor", "/dev/ttyS0", "--data-bits", "9"])
            .expect_err("data bits above 8 should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn rejects_zero_count() {
        let err = Cli::try_parse_from(["serline", "monitor", "/dev/ttyS0", "--count", "0"])
            .expect_err("a zero count would never stop");

        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "serline",
            "ports",
            "--format",
            "json",
            "--log-level",
            "debug",
        ])
        .expect("global flags should parse");

        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        assert!(matches!(cli.command, Command::Ports(_)));
    }
}
