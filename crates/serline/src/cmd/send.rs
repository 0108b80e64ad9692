use std::fs;
use std::io::Read;

use serline_frame::{FrameError, LineConfig, LineReader, LineWriter};
use serline_transport::SerialStream;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{
    frame_error, transport_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT,
};
use crate::output::{print_line, LineRecord, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let serial = args.serial.to_config()?;
    let line = args.line.to_config()?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args, &line)?;

    let stream = SerialStream::open(&args.serial.port, &serial)
        .map_err(|err| transport_error("open failed", err))?;

    let response = if args.wait {
        let read_half = stream
            .try_clone()
            .map_err(|err| transport_error("clone failed", err))?;
        let mut reader = LineReader::with_config_serial(
            read_half,
            LineConfig {
                read_timeout: Some(wait_timeout),
                ..line.clone()
            },
        )
        .map_err(|err| frame_error("configure failed", err))?;

        send(stream, &line, &payload)?;
        Some(wait_for_response(&mut reader)?)
    } else {
        send(stream, &line, &payload)?;
        None
    };

    tracing::info!(port = %args.serial.port_name(), size = payload.len(), "line sent");

    if let Some(reply) = response {
        let record = LineRecord::new(&args.serial.port_name(), &reply, None);
        print_line(&record, format)
            .map_err(|err| CliError::new(FAILURE, format!("write to stdout failed: {err}")))?;
    }

    Ok(SUCCESS)
}

fn send(stream: SerialStream, line: &LineConfig, payload: &[u8]) -> CliResult<()> {
    let mut writer = LineWriter::with_config(stream, line.clone());
    writer
        .send_line(payload)
        .map_err(|err| frame_error("send failed", err))
}

fn resolve_payload(args: &SendArgs, line: &LineConfig) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        let raw = fs::read(path).map_err(|err| {
            CliError::new(
                FAILURE,
                format!("failed reading {}: {err}", path.display()),
            )
        })?;
        return Ok(strip_line_ending(raw, line));
    }
    Ok(Vec::new())
}

/// Files usually end with a newline; drop it so it is not sent twice.
fn strip_line_ending(mut raw: Vec<u8>, line: &LineConfig) -> Vec<u8> {
    let delimiter = line.delimiter.as_bytes();
    if raw.ends_with(delimiter) {
        raw.truncate(raw.len() - delimiter.len());
    } else {
        while matches!(raw.last(), Some(b'\n' | b'\r')) {
            raw.pop();
        }
    }
    raw
}

fn wait_for_response<R: Read>(reader: &mut LineReader<R>) -> CliResult<Vec<u8>> {
    match reader.read_line() {
        Ok(line) => Ok(line.to_vec()),
        Err(FrameError::Io(err)) if err.kind() == std::io::ErrorKind::TimedOut => Err(
            CliError::new(TIMEOUT, "no response line before --wait-timeout"),
        ),
        Err(err) => Err(frame_error("receive failed", err)),
    }
}
