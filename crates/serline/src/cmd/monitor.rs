use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command as Process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serline_frame::{pump, LineConfig, LineFramer, PumpExit};
use serline_transport::SerialStream;

use crate::cmd::{parse_duration, MonitorArgs};
use crate::exit::{
    transport_error, CliError, CliResult, FAILURE, SUCCESS, TRANSPORT_ERROR, USAGE,
};
use crate::output::{write_line, LineRecord, OutputFormat};

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Everything a line observer needs, moved into the closure.
struct LineHandler {
    port: String,
    out: Box<dyn Write + Send>,
    format: OutputFormat,
    separator: Option<String>,
    keep_nul: bool,
    exec: Option<PathBuf>,
    count: Option<u64>,
    printed: u64,
    output_error: Option<io::Error>,
    stop: Arc<AtomicBool>,
}

impl LineHandler {
    fn handle(&mut self, line: &[u8]) {
        if self.output_error.is_some() {
            return;
        }
        if let Some(count) = self.count {
            if self.printed >= count {
                return;
            }
        }
        if !self.keep_nul && line.first() == Some(&0) {
            tracing::debug!(size = line.len(), "skipping NUL-led line");
            return;
        }

        let record = LineRecord::new(&self.port, line, self.separator.as_deref());
        if let Err(err) = write_line(&mut self.out, &record, self.format) {
            if err.kind() == io::ErrorKind::BrokenPipe {
                tracing::info!("output closed, stopping");
            } else {
                tracing::error!(error = %err, "output write failed, stopping");
            }
            self.output_error = Some(err);
            self.stop.store(true, Ordering::SeqCst);
            return;
        }
        if let Some(script) = &self.exec {
            spawn_receiver(script, &record);
        }

        self.printed = self.printed.saturating_add(1);
        if let Some(count) = self.count {
            if self.printed >= count {
                self.stop.store(true, Ordering::SeqCst);
            }
        }
    }
}

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let serial = args.serial.to_config()?;
    let line = args.line.to_config()?;
    let reconnect_delay = args
        .reconnect_delay
        .as_deref()
        .map(parse_duration)
        .transpose()?;
    if let Some(script) = &args.exec {
        if !script.is_file() {
            return Err(CliError::new(
                USAGE,
                format!("--exec script not found: {}", script.display()),
            ));
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(stop.clone())?;

    let port = args.serial.port_name();
    let handler = Arc::new(Mutex::new(LineHandler {
        port: port.clone(),
        out: Box::new(io::stdout()),
        format,
        separator: args.fields.clone(),
        keep_nul: args.keep_nul,
        exec: args.exec.clone(),
        count: args.count,
        printed: 0,
        output_error: None,
        stop: stop.clone(),
    }));

    tracing::debug!(timeout_ms = serial.timeout.as_millis() as u64, "read timeout");
    monitor_loop(
        &port,
        || SerialStream::open(&args.serial.port, &serial),
        &line,
        reconnect_delay,
        &handler,
        &stop,
    )
}

/// Open, frame and pump until stopped. With a reconnect delay, open
/// failures, stream errors and end of stream lead to a new `open`.
fn monitor_loop<R, O>(
    port: &str,
    mut open: O,
    line: &LineConfig,
    reconnect_delay: Option<Duration>,
    handler: &Arc<Mutex<LineHandler>>,
    stop: &AtomicBool,
) -> CliResult<i32>
where
    R: Read,
    O: FnMut() -> serline_transport::Result<R>,
{
    loop {
        let mut source = match open() {
            Ok(source) => source,
            Err(err) => match reconnect_delay {
                Some(delay) => {
                    tracing::warn!(port = %port, error = %err, "open failed, retrying");
                    if !sleep_unless_stopped(delay, stop) {
                        return output_status(handler);
                    }
                    continue;
                }
                None => return Err(transport_error("open failed", err)),
            },
        };
        tracing::info!(port = %port, "monitoring");

        let exit = monitor_session(port, &mut source, line, handler, stop);
        drop(source);

        match (exit, reconnect_delay) {
            (PumpExit::Stopped | PumpExit::Closed, _) => return output_status(handler),
            (PumpExit::EndOfStream | PumpExit::Failed(_), Some(delay)) => {
                tracing::info!(port = %port, delay_ms = delay.as_millis() as u64, "reconnecting");
                if !sleep_unless_stopped(delay, stop) {
                    return output_status(handler);
                }
            }
            (PumpExit::EndOfStream, None) => {
                tracing::info!(port = %port, "port closed");
                return output_status(handler);
            }
            (PumpExit::Failed(err), None) => {
                return Err(CliError::new(
                    TRANSPORT_ERROR,
                    format!("read failed on {port}: {err}"),
                ))
            }
        }
    }
}

/// Frame one open source until it ends, stops, or fails.
fn monitor_session<R: Read + ?Sized>(
    port: &str,
    source: &mut R,
    line: &LineConfig,
    handler: &Arc<Mutex<LineHandler>>,
    stop: &AtomicBool,
) -> PumpExit {
    let mut framer = LineFramer::with_config(line);
    let observer = Arc::clone(handler);
    framer.on_line(move |line| {
        let mut handler = observer.lock().unwrap_or_else(|p| p.into_inner());
        handler.handle(line);
    });
    let port = port.to_string();
    framer.on_error(move |err| {
        tracing::error!(port = %port, error = %err, "serial stream error");
    });

    pump(source, &mut framer, stop)
}

/// A closed stdout ends the monitor quietly; any other write failure is an error.
fn output_status(handler: &Mutex<LineHandler>) -> CliResult<i32> {
    let mut handler = handler.lock().unwrap_or_else(|p| p.into_inner());
    match handler.output_error.take() {
        None => Ok(SUCCESS),
        Some(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(SUCCESS),
        Some(err) => Err(CliError::new(
            FAILURE,
            format!("write to stdout failed: {err}"),
        )),
    }
}

fn spawn_receiver(script: &Path, record: &LineRecord) {
    let argument = record.exec_argument();
    match Process::new(script).arg(&argument).spawn() {
        Ok(mut child) => {
            let script = script.display().to_string();
            std::thread::spawn(move || match child.wait() {
                Ok(status) if !status.success() => {
                    tracing::warn!(script = %script, %status, "receiver exited with failure");
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(script = %script, error = %err, "receiver wait failed"),
            });
        }
        Err(err) => {
            tracing::error!(script = %script.display(), error = %err, "receiver spawn failed");
        }
    }
}

/// Sleep for `delay`, waking early when `stop` is raised. Returns false if stopped.
fn sleep_unless_stopped(delay: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + delay;
    while Instant::now() < deadline {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        std::thread::sleep(left.min(SLEEP_SLICE));
    }
    !stop.load(Ordering::SeqCst)
}

fn install_ctrlc_handler(stop: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::Cursor;

    use serline_transport::TransportError;

    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn json_lines(&self) -> Vec<serde_json::Value> {
            let data = self.0.lock().unwrap().clone();
            String::from_utf8(data)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FailingWriter(io::ErrorKind);

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(self.0))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(self.0))
        }
    }

    struct BrokenSource;

    impl Read for BrokenSource {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"))
        }
    }

    fn handler_with(out: Box<dyn Write + Send>, count: Option<u64>, keep_nul: bool) -> LineHandler {
        LineHandler {
            port: "/dev/null".to_string(),
            out,
            format: OutputFormat::Json,
            separator: Some(";".to_string()),
            keep_nul,
            exec: None,
            count,
            printed: 0,
            output_error: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    fn handler(count: Option<u64>, keep_nul: bool) -> LineHandler {
        handler_with(Box::new(SharedBuf::default()), count, keep_nul)
    }

    #[test]
    fn count_raises_stop_and_ignores_extra_lines() {
        let mut h = handler(Some(2), false);
        h.handle(b"a");
        assert!(!h.stop.load(Ordering::SeqCst));
        h.handle(b"b");
        assert!(h.stop.load(Ordering::SeqCst));
        h.handle(b"c");
        assert_eq!(h.printed, 2);
    }

    #[test]
    fn nul_led_lines_are_skipped_unless_kept() {
        let mut skip = handler(None, false);
        skip.handle(b"\0noise");
        assert_eq!(skip.printed, 0);

        let mut keep = handler(None, true);
        keep.handle(b"\0noise");
        assert_eq!(keep.printed, 1);
    }

    #[test]
    fn closed_output_raises_stop_and_exits_cleanly() {
        let mut h = handler_with(Box::new(FailingWriter(io::ErrorKind::BrokenPipe)), None, false);
        h.handle(b"1;2");
        h.handle(b"3;4");

        assert!(h.stop.load(Ordering::SeqCst));
        assert_eq!(h.printed, 0);
        assert_eq!(output_status(&Mutex::new(h)).unwrap(), SUCCESS);
    }

    #[test]
    fn other_output_errors_fail_the_monitor() {
        let mut h = handler_with(Box::new(FailingWriter(io::ErrorKind::Other)), None, false);
        h.handle(b"x");

        assert!(h.stop.load(Ordering::SeqCst));
        assert_eq!(output_status(&Mutex::new(h)).unwrap_err().code, FAILURE);
    }

    #[test]
    fn session_prints_split_fields() {
        let buf = SharedBuf::default();
        let handler = Arc::new(Mutex::new(handler_with(Box::new(buf.clone()), None, false)));
        let mut source = Cursor::new(b"\0boot\r\n 21.5 ; 40 \r\nok;1\r\ntail".to_vec());

        let exit = monitor_session(
            "/dev/null",
            &mut source,
            &LineConfig::default(),
            &handler,
            &AtomicBool::new(false),
        );

        assert_eq!(exit, PumpExit::EndOfStream);
        let records = buf.json_lines();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["fields"], serde_json::json!(["21.5", "40"]));
        assert_eq!(records[1]["fields"], serde_json::json!(["ok", "1"]));
    }

    #[test]
    fn reconnects_after_stream_error_and_end_of_stream() {
        let buf = SharedBuf::default();
        let mut h = handler_with(Box::new(buf.clone()), Some(2), false);
        let stop = Arc::new(AtomicBool::new(false));
        h.stop = stop.clone();
        let handler = Arc::new(Mutex::new(h));

        let mut sources: VecDeque<Box<dyn Read + Send>> = VecDeque::new();
        sources.push_back(Box::new(BrokenSource));
        sources.push_back(Box::new(Cursor::new(b"1;2\r\n".to_vec())));
        sources.push_back(Box::new(Cursor::new(b"3;4\r\n5;6\r\n".to_vec())));
        let mut opens = 0usize;

        let code = monitor_loop(
            "/dev/null",
            || {
                opens += 1;
                sources
                    .pop_front()
                    .ok_or_else(|| TransportError::Configure("no more sources".to_string()))
            },
            &LineConfig::default(),
            Some(Duration::from_millis(10)),
            &handler,
            &stop,
        )
        .unwrap();

        assert_eq!(code, SUCCESS);
        assert_eq!(opens, 3);
        let records = buf.json_lines();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["fields"], serde_json::json!(["1", "2"]));
        assert_eq!(records[1]["fields"], serde_json::json!(["3", "4"]));
    }

    #[test]
    fn stream_error_without_reconnect_is_transport_error() {
        let stop = AtomicBool::new(false);
        let handler = Arc::new(Mutex::new(handler(None, false)));

        let err = monitor_loop(
            "/dev/null",
            || Ok(BrokenSource),
            &LineConfig::default(),
            None,
            &handler,
            &stop,
        )
        .unwrap_err();

        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.contains("device unplugged"));
    }

    #[test]
    fn end_of_stream_without_reconnect_exits_cleanly() {
        let stop = AtomicBool::new(false);
        let handler = Arc::new(Mutex::new(handler(None, false)));

        let code = monitor_loop(
            "/dev/null",
            || Ok(Cursor::new(b"a\r\n".to_vec())),
            &LineConfig::default(),
            None,
            &handler,
            &stop,
        )
        .unwrap();

        assert_eq!(code, SUCCESS);
        assert_eq!(handler.lock().unwrap().printed, 1);
    }

    #[test]
    #[cfg(unix)]
    fn exec_script_receives_timestamped_fields() {
        use std::os::unix::fs::PermissionsExt;

        let dir = std::env::temp_dir().join(format!(
            "serline-exec-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let script = dir.join("recv.sh");
        let received = dir.join("received.txt");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$1\" >> '{}'\n", received.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut h = handler(None, false);
        h.exec = Some(script);
        h.handle(b" 7 ; 8 ");

        let deadline = Instant::now() + Duration::from_secs(5);
        let contents = loop {
            let contents = std::fs::read_to_string(&received).unwrap_or_default();
            if !contents.is_empty() || Instant::now() >= deadline {
                break contents;
            }
            std::thread::sleep(Duration::from_millis(20));
        };
        let _ = std::fs::remove_dir_all(&dir);

        let (timestamp, rest) = contents.trim_end().split_once(';').unwrap();
        assert!(timestamp.parse::<f64>().is_ok());
        assert_eq!(rest, "7;8");
    }

    #[test]
    fn sleep_returns_early_when_stopped() {
        let stop = AtomicBool::new(true);
        let started = Instant::now();
        assert!(!sleep_unless_stopped(Duration::from_secs(30), &stop));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn sleep_completes_when_running() {
        let stop = AtomicBool::new(false);
        assert!(sleep_unless_stopped(Duration::from_millis(20), &stop));
    }
}
