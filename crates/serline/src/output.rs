use std::io::{self, IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serline_transport::PortInfo;

const LINE_SCHEMA_ID: &str = "https://schemas.3leaps.dev/serline/cli/v1/line-received.schema.json";
const PORTS_SCHEMA_ID: &str = "https://schemas.3leaps.dev/serline/cli/v1/port-list.schema.json";

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// One received line, timestamped on arrival.
#[derive(Debug, Clone)]
pub struct LineRecord {
    pub port: String,
    pub timestamp: String,
    pub payload: Vec<u8>,
    pub fields: Option<Vec<String>>,
    separator: Option<String>,
}

impl LineRecord {
    /// Build a record; with `separator`, the line is split and each field trimmed.
    pub fn new(port: &str, payload: &[u8], separator: Option<&str>) -> Self {
        let fields = separator.map(|sep| {
            String::from_utf8_lossy(payload)
                .split(sep)
                .map(|field| field.trim().to_string())
                .collect()
        });
        Self {
            port: port.to_string(),
            timestamp: now_unix_seconds(),
            payload: payload.to_vec(),
            fields,
            separator: separator.map(str::to_string),
        }
    }

    /// `<timestamp><sep><fields...>`, the argument handed to `--exec` scripts.
    pub fn exec_argument(&self) -> String {
        match (&self.fields, &self.separator) {
            (Some(fields), Some(sep)) => {
                let mut out = self.timestamp.clone();
                for field in fields {
                    out.push_str(sep);
                    out.push_str(field);
                }
                out
            }
            _ => format!(
                "{};{}",
                self.timestamp,
                String::from_utf8_lossy(&self.payload)
            ),
        }
    }
}

#[derive(Serialize)]
struct LineOutput<'a> {
    schema_id: &'a str,
    port: &'a str,
    timestamp: &'a str,
    size: usize,
    line: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a [String]>,
}

/// Print one record to stdout. Errors (a closed pipe included) are returned.
pub fn print_line(record: &LineRecord, format: OutputFormat) -> io::Result<()> {
    write_line(&mut io::stdout().lock(), record, format)
}

pub fn write_line<W: Write + ?Sized>(
    out: &mut W,
    record: &LineRecord,
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Json => writeln!(out, "{}", line_json(record))?,
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TIME", "PORT", "SIZE", "LINE"])
                .add_row(vec![
                    record.timestamp.clone(),
                    record.port.clone(),
                    record.payload.len().to_string(),
                    line_text(record),
                ]);
            writeln!(out, "{table}")?;
        }
        OutputFormat::Pretty => {
            writeln!(out, "{} {}", record.timestamp, line_text(record))?;
        }
        OutputFormat::Raw => {
            out.write_all(&record.payload)?;
            out.write_all(b"\n")?;
        }
    }
    out.flush()
}

pub fn line_json(record: &LineRecord) -> String {
    let out = LineOutput {
        schema_id: LINE_SCHEMA_ID,
        port: &record.port,
        timestamp: &record.timestamp,
        size: record.payload.len(),
        line: payload_preview(&record.payload),
        fields: record.fields.as_deref(),
    };
    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
}

#[derive(Serialize)]
struct PortOutput<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    vid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    manufacturer: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    product: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    serial_number: Option<&'a str>,
}

#[derive(Serialize)]
struct PortListOutput<'a> {
    schema_id: &'a str,
    ports: Vec<PortOutput<'a>>,
}

pub fn print_ports(ports: &[PortInfo], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = PortListOutput {
                schema_id: PORTS_SCHEMA_ID,
                ports: ports
                    .iter()
                    .map(|p| PortOutput {
                        name: &p.name,
                        kind: p.kind.as_str(),
                        vid: p.vid.map(|v| format!("{v:04x}")),
                        pid: p.pid.map(|v| format!("{v:04x}")),
                        manufacturer: p.manufacturer.as_deref(),
                        product: p.product.as_deref(),
                        serial_number: p.serial_number.as_deref(),
                    })
                    .collect(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PORT", "TYPE", "VID:PID", "PRODUCT"]);
            for port in ports {
                let ids = match (port.vid, port.pid) {
                    (Some(vid), Some(pid)) => format!("{vid:04x}:{pid:04x}"),
                    _ => "-".to_string(),
                };
                table.add_row(vec![
                    port.name.clone(),
                    port.kind.as_str().to_string(),
                    ids,
                    port.product.clone().unwrap_or_else(|| "-".to_string()),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Raw => {
            for port in ports {
                println!("{}", port.name);
            }
        }
    }
}


fn line_text(record: &LineRecord) -> String {
    match &record.fields {
        Some(fields) => fields.join(" | "),
        None => payload_preview(&record.payload),
    }
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| format!("{}.{:03}", d.as_secs(), d.subsec_millis()))
        .unwrap_or_else(|_| "0".to_string())
}
