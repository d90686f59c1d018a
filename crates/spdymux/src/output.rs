use std::collections::BTreeMap;
use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use spdymux_frame::HeaderMap;
use spdymux_session::StreamMessage;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum MessageOutput<'a> {
    Headers {
        stream_id: u32,
        headers: BTreeMap<&'a str, &'a [String]>,
        timestamp: String,
    },
    Data {
        stream_id: u32,
        payload_size: usize,
        payload: String,
        timestamp: String,
    },
}

/// Print one received stream message. A message carrying both headers and
/// data prints as two records, headers first.
pub fn print_message(stream_id: u32, msg: &StreamMessage, format: OutputFormat) {
    if let Some(headers) = &msg.headers {
        print_headers(stream_id, headers, format);
    }
    if let Some(data) = &msg.data {
        print_data(stream_id, data, format);
    }
}

fn print_headers(stream_id: u32, headers: &HeaderMap, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&MessageOutput::Headers {
            stream_id,
            headers: headers.iter().collect(),
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["STREAM", "HEADER", "VALUE"]);
            for (name, values) in headers.iter() {
                table.add_row(vec![stream_id.to_string(), name.to_string(), values.join(", ")]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let rendered: Vec<String> = headers
                .iter()
                .map(|(name, values)| format!("{name}={}", values.join(",")))
                .collect();
            println!("stream={stream_id} headers {}", rendered.join(" "));
        }
        // raw output carries the body only
        OutputFormat::Raw => {}
    }
}

fn print_data(stream_id: u32, data: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&MessageOutput::Data {
            stream_id,
            payload_size: data.len(),
            payload: payload_preview(data),
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["STREAM", "SIZE", "PAYLOAD"]);
            table.add_row(vec![
                stream_id.to_string(),
                data.len().to_string(),
                payload_preview(data),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "stream={stream_id} data size={} payload={}",
                data.len(),
                payload_preview(data)
            );
        }
        OutputFormat::Raw => print_raw(data),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json(out: &MessageOutput<'_>) {
    println!(
        "{}",
        serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
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
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
