use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

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
struct ResponseOutput<'a> {
    event: &'a str,
    size: usize,
    text: Option<&'a str>,
    hex: String,
    timestamp: String,
}

#[derive(Serialize)]
struct ListeningOutput<'a> {
    event: &'a str,
    role: &'a str,
    addr: String,
    downstream: Option<&'a str>,
    timestamp: String,
}

/// Print a reply returned by the bridge.
pub fn print_response(data: &[u8], format: OutputFormat) {
    let text = std::str::from_utf8(data).ok();
    match format {
        OutputFormat::Json => {
            let out = ResponseOutput {
                event: "response",
                size: data.len(),
                text,
                hex: hex::encode(data),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SIZE", "TEXT", "HEX"])
                .add_row(vec![
                    data.len().to_string(),
                    payload_preview(data),
                    hex::encode(data),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("size={} payload={}", data.len(), payload_preview(data));
        }
        OutputFormat::Raw => print_raw(data),
    }
}

/// Announce a bound listener. Tests parse the JSON form to find the port.
pub fn print_listening(
    role: &str,
    addr: SocketAddr,
    downstream: Option<&str>,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = ListeningOutput {
                event: "listening",
                role,
                addr: addr.to_string(),
                downstream,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ROLE", "ADDRESS", "DOWNSTREAM"])
                .add_row(vec![
                    role.to_string(),
                    addr.to_string(),
                    downstream.unwrap_or("-").to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match downstream {
            Some(downstream) => println!("{role} listening on {addr} -> {downstream}"),
            None => println!("{role} listening on {addr}"),
        },
        OutputFormat::Raw => println!("{addr}"),
    }
    let _ = std::io::stdout().flush();
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
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
