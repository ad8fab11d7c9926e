use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ed247::ComponentConfig;
use serde::Serialize;

/// Longest payload shown in table and pretty output, in bytes.
const PREVIEW_BYTES: usize = 32;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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

#[derive(Debug, Serialize)]
pub struct SignalRecord {
    pub name: String,
    pub value: String,
}

/// One received sample, ready for printing.
#[derive(Debug, Serialize)]
pub struct SampleRecord {
    pub channel: String,
    pub stream: String,
    pub uid: u16,
    pub size: usize,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer_id: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<SignalRecord>,
}

#[derive(Serialize)]
struct StreamRow<'a> {
    channel: &'a str,
    stream: &'a str,
    uid: u16,
    protocol: &'static str,
    direction: &'static str,
    sample_max_size: usize,
    sample_max_number: usize,
    signals: usize,
}

#[derive(Serialize)]
struct ConfigSummary<'a> {
    component: &'a str,
    component_id: u16,
    channels: usize,
    streams: Vec<StreamRow<'a>>,
}

pub fn print_config(config: &ComponentConfig, format: OutputFormat) {
    let streams: Vec<StreamRow<'_>> = config
        .channels
        .iter()
        .flat_map(|channel| {
            channel.streams.iter().map(move |stream| StreamRow {
                channel: &channel.name,
                stream: &stream.name,
                uid: stream.uid,
                protocol: stream.protocol.name(),
                direction: stream.direction.as_str(),
                sample_max_size: stream.sample_max_size(),
                sample_max_number: stream.sample_max_number,
                signals: stream.signals.len(),
            })
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let out = ConfigSummary {
                component: &config.name,
                component_id: config.component_id,
                channels: config.channels.len(),
                streams,
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "CHANNEL", "STREAM", "UID", "PROTOCOL", "DIR", "SIZE", "DEPTH", "SIGNALS",
                ]);
            for row in &streams {
                table.add_row(vec![
                    row.channel.to_string(),
                    row.stream.to_string(),
                    row.uid.to_string(),
                    row.protocol.to_string(),
                    row.direction.to_string(),
                    row.sample_max_size.to_string(),
                    row.sample_max_number.to_string(),
                    row.signals.to_string(),
                ]);
            }
            println!("component {} (id {})", config.name, config.component_id);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("component {} (id {})", config.name, config.component_id);
            for row in &streams {
                println!(
                    "  {}/{} uid={} {} {} size={} depth={} signals={}",
                    row.channel,
                    row.stream,
                    row.uid,
                    row.protocol,
                    row.direction,
                    row.sample_max_size,
                    row.sample_max_number,
                    row.signals
                );
            }
        }
    }
}

pub fn print_samples(samples: &[SampleRecord], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for sample in samples {
                print_json(sample);
            }
        }
        OutputFormat::Table => {
            if samples.is_empty() {
                return;
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "STREAM", "UID", "SIZE", "PRODUCER", "SEQ", "DATA TS", "DATA",
                ]);
            for sample in samples {
                table.add_row(vec![
                    sample.stream.clone(),
                    sample.uid.to_string(),
                    sample.size.to_string(),
                    optional(sample.producer_id),
                    optional(sample.sequence_number),
                    sample.data_timestamp.clone().unwrap_or_else(|| "-".to_string()),
                    preview(&sample.data),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for sample in samples {
                println!(
                    "{}/{} uid={} size={} producer={} seq={} data={}",
                    sample.channel,
                    sample.stream,
                    sample.uid,
                    sample.size,
                    optional(sample.producer_id),
                    optional(sample.sequence_number),
                    preview(&sample.data)
                );
                for signal in &sample.signals {
                    println!("    {} = {}", signal.name, signal.value);
                }
            }
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn preview(hex: &str) -> String {
    if hex.len() > PREVIEW_BYTES * 2 {
        format!("{}...", &hex[..PREVIEW_BYTES * 2])
    } else {
        hex.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_payloads() {
        let long = "ab".repeat(40);
        let shown = preview(&long);
        assert_eq!(shown.len(), PREVIEW_BYTES * 2 + 3);
        assert!(shown.ends_with("..."));
        assert_eq!(preview("0102"), "0102");
    }

    #[test]
    fn sample_record_omits_missing_metadata() {
        let record = SampleRecord {
            channel: "bus".into(),
            stream: "s".into(),
            uid: 1,
            size: 2,
            data: "0102".into(),
            producer_id: None,
            sequence_number: None,
            data_timestamp: None,
            receive_timestamp: None,
            signals: Vec::new(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("producer_id"));
        assert!(!json.contains("signals"));
    }
}
