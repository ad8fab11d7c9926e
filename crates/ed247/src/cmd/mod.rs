use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand};
use ed247::{Channel, ComponentConfig};
use tracing::warn;

use crate::exit::{channel_error, CliError, CliResult, USAGE};
use crate::output::{OutputFormat, SampleRecord, SignalRecord};

pub mod check;
pub mod inspect;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a component description and list its streams.
    Check(CheckArgs),
    /// Decode one datagram against a channel and print its samples.
    Inspect(InspectArgs),
    /// Receive frames over UDP and print decoded samples.
    Listen(ListenArgs),
    /// Push one sample and send the channel frame over UDP.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Check(args) => check::run(args, format),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Component description (JSON).
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Component description (JSON).
    pub config: PathBuf,
    /// Channel the datagram belongs to.
    #[arg(long)]
    pub channel: String,
    /// Datagram as hex digits.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub hex: Option<String>,
    /// Read the datagram from a file.
    #[arg(long, conflicts_with = "hex")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Component description (JSON).
    pub config: PathBuf,
    /// Channel to receive on.
    #[arg(long)]
    pub channel: String,
    /// Local address to bind. Default: the channel's configured transport.
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// IPv4 multicast group to join.
    #[arg(long)]
    pub group: Option<Ipv4Addr>,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Give up when no frame arrives for this long (e.g. 5s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Component description (JSON).
    pub config: PathBuf,
    /// Channel to send on.
    #[arg(long)]
    pub channel: String,
    /// Stream to push the sample to.
    #[arg(long)]
    pub stream: String,
    /// Sample bytes as hex digits.
    #[arg(long)]
    pub hex: String,
    /// Destination address. Default: the channel's configured destination.
    #[arg(long)]
    pub to: Option<SocketAddr>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn load_config(path: &Path) -> CliResult<ComponentConfig> {
    ComponentConfig::from_json_file(path)
        .map_err(|err| channel_error(&format!("failed loading {}", path.display()), err))
}

pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && *c != ':' && *c != '_')
        .collect();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(&digits);
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "hex input must have an even number of digits"));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            let pair = &digits[i..i + 2];
            u8::from_str_radix(pair, 16)
                .map_err(|_| CliError::new(USAGE, format!("invalid hex byte '{pair}'")))
        })
        .collect()
}

pub fn to_hex(data: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02x}");
    }
    out
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

/// Pop every received sample of `channel` into printable records.
pub fn drain_samples(channel: &mut Channel) -> CliResult<Vec<SampleRecord>> {
    let inputs: Vec<String> = channel
        .streams()
        .iter()
        .filter(|stream| stream.direction().is_input())
        .map(|stream| stream.name().to_string())
        .collect();

    let channel_name = channel.name().to_string();
    let mut records = Vec::new();
    for name in inputs {
        let Some(stream) = channel.stream_mut(&name) else {
            continue;
        };
        let mut assistant = stream.assistant().cloned();
        while let Some(popped) = stream
            .pop()
            .map_err(|err| channel_error("pop failed", err))?
        {
            let sample = popped.sample;
            let info = sample.info();
            let signals = match assistant.as_mut() {
                Some(assistant) => match assistant.decode(sample.data()) {
                    Ok(()) => assistant
                        .signals()
                        .map(|signal| SignalRecord {
                            name: signal.name.clone(),
                            value: assistant.read(&signal.name).map(to_hex).unwrap_or_default(),
                        })
                        .collect(),
                    Err(err) => {
                        warn!(stream = %name, error = %err, "signal decode failed");
                        Vec::new()
                    }
                },
                None => Vec::new(),
            };

            records.push(SampleRecord {
                channel: channel_name.clone(),
                stream: name.clone(),
                uid: stream.uid(),
                size: sample.len(),
                data: to_hex(sample.data()),
                producer_id: info.frame.map(|frame| frame.producer_id),
                sequence_number: info.frame.map(|frame| frame.sequence_number),
                data_timestamp: info.data_timestamp.map(|ts| ts.to_string()),
                receive_timestamp: info.receive_timestamp.map(|ts| ts.to_string()),
                signals,
            });
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_accepts_separators_and_prefix() {
        assert_eq!(parse_hex("0x0102ff").unwrap(), vec![0x01, 0x02, 0xFF]);
        assert_eq!(parse_hex("01 02:03_04").unwrap(), vec![1, 2, 3, 4]);
        assert!(parse_hex("").unwrap().is_empty());
    }

    #[test]
    fn parse_hex_rejects_bad_input() {
        assert_eq!(parse_hex("123").unwrap_err().code, USAGE);
        assert_eq!(parse_hex("zz").unwrap_err().code, USAGE);
    }

    #[test]
    fn to_hex_is_lowercase() {
        assert_eq!(to_hex(&[0xAB, 0x01]), "ab01");
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
    }
}
