use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use ed247_frame::{
    DataTimestampMode, HeaderMode, SampleFraming, StreamProtocol, BLOCK_HEADER_SIZE,
    DEFAULT_PRODUCER_CAPACITY, MAX_BLOCK_PAYLOAD,
};
use ed247_signal::{SignalConfig, StreamAssistant};
use ed247_transport::{UdpEndpointConfig, MAX_UDP_PAYLOAD};
use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, Result};

/// Which way samples of a stream flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    Out,
    #[serde(alias = "IN_OUT")]
    InOut,
}

impl Direction {
    /// Whether received samples are queued for this stream.
    pub fn is_input(self) -> bool {
        matches!(self, Direction::In | Direction::InOut)
    }

    /// Whether the application may push samples to this stream.
    pub fn is_output(self) -> bool {
        matches!(self, Direction::Out | Direction::InOut)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
            Direction::InOut => "INOUT",
        }
    }
}

/// Static description of one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub name: String,
    /// Identifier carried in every block of this stream.
    pub uid: u16,
    pub protocol: StreamProtocol,
    pub direction: Direction,
    /// Capacity of one sample. Ignored by VNAD streams that declare signals.
    #[serde(default)]
    pub sample_max_size_bytes: usize,
    /// Depth of the outgoing and incoming queues.
    #[serde(default = "default_sample_max_number")]
    pub sample_max_number: usize,
    #[serde(default)]
    pub data_timestamp: DataTimestampMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<SignalConfig>,
}

fn default_sample_max_number() -> usize {
    1
}

impl StreamConfig {
    /// A stream without signals.
    pub fn new(
        name: impl Into<String>,
        uid: u16,
        protocol: StreamProtocol,
        direction: Direction,
        sample_max_size_bytes: usize,
    ) -> Self {
        Self {
            name: name.into(),
            uid,
            protocol,
            direction,
            sample_max_size_bytes,
            sample_max_number: default_sample_max_number(),
            data_timestamp: DataTimestampMode::default(),
            signals: Vec::new(),
        }
    }

    pub fn with_sample_max_number(mut self, sample_max_number: usize) -> Self {
        self.sample_max_number = sample_max_number;
        self
    }

    pub fn with_data_timestamp(mut self, mode: DataTimestampMode) -> Self {
        self.data_timestamp = mode;
        self
    }

    pub fn with_signals(mut self, signals: Vec<SignalConfig>) -> Self {
        self.signals = signals;
        self
    }

    /// Effective sample capacity; derived from the signals for VNAD streams.
    pub fn sample_max_size(&self) -> usize {
        if self.protocol.is_vnad() && !self.signals.is_empty() {
            StreamAssistant::vnad_sample_max_size(&self.signals)
        } else {
            self.sample_max_size_bytes
        }
    }
}

/// UDP endpoint of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    pub bind: SocketAddr,
    #[serde(default)]
    pub destination: Option<SocketAddr>,
    #[serde(default)]
    pub multicast_group: Option<Ipv4Addr>,
    #[serde(default = "default_multicast_interface")]
    pub multicast_interface: Ipv4Addr,
    #[serde(default = "default_multicast_ttl")]
    pub multicast_ttl: u32,
    #[serde(default = "default_multicast_loop")]
    pub multicast_loop: bool,
}

fn default_multicast_interface() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_multicast_ttl() -> u32 {
    1
}

fn default_multicast_loop() -> bool {
    true
}

impl TransportConfig {
    pub fn endpoint_config(&self) -> UdpEndpointConfig {
        UdpEndpointConfig {
            local: self.bind,
            destination: self.destination,
            multicast_group: self.multicast_group,
            multicast_interface: self.multicast_interface,
            multicast_ttl: self.multicast_ttl,
            multicast_loop: self.multicast_loop,
        }
    }
}

/// Static description of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default)]
    pub header: HeaderMode,
    /// Number of distinct remote producers the channel can track.
    #[serde(default = "default_producer_capacity")]
    pub producer_capacity: usize,
    /// Largest frame the channel will emit.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportConfig>,
    /// Streams in block emission order.
    pub streams: Vec<StreamConfig>,
}

fn default_producer_capacity() -> usize {
    DEFAULT_PRODUCER_CAPACITY
}

fn default_max_frame_size() -> usize {
    MAX_UDP_PAYLOAD
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>, streams: Vec<StreamConfig>) -> Self {
        Self {
            name: name.into(),
            header: HeaderMode::default(),
            producer_capacity: default_producer_capacity(),
            max_frame_size: default_max_frame_size(),
            transport: None,
            streams,
        }
    }

    pub fn with_header(mut self, header: HeaderMode) -> Self {
        self.header = header;
        self
    }
}

/// Static description of the local component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub name: String,
    /// Producer id written in frame headers.
    pub component_id: u16,
    pub channels: Vec<ChannelConfig>,
}

impl ComponentConfig {
    /// Parse and validate a JSON component description.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON component description.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Structural checks the engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(config_error("component name is empty"));
        }

        let mut channel_names = HashSet::new();
        let mut stream_names = HashSet::new();
        for channel in &self.channels {
            if channel.name.is_empty() {
                return Err(config_error("channel name is empty"));
            }
            if !channel_names.insert(channel.name.as_str()) {
                return Err(config_error(format!(
                    "duplicate channel '{}'",
                    channel.name
                )));
            }
            validate_channel(channel)?;

            for stream in &channel.streams {
                if !stream_names.insert(stream.name.as_str()) {
                    return Err(config_error(format!("duplicate stream '{}'", stream.name)));
                }
            }
        }
        Ok(())
    }
}

fn validate_channel(channel: &ChannelConfig) -> Result<()> {
    if channel.producer_capacity == 0 {
        return Err(config_error(format!(
            "channel '{}': producer_capacity must be at least 1",
            channel.name
        )));
    }
    let smallest_frame = channel.header.wire_size() + BLOCK_HEADER_SIZE;
    if channel.max_frame_size < smallest_frame {
        return Err(config_error(format!(
            "channel '{}': max_frame_size {} cannot hold a single block",
            channel.name, channel.max_frame_size
        )));
    }

    let mut uids = HashSet::new();
    for stream in &channel.streams {
        if !uids.insert(stream.uid) {
            return Err(config_error(format!(
                "channel '{}': duplicate stream uid {}",
                channel.name, stream.uid
            )));
        }
        validate_stream(stream)?;
    }
    Ok(())
}

fn validate_stream(stream: &StreamConfig) -> Result<()> {
    if stream.name.is_empty() {
        return Err(config_error("stream name is empty"));
    }
    if stream.sample_max_number == 0 {
        return Err(config_error(format!(
            "stream '{}': sample_max_number must be at least 1",
            stream.name
        )));
    }

    let size = stream.sample_max_size();
    if size == 0 && !stream.protocol.is_vnad() {
        return Err(config_error(format!(
            "stream '{}': sample_max_size_bytes must be at least 1",
            stream.name
        )));
    }
    let limit = match stream.protocol.framing(size) {
        SampleFraming::Fixed(_) => MAX_BLOCK_PAYLOAD,
        prefixed => prefixed.length_limit(),
    };
    if size > limit {
        return Err(config_error(format!(
            "stream '{}': {} samples are limited to {limit} bytes, got {size}",
            stream.name,
            stream.protocol.name()
        )));
    }

    if !stream.signals.is_empty() {
        if !stream.protocol.is_signal_based() {
            return Err(config_error(format!(
                "stream '{}': {} streams cannot declare signals",
                stream.name,
                stream.protocol.name()
            )));
        }
        StreamAssistant::new(
            &stream.name,
            stream.protocol,
            stream.sample_max_size_bytes,
            stream.signals.clone(),
        )?;
    }
    Ok(())
}

fn config_error(reason: impl Into<String>) -> ChannelError {
    ChannelError::Config(reason.into())
}
