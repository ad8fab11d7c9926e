use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ed247_frame::Clock;
use ed247_transport::{DatagramTransport, SystemClock, UdpEndpoint, MAX_UDP_PAYLOAD};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::channel::{Channel, DecodeReport};
use crate::config::{ComponentConfig, TransportConfig};
use crate::error::{ChannelError, Result};
use crate::stream::Stream;

/// Time sources used by every channel of a component.
///
/// `transport` stamps outgoing frame headers, `receive` stamps decoded
/// samples. A missing clock leaves the field zero (header) or unset
/// (receive timestamp).
#[derive(Debug, Clone, Default)]
pub struct ComponentClocks {
    pub transport: Option<Arc<dyn Clock>>,
    pub receive: Option<Arc<dyn Clock>>,
}

impl ComponentClocks {
    /// Wall clock for both roles.
    pub fn system() -> Self {
        Self::shared(Arc::new(SystemClock))
    }

    /// One clock for both roles.
    pub fn shared(clock: Arc<dyn Clock>) -> Self {
        Self {
            transport: Some(clock.clone()),
            receive: Some(clock),
        }
    }
}

/// Read-only runtime counters of a component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeMetrics {
    /// Sequence-number gaps summed over producers and channels.
    pub missed_frames: u64,
    /// Data-timestamp offsets clamped to 32 bits.
    pub data_timestamp_overflows: u64,
    /// Received frames discarded as invalid.
    pub decode_failures: u64,
    /// Samples dropped by queue eviction.
    pub evicted_samples: u64,
}

/// The local endpoint: a set of channels sharing one producer id.
pub struct Component {
    name: String,
    id: u16,
    channels: Vec<Channel>,
    transports: Vec<Option<Box<dyn DatagramTransport>>>,
    transport_configs: Vec<Option<TransportConfig>>,
    recv_buf: Vec<u8>,
}

impl Component {
    /// Validate `config` and build every channel and stream.
    pub fn new(config: ComponentConfig, clocks: ComponentClocks) -> Result<Self> {
        config.validate()?;

        let mut channels = Vec::with_capacity(config.channels.len());
        let mut transport_configs = Vec::with_capacity(config.channels.len());
        for mut channel in config.channels {
            transport_configs.push(channel.transport.take());
            channels.push(Channel::new(channel, config.component_id, &clocks)?);
        }
        info!(
            component = %config.name,
            id = config.component_id,
            channels = channels.len(),
            "component loaded"
        );

        Ok(Self {
            name: config.name,
            id: config.component_id,
            transports: channels.iter().map(|_| None).collect(),
            transport_configs,
            channels,
            recv_buf: vec![0u8; MAX_UDP_PAYLOAD],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Producer id written in outgoing headers.
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|channel| channel.name() == name)
    }

    pub fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|channel| channel.name() == name)
    }

    /// Find a stream by name in any channel.
    pub fn stream(&self, name: &str) -> Option<&Stream> {
        self.channels.iter().find_map(|channel| channel.stream(name))
    }

    pub fn stream_mut(&mut self, name: &str) -> Option<&mut Stream> {
        self.channels
            .iter_mut()
            .find_map(|channel| channel.stream_mut(name))
    }

    /// Bind the transport that carries `channel`, replacing any previous one.
    pub fn attach_transport(
        &mut self,
        channel: &str,
        transport: Box<dyn DatagramTransport>,
    ) -> Result<()> {
        let index = self.channel_index(channel)?;
        debug!(channel, transport = transport.transport_name(), "transport attached");
        self.transports[index] = Some(transport);
        Ok(())
    }

    /// Open a UDP endpoint for every channel that describes one.
    ///
    /// Returns the number of endpoints opened.
    pub fn bind_udp_transports(&mut self) -> Result<usize> {
        let mut opened = 0;
        for (index, config) in self.transport_configs.iter().enumerate() {
            if let Some(config) = config {
                let endpoint = UdpEndpoint::with_config(config.endpoint_config())?;
                self.transports[index] = Some(Box::new(endpoint));
                opened += 1;
            }
        }
        Ok(opened)
    }

    /// Encode every channel with pending samples.
    pub fn encode_all(&mut self) -> Result<Vec<(String, Bytes)>> {
        let mut frames = Vec::new();
        for channel in &mut self.channels {
            if let Some(frame) = channel.encode()? {
                frames.push((channel.name().to_string(), frame));
            }
        }
        Ok(frames)
    }

    /// Encode and send every channel with pending samples.
    ///
    /// Fails before anything is sent if a channel with pending samples has
    /// no transport. Returns the number of frames sent.
    pub fn send_pushed_samples(&mut self) -> Result<usize> {
        if let Some(channel) = self
            .channels
            .iter()
            .zip(&self.transports)
            .find(|(channel, transport)| channel.has_pending() && transport.is_none())
            .map(|(channel, _)| channel)
        {
            return Err(ChannelError::NoTransport(channel.name().to_string()));
        }

        let mut sent = 0;
        for (channel, transport) in self.channels.iter_mut().zip(&mut self.transports) {
            let (Some(transport), Some(frame)) = (transport.as_mut(), channel.encode()?) else {
                continue;
            };
            transport.send_datagram(&frame)?;
            sent += 1;
        }
        Ok(sent)
    }

    /// Decode a datagram received outside the component's transports.
    pub fn decode(&mut self, channel: &str, datagram: &[u8]) -> Result<DecodeReport> {
        let index = self.channel_index(channel)?;
        self.channels[index].decode(datagram)
    }

    /// Wait for one datagram on `channel` and decode it.
    ///
    /// `None` waits without limit. An elapsed timeout is reported as an
    /// error for which [`ChannelError::is_timeout`] holds.
    pub fn wait_frame(
        &mut self,
        channel: &str,
        timeout: Option<Duration>,
    ) -> Result<DecodeReport> {
        let index = self.channel_index(channel)?;
        let transport = self.transports[index]
            .as_mut()
            .ok_or_else(|| ChannelError::NoTransport(channel.to_string()))?;
        let len = transport.recv_datagram(&mut self.recv_buf, timeout)?;
        self.channels[index].decode(&self.recv_buf[..len])
    }

    /// Snapshot of the runtime counters.
    pub fn metrics(&self) -> RuntimeMetrics {
        self.channels
            .iter()
            .fold(RuntimeMetrics::default(), |mut metrics, channel| {
                let stats = channel.stats();
                metrics.missed_frames += channel.missed_frames();
                metrics.data_timestamp_overflows += stats.data_timestamp_overflows;
                metrics.decode_failures += stats.decode_failures;
                metrics.evicted_samples += channel.evicted_samples();
                metrics
            })
    }

    fn channel_index(&self, name: &str) -> Result<usize> {
        self.channels
            .iter()
            .position(|channel| channel.name() == name)
            .ok_or_else(|| ChannelError::UnknownChannel(name.to_string()))
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("channels", &self.channels)
            .field(
                "transports",
                &self
                    .transports
                    .iter()
                    .map(|t| t.as_ref().map(|t| t.transport_name()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use ed247_frame::{HeaderMode, StreamProtocol, Timestamp};
    use ed247_transport::{LoopbackTransport, ManualClock};

    use super::*;
    use crate::config::{ChannelConfig, Direction, StreamConfig};

    fn config(name: &str, id: u16, direction: Direction) -> ComponentConfig {
        ComponentConfig {
            name: name.to_string(),
            component_id: id,
            channels: vec![ChannelConfig::new(
                "bus",
                vec![StreamConfig::new(
                    "msg",
                    1,
                    StreamProtocol::A664 {
                        message_size_prefix: true,
                    },
                    direction,
                    64,
                )
                .with_sample_max_number(4)],
            )
            .with_header(HeaderMode::EnabledWithTimestamp)],
        }
    }

    fn linked() -> (Component, Component) {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Timestamp::new(100, 0)));
        let mut sender =
            Component::new(config("tx", 1, Direction::Out), ComponentClocks::shared(clock.clone()))
                .unwrap();
        let mut receiver =
            Component::new(config("rx", 2, Direction::In), ComponentClocks::shared(clock))
                .unwrap();
        let (a, b) = LoopbackTransport::pair();
        sender.attach_transport("bus", Box::new(a)).unwrap();
        receiver.attach_transport("bus", Box::new(b)).unwrap();
        (sender, receiver)
    }

    #[test]
    fn sends_and_waits_over_a_transport() {
        let (mut sender, mut receiver) = linked();
        sender
            .stream_mut("msg")
            .unwrap()
            .push(&b"hello"[..], None)
            .unwrap();
        assert_eq!(sender.send_pushed_samples().unwrap(), 1);
        assert_eq!(sender.send_pushed_samples().unwrap(), 0);

        let report = receiver
            .wait_frame("bus", Some(Duration::from_millis(500)))
            .unwrap();
        assert_eq!(report.header.unwrap().producer_id, 1);

        let popped = receiver.stream_mut("msg").unwrap().pop().unwrap().unwrap();
        assert_eq!(popped.sample.data(), b"hello");
        assert_eq!(
            popped.sample.info().receive_timestamp,
            Some(Timestamp::new(100, 0))
        );
    }

    #[test]
    fn wait_times_out_when_idle() {
        let (_sender, mut receiver) = linked();
        let err = receiver
            .wait_frame("bus", Some(Duration::from_millis(20)))
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn send_without_transport_fails_first() {
        let mut sender =
            Component::new(config("tx", 1, Direction::Out), ComponentClocks::default()).unwrap();
        sender.stream_mut("msg").unwrap().push(vec![1], None).unwrap();
        assert!(matches!(
            sender.send_pushed_samples(),
            Err(ChannelError::NoTransport(_))
        ));
        assert_eq!(sender.stream("msg").unwrap().outgoing_len(), 1);
    }

    #[test]
    fn unknown_channel_is_reported() {
        let mut component =
            Component::new(config("c", 1, Direction::In), ComponentClocks::default()).unwrap();
        assert!(matches!(
            component.decode("nope", &[]),
            Err(ChannelError::UnknownChannel(_))
        ));
    }

    #[test]
    fn metrics_sum_over_channels() {
        let mut sender =
            Component::new(config("tx", 1, Direction::Out), ComponentClocks::default()).unwrap();
        let mut receiver =
            Component::new(config("rx", 2, Direction::In), ComponentClocks::default()).unwrap();

        let mut frames = Vec::new();
        for i in 0..3u8 {
            sender.stream_mut("msg").unwrap().push(vec![i], None).unwrap();
            frames.extend(sender.encode_all().unwrap());
        }
        receiver.decode("bus", &frames[0].1).unwrap();
        receiver.decode("bus", &frames[2].1).unwrap();
        assert!(receiver.decode("bus", &[0, 1]).is_err());

        let metrics = receiver.metrics();
        assert_eq!(metrics.missed_frames, 1);
        assert_eq!(metrics.decode_failures, 1);

        let json = serde_json::to_value(metrics).unwrap();
        assert_eq!(json["missed_frames"], 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut bad = config("c", 1, Direction::In);
        bad.channels.push(bad.channels[0].clone());
        assert!(matches!(
            Component::new(bad, ComponentClocks::default()),
            Err(ChannelError::Config(_))
        ));
    }
}
