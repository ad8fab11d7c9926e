use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use ed247_frame::{
    encode_block, BlockReader, Clock, DecodedSample, FrameError, FrameHeader, FrameInfo,
    HeaderEncoder, HeaderMode, ProducerTracker, SampleInfo, BLOCK_HEADER_SIZE, MAX_BLOCK_PAYLOAD,
};
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::component::ComponentClocks;
use crate::config::ChannelConfig;
use crate::error::Result;
use crate::stream::Stream;

/// Counters kept by one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub frames_encoded: u64,
    pub frames_decoded: u64,
    pub decode_failures: u64,
    pub data_timestamp_overflows: u64,
}

/// What one call to [`Channel::decode`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeReport {
    /// Frame header, when the channel has one.
    pub header: Option<FrameHeader>,
    /// Blocks whose samples were queued.
    pub blocks: usize,
    /// Blocks for streams this side only sends on.
    pub skipped_blocks: usize,
    /// Samples queued across all streams.
    pub samples: usize,
    /// Frames this header reveals as lost from its producer.
    pub missed_frames: u16,
}

/// One transport-bound multiplexing unit: its streams plus header state.
#[derive(Debug)]
pub struct Channel {
    name: String,
    header: HeaderEncoder,
    tracker: ProducerTracker,
    max_frame_size: usize,
    streams: Vec<Stream>,
    receive_clock: Option<Arc<dyn Clock>>,
    stats: ChannelStats,
}

impl Channel {
    /// Build a channel whose frames carry `producer_id` in their header.
    pub fn new(config: ChannelConfig, producer_id: u16, clocks: &ComponentClocks) -> Result<Self> {
        let streams = config
            .streams
            .into_iter()
            .map(Stream::new)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: config.name,
            header: HeaderEncoder::new(config.header, producer_id, clocks.transport.clone()),
            tracker: ProducerTracker::new(config.producer_capacity),
            max_frame_size: config.max_frame_size,
            streams,
            receive_clock: clocks.receive.clone(),
            stats: ChannelStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header_mode(&self) -> HeaderMode {
        self.header.mode()
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Streams in declaration order.
    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    pub fn stream(&self, name: &str) -> Option<&Stream> {
        self.streams.iter().find(|stream| stream.name() == name)
    }

    pub fn stream_mut(&mut self, name: &str) -> Option<&mut Stream> {
        self.streams.iter_mut().find(|stream| stream.name() == name)
    }

    pub fn stream_by_uid(&self, uid: u16) -> Option<&Stream> {
        self.streams.iter().find(|stream| stream.uid() == uid)
    }

    /// Remote producers seen on this channel.
    pub fn producers(&self) -> &ProducerTracker {
        &self.tracker
    }

    /// Sum of missed frames over every tracked producer.
    pub fn missed_frames(&self) -> u64 {
        self.tracker.missed_frames()
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// Samples evicted from any queue of this channel.
    pub fn evicted_samples(&self) -> u64 {
        self.streams.iter().map(Stream::evicted_samples).sum()
    }

    /// Whether any stream has samples waiting to be sent.
    pub fn has_pending(&self) -> bool {
        self.streams.iter().any(Stream::has_pending)
    }

    /// Assemble one frame from every stream with pending samples, in
    /// declaration order, and drain those streams.
    ///
    /// Returns `Ok(None)` when nothing is pending; no sequence number is
    /// used then. A frame over `max_frame_size` is an error and leaves the
    /// queues untouched.
    pub fn encode(&mut self) -> Result<Option<Bytes>> {
        let mut blocks = Vec::new();
        let mut overflows = 0u64;
        for (index, stream) in self.streams.iter().enumerate() {
            if !stream.has_pending() {
                continue;
            }
            let (payload, report) = stream.encode_pending()?;
            if payload.len() > MAX_BLOCK_PAYLOAD {
                return Err(FrameError::BlockTooLarge {
                    size: payload.len(),
                    max: MAX_BLOCK_PAYLOAD,
                }
                .into());
            }
            overflows += report.offset_overflows;
            blocks.push((index, payload));
        }
        if blocks.is_empty() {
            return Ok(None);
        }

        let size = self.header.mode().wire_size()
            + blocks
                .iter()
                .map(|(_, payload)| BLOCK_HEADER_SIZE + payload.len())
                .sum::<usize>();
        if size > self.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            }
            .into());
        }

        let mut frame = BytesMut::with_capacity(size);
        let header = self.header.encode(&mut frame);
        for (index, payload) in &blocks {
            let stream = &mut self.streams[*index];
            encode_block(stream.uid(), payload, &mut frame)?;
            trace!(
                channel = %self.name,
                stream = stream.name(),
                samples = stream.outgoing_len(),
                bytes = payload.len(),
                "block encoded"
            );
            stream.clear_pending();
        }

        self.stats.frames_encoded += 1;
        self.stats.data_timestamp_overflows += overflows;
        debug!(
            channel = %self.name,
            sequence = header.map(|h| h.sequence_number),
            blocks = blocks.len(),
            bytes = frame.len(),
            "frame encoded"
        );
        Ok(Some(frame.freeze()))
    }

    /// Dispatch one received datagram into the incoming queues.
    ///
    /// The whole datagram is parsed before anything is queued: a malformed
    /// block anywhere in the frame leaves every queue and the producer table
    /// as they were.
    pub fn decode(&mut self, datagram: &[u8]) -> Result<DecodeReport> {
        match self.decode_frame(datagram) {
            Ok(report) => {
                self.stats.frames_decoded += 1;
                Ok(report)
            }
            Err(err) => {
                if err.is_decode_failure() {
                    self.stats.decode_failures += 1;
                    warn!(channel = %self.name, error = %err, "frame discarded");
                }
                Err(err)
            }
        }
    }

    fn decode_frame(&mut self, datagram: &[u8]) -> Result<DecodeReport> {
        let mut src = Bytes::copy_from_slice(datagram);
        let header = FrameHeader::decode(self.header.mode(), &mut src)?;

        let mut staged: Vec<(usize, Vec<DecodedSample>)> = Vec::new();
        let mut skipped_blocks = 0;
        for block in BlockReader::new(src) {
            let block = block?;
            let index = self
                .streams
                .iter()
                .position(|stream| stream.uid() == block.uid)
                .ok_or(FrameError::UnknownStream(block.uid))?;
            let stream = &self.streams[index];
            if !stream.direction().is_input() {
                debug!(
                    channel = %self.name,
                    stream = stream.name(),
                    "block for output-only stream skipped"
                );
                skipped_blocks += 1;
                continue;
            }
            let samples = stream.decode_payload(&block.payload)?;
            trace!(
                channel = %self.name,
                stream = stream.name(),
                samples = samples.len(),
                "block decoded"
            );
            staged.push((index, samples));
        }

        let missed_frames = match header {
            Some(header) => self
                .tracker
                .observe(header.producer_id, header.sequence_number)?,
            None => 0,
        };

        let info = SampleInfo {
            data_timestamp: None,
            receive_timestamp: self.receive_clock.as_ref().map(|clock| clock.now()),
            frame: header.map(FrameInfo::from),
        };
        let blocks = staged.len();
        let mut samples = 0;
        for (index, decoded) in staged {
            samples += decoded.len();
            self.streams[index].deliver(decoded, info)?;
        }

        debug!(
            channel = %self.name,
            producer = header.map(|h| h.producer_id),
            blocks,
            samples,
            "frame decoded"
        );
        Ok(DecodeReport {
            header,
            blocks,
            skipped_blocks,
            samples,
            missed_frames,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;
    use ed247_frame::{DataTimestampMode, StreamProtocol, Timestamp};
    use ed247_signal::{ElementSize, SignalConfig, SignalError};
    use ed247_transport::ManualClock;

    use super::*;
    use crate::config::{Direction, StreamConfig};
    use crate::error::ChannelError;

    fn a664(direction: Direction) -> StreamConfig {
        StreamConfig::new(
            "a664",
            0x10,
            StreamProtocol::A664 {
                message_size_prefix: true,
            },
            direction,
            512,
        )
        .with_sample_max_number(2)
    }

    fn a429(direction: Direction) -> StreamConfig {
        StreamConfig::new("a429", 0x20, StreamProtocol::A429, direction, 4)
            .with_sample_max_number(4)
    }

    fn pair(header: HeaderMode) -> (Channel, Channel) {
        let clocks = ComponentClocks::default();
        let tx = Channel::new(
            ChannelConfig::new("bus", vec![a664(Direction::Out), a429(Direction::Out)])
                .with_header(header),
            7,
            &clocks,
        )
        .unwrap();
        let rx = Channel::new(
            ChannelConfig::new("bus", vec![a664(Direction::In), a429(Direction::In)])
                .with_header(header),
            8,
            &clocks,
        )
        .unwrap();
        (tx, rx)
    }

    #[test]
    fn nothing_pending_means_no_frame() {
        let (mut tx, _) = pair(HeaderMode::Enabled);
        assert!(tx.encode().unwrap().is_none());
        assert_eq!(tx.header.next_sequence(), 0);
    }

    #[test]
    fn evicted_sample_never_reaches_the_peer() {
        let (mut tx, mut rx) = pair(HeaderMode::Disabled);
        let stream = tx.stream_mut("a664").unwrap();
        for size in [100usize, 200, 300] {
            stream.push(vec![size as u8; size], None).unwrap();
        }

        let frame = tx.encode().unwrap().unwrap();
        assert_eq!(tx.stream("a664").unwrap().outgoing_len(), 0);

        let report = rx.decode(&frame).unwrap();
        assert_eq!(report.samples, 2);

        let stream = rx.stream_mut("a664").unwrap();
        let first = stream.pop().unwrap().unwrap();
        assert_eq!(first.sample.len(), 200);
        assert!(!first.now_empty);
        let second = stream.pop().unwrap().unwrap();
        assert_eq!(second.sample.len(), 300);
        assert!(second.now_empty);
        assert!(stream.pop().unwrap().is_none());
    }

    #[test]
    fn blocks_follow_declaration_order() {
        let (mut tx, _) = pair(HeaderMode::Enabled);
        tx.stream_mut("a429").unwrap().push(vec![1, 2, 3, 4], None).unwrap();
        tx.stream_mut("a664").unwrap().push(vec![9], None).unwrap();

        let frame = tx.encode().unwrap().unwrap();
        assert_eq!(
            frame.as_ref(),
            &[
                0x00, 0x07, 0x00, 0x00, // producer 7, sequence 0
                0x00, 0x10, 0x00, 0x03, 0x00, 0x01, 0x09, // a664: prefixed
                0x00, 0x20, 0x00, 0x04, 0x01, 0x02, 0x03, 0x04, // a429: fixed
            ]
        );
    }

    #[test]
    fn header_metadata_reaches_samples() {
        let clock = Arc::new(ManualClock::new(Timestamp::new(50, 0)));
        let clocks = ComponentClocks {
            transport: Some(clock.clone() as Arc<dyn Clock>),
            receive: Some(clock.clone() as Arc<dyn Clock>),
        };
        let mut tx = Channel::new(
            ChannelConfig::new("bus", vec![a429(Direction::Out)])
                .with_header(HeaderMode::EnabledWithTimestamp),
            7,
            &clocks,
        )
        .unwrap();
        let mut rx = Channel::new(
            ChannelConfig::new("bus", vec![a429(Direction::In)])
                .with_header(HeaderMode::EnabledWithTimestamp),
            8,
            &clocks,
        )
        .unwrap();

        tx.stream_mut("a429").unwrap().push(vec![0; 4], None).unwrap();
        let frame = tx.encode().unwrap().unwrap();
        clock.set(Timestamp::new(51, 5));
        rx.decode(&frame).unwrap();

        let popped = rx.stream_mut("a429").unwrap().pop().unwrap().unwrap();
        let info = popped.sample.info();
        assert_eq!(info.receive_timestamp, Some(Timestamp::new(51, 5)));
        let frame_info = info.frame.unwrap();
        assert_eq!(frame_info.producer_id, 7);
        assert_eq!(frame_info.sequence_number, 0);
        assert_eq!(frame_info.transport_timestamp, Some(Timestamp::new(50, 0)));
    }

    #[test]
    fn sequence_gaps_are_counted() {
        let (mut tx, mut rx) = pair(HeaderMode::Enabled);
        let mut frames = Vec::new();
        for _ in 0..6 {
            tx.stream_mut("a429").unwrap().push(vec![0; 4], None).unwrap();
            frames.push(tx.encode().unwrap().unwrap());
        }

        assert_eq!(rx.decode(&frames[0]).unwrap().missed_frames, 0);
        assert_eq!(rx.decode(&frames[5]).unwrap().missed_frames, 4);
        assert_eq!(rx.missed_frames(), 4);
    }

    #[test]
    fn producer_limit_is_fatal_and_queues_nothing() {
        let clocks = ComponentClocks::default();
        let mut config =
            ChannelConfig::new("bus", vec![a429(Direction::In)]).with_header(HeaderMode::Enabled);
        config.producer_capacity = 1;
        let mut rx = Channel::new(config, 1, &clocks).unwrap();

        let frame = |producer: u16| {
            let mut buf = BytesMut::new();
            buf.put_u16(producer);
            buf.put_u16(0);
            encode_block(0x20, &[0; 4], &mut buf).unwrap();
            buf
        };

        rx.decode(&frame(100)).unwrap();
        let err = rx.decode(&frame(200)).unwrap_err();
        assert!(err.is_fatal());
        assert!(!err.is_decode_failure());
        assert_eq!(rx.stream("a429").unwrap().incoming_len(), 1);
    }

    #[test]
    fn malformed_frame_applies_nothing() {
        let (_, mut rx) = pair(HeaderMode::Disabled);
        let mut buf = BytesMut::new();
        encode_block(0x20, &[1, 2, 3, 4], &mut buf).unwrap();
        buf.put_slice(&[0x00, 0x10, 0x00]);

        let err = rx.decode(&buf).unwrap_err();
        assert!(err.is_decode_failure());
        assert_eq!(rx.stream("a429").unwrap().incoming_len(), 0);
        assert_eq!(rx.stats().decode_failures, 1);

        // The next datagram is handled normally.
        let mut good = BytesMut::new();
        encode_block(0x20, &[1, 2, 3, 4], &mut good).unwrap();
        rx.decode(&good).unwrap();
        assert_eq!(rx.stream("a429").unwrap().incoming_len(), 1);
    }

    #[test]
    fn unknown_uid_is_a_decode_failure() {
        let (_, mut rx) = pair(HeaderMode::Disabled);
        let mut buf = BytesMut::new();
        encode_block(0x99, &[0; 4], &mut buf).unwrap();
        let err = rx.decode(&buf).unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Frame(FrameError::UnknownStream(0x99))
        ));
    }

    #[test]
    fn blocks_for_output_streams_are_skipped() {
        let (mut tx, _) = pair(HeaderMode::Disabled);
        let mut buf = BytesMut::new();
        encode_block(0x20, &[0; 4], &mut buf).unwrap();
        let report = tx.decode(&buf).unwrap();
        assert_eq!(report.skipped_blocks, 1);
        assert_eq!(report.samples, 0);
    }

    #[test]
    fn oversized_frame_keeps_queues() {
        let clocks = ComponentClocks::default();
        let mut config = ChannelConfig::new("bus", vec![a664(Direction::Out)]);
        config.max_frame_size = 64;
        let mut tx = Channel::new(config, 1, &clocks).unwrap();
        tx.stream_mut("a664").unwrap().push(vec![0; 100], None).unwrap();

        let err = tx.encode().unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Frame(FrameError::FrameTooLarge { max: 64, .. })
        ));
        assert_eq!(tx.stream("a664").unwrap().outgoing_len(), 1);
    }

    #[test]
    fn precise_offsets_survive_the_frame() {
        let stream = |direction| {
            StreamConfig::new("serial", 5, StreamProtocol::Serial, direction, 16)
                .with_sample_max_number(4)
                .with_data_timestamp(DataTimestampMode::AbsoluteWithOffset)
        };
        let clocks = ComponentClocks::default();
        let mut tx =
            Channel::new(ChannelConfig::new("c", vec![stream(Direction::Out)]), 1, &clocks)
                .unwrap();
        let mut rx =
            Channel::new(ChannelConfig::new("c", vec![stream(Direction::In)]), 2, &clocks).unwrap();

        let first = Timestamp::new(1_234_567, 8_910);
        let out = tx.stream_mut("serial").unwrap();
        out.push(vec![1], Some(first)).unwrap();
        out.push(vec![2], Some(first.offset_by_nanos(1_000_000_000)))
            .unwrap();
        rx.decode(&tx.encode().unwrap().unwrap()).unwrap();

        let input = rx.stream_mut("serial").unwrap();
        let a = input.pop().unwrap().unwrap();
        let b = input.pop().unwrap().unwrap();
        assert_eq!(a.sample.data_timestamp(), Some(first));
        assert_eq!(
            b.sample.data_timestamp(),
            Some(Timestamp::new(1_234_568, 8_910))
        );
    }

    #[test]
    fn timestamp_overflows_are_counted() {
        let config = StreamConfig::new("serial", 5, StreamProtocol::Serial, Direction::Out, 8)
            .with_sample_max_number(2)
            .with_data_timestamp(DataTimestampMode::AbsoluteWithOffset);
        let mut tx = Channel::new(
            ChannelConfig::new("c", vec![config]),
            1,
            &ComponentClocks::default(),
        )
        .unwrap();
        let out = tx.stream_mut("serial").unwrap();
        out.push(vec![1], Some(Timestamp::new(10, 0))).unwrap();
        out.push(vec![2], Some(Timestamp::new(20, 0))).unwrap();
        tx.encode().unwrap();
        assert_eq!(tx.stats().data_timestamp_overflows, 1);
    }

    #[test]
    fn signal_streams_round_trip_through_frames() {
        let stream = |direction| {
            StreamConfig::new("vnad", 3, StreamProtocol::Vnad, direction, 0).with_signals(vec![
                SignalConfig::vnad("a", ElementSize::One, 4, 0),
                SignalConfig::vnad("b", ElementSize::Two, 2, 1),
            ])
        };
        let clocks = ComponentClocks::default();
        let mut tx =
            Channel::new(ChannelConfig::new("c", vec![stream(Direction::Out)]), 1, &clocks)
                .unwrap();
        let mut rx =
            Channel::new(ChannelConfig::new("c", vec![stream(Direction::In)]), 2, &clocks).unwrap();

        let out = tx.stream_mut("vnad").unwrap();
        out.write_signal("a", b"hey").unwrap();
        out.write_signal("b", &0x0A0Bu16.to_ne_bytes()).unwrap();
        out.push_signals(None).unwrap();
        rx.decode(&tx.encode().unwrap().unwrap()).unwrap();

        let input = rx.stream_mut("vnad").unwrap();
        input.pop_signals().unwrap().unwrap();
        assert_eq!(input.read_signal("a").unwrap(), b"hey");
        assert_eq!(input.read_signal("b").unwrap(), 0x0A0Bu16.to_ne_bytes());
    }

    #[test]
    fn vnad_length_over_maximum_discards_the_frame() {
        let streams = vec![
            StreamConfig::new("labels", 7, StreamProtocol::A429, Direction::In, 4),
            StreamConfig::new("vnad", 3, StreamProtocol::Vnad, Direction::In, 0).with_signals(vec![
                SignalConfig::vnad("a", ElementSize::One, 4, 0),
                SignalConfig::vnad("b", ElementSize::Two, 2, 1),
            ]),
        ];
        let mut rx =
            Channel::new(ChannelConfig::new("c", streams), 2, &ComponentClocks::default()).unwrap();

        // A valid A429 block, then a VNAD sample claiming 5 bytes for "a" (max 4).
        let frame = [
            0, 7, 0, 4, 1, 2, 3, 4, //
            0, 3, 0, 13, 0, 11, 0, 5, 1, 2, 3, 4, 5, 0, 0, 0, 0,
        ];
        let err = rx.decode(&frame).unwrap_err();
        assert!(err.is_decode_failure());
        assert!(matches!(
            err,
            ChannelError::Signal(SignalError::TooLong { len: 5, max: 4, .. })
        ));

        assert!(rx.stream("labels").unwrap().is_incoming_empty());
        assert!(rx.stream("vnad").unwrap().is_incoming_empty());
        assert_eq!(rx.stats().decode_failures, 1);
        assert!(rx.stream_mut("vnad").unwrap().pop_signals().unwrap().is_none());
    }
}
