use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ed247_transport::{Clock, Timestamp, TIMESTAMP_SIZE};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FrameError, Result};
use crate::sample::FrameInfo;

/// Default number of distinct producers a channel can track.
pub const DEFAULT_PRODUCER_CAPACITY: usize = 64;

/// Which header fields a channel puts in front of its blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMode {
    /// No header; frames start with the first block.
    #[default]
    Disabled,
    /// Producer id and sequence number.
    Enabled,
    /// Producer id, sequence number and transport timestamp.
    EnabledWithTimestamp,
}

impl HeaderMode {
    /// Header length on the wire.
    pub fn wire_size(self) -> usize {
        match self {
            HeaderMode::Disabled => 0,
            HeaderMode::Enabled => 4,
            HeaderMode::EnabledWithTimestamp => 4 + TIMESTAMP_SIZE,
        }
    }

    pub fn is_enabled(self) -> bool {
        !matches!(self, HeaderMode::Disabled)
    }
}

/// A decoded (or about to be encoded) frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub producer_id: u16,
    pub sequence_number: u16,
    pub transport_timestamp: Option<Timestamp>,
}

impl FrameHeader {
    /// Append the header to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u16(self.producer_id);
        dst.put_u16(self.sequence_number);
        if let Some(timestamp) = self.transport_timestamp {
            dst.put_slice(&timestamp.to_be_bytes());
        }
    }

    /// Read a header from the front of `src` according to `mode`.
    ///
    /// Returns `None` for [`HeaderMode::Disabled`] without consuming input.
    /// Decoding is side-effect free: loss accounting happens separately in
    /// [`ProducerTracker::observe`].
    pub fn decode(mode: HeaderMode, src: &mut Bytes) -> Result<Option<Self>> {
        if !mode.is_enabled() {
            return Ok(None);
        }
        if src.remaining() < mode.wire_size() {
            return Err(FrameError::Truncated {
                context: "frame header",
                needed: mode.wire_size(),
                available: src.remaining(),
            });
        }

        let producer_id = src.get_u16();
        let sequence_number = src.get_u16();
        let transport_timestamp = match mode {
            HeaderMode::EnabledWithTimestamp => {
                let mut raw = [0u8; TIMESTAMP_SIZE];
                src.copy_to_slice(&mut raw);
                Some(Timestamp::from_be_bytes(raw))
            }
            _ => None,
        };

        Ok(Some(Self {
            producer_id,
            sequence_number,
            transport_timestamp,
        }))
    }
}

impl From<FrameHeader> for FrameInfo {
    fn from(header: FrameHeader) -> Self {
        Self {
            producer_id: header.producer_id,
            sequence_number: header.sequence_number,
            transport_timestamp: header.transport_timestamp,
        }
    }
}

/// Send side of the header codec: one sequence counter per channel.
#[derive(Debug, Clone)]
pub struct HeaderEncoder {
    mode: HeaderMode,
    producer_id: u16,
    next_sequence: u16,
    clock: Option<Arc<dyn Clock>>,
}

impl HeaderEncoder {
    /// Create an encoder for the local component `producer_id`.
    ///
    /// With [`HeaderMode::EnabledWithTimestamp`] and no clock, the transport
    /// timestamp field is zero filled.
    pub fn new(mode: HeaderMode, producer_id: u16, clock: Option<Arc<dyn Clock>>) -> Self {
        Self {
            mode,
            producer_id,
            next_sequence: 0,
            clock,
        }
    }

    pub fn mode(&self) -> HeaderMode {
        self.mode
    }

    /// Sequence number the next encoded header will carry.
    pub fn next_sequence(&self) -> u16 {
        self.next_sequence
    }

    /// Write the next header to `dst` and advance the sequence counter.
    ///
    /// Returns the header written, or `None` when headers are disabled.
    pub fn encode(&mut self, dst: &mut BytesMut) -> Option<FrameHeader> {
        if !self.mode.is_enabled() {
            return None;
        }

        let transport_timestamp = match self.mode {
            HeaderMode::EnabledWithTimestamp => Some(
                self.clock
                    .as_ref()
                    .map(|clock| clock.now())
                    .unwrap_or(Timestamp::ZERO),
            ),
            _ => None,
        };
        let header = FrameHeader {
            producer_id: self.producer_id,
            sequence_number: self.next_sequence,
            transport_timestamp,
        };
        header.encode(dst);
        self.next_sequence = self.next_sequence.wrapping_add(1);
        Some(header)
    }
}

/// Number of frames lost between two consecutive sequence numbers.
///
/// Computed modulo 2^16, so `65535 -> 0` is no loss. A repeated or
/// older sequence number reads as a near-complete wrap.
pub fn sequence_gap(last: u16, current: u16) -> u16 {
    current.wrapping_sub(last).wrapping_sub(1)
}

/// Loss statistics for one remote producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerStats {
    pub producer_id: u16,
    pub last_sequence: u16,
    /// Accumulated missed frames, saturating at `u16::MAX`.
    pub missed: u16,
}

/// Receive side of the header codec: per-producer sequence tracking.
///
/// Producers are kept in arrival order in a table of fixed capacity. A new
/// producer arriving when the table is full is a provisioning error.
#[derive(Debug, Clone)]
pub struct ProducerTracker {
    producers: Vec<ProducerStats>,
    capacity: usize,
}

impl ProducerTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            producers: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a received header and return the frames it reveals as missed.
    pub fn observe(&mut self, producer_id: u16, sequence_number: u16) -> Result<u16> {
        if let Some(stats) = self
            .producers
            .iter_mut()
            .find(|stats| stats.producer_id == producer_id)
        {
            let gap = sequence_gap(stats.last_sequence, sequence_number);
            stats.missed = stats.missed.saturating_add(gap);
            stats.last_sequence = sequence_number;
            if gap > 0 {
                debug!(
                    producer_id,
                    sequence_number,
                    gap,
                    total = stats.missed,
                    "missed frames detected"
                );
            }
            return Ok(gap);
        }

        if self.producers.len() >= self.capacity {
            warn!(
                producer_id,
                capacity = self.capacity,
                "producer table full; frame rejected"
            );
            return Err(FrameError::ProducerLimit {
                producer_id,
                capacity: self.capacity,
            });
        }

        debug!(producer_id, sequence_number, "tracking new producer");
        self.producers.push(ProducerStats {
            producer_id,
            last_sequence: sequence_number,
            missed: 0,
        });
        Ok(0)
    }

    /// Sum of every producer's missed-frame counter.
    pub fn missed_frames(&self) -> u64 {
        self.producers
            .iter()
            .map(|stats| u64::from(stats.missed))
            .sum()
    }

    pub fn get(&self, producer_id: u16) -> Option<&ProducerStats> {
        self.producers
            .iter()
            .find(|stats| stats.producer_id == producer_id)
    }

    /// Tracked producers in first-seen order.
    pub fn producers(&self) -> &[ProducerStats] {
        &self.producers
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ProducerTracker {
    fn default() -> Self {
        Self::new(DEFAULT_PRODUCER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use ed247_transport::ManualClock;

    use super::*;

    #[test]
    fn encoder_counts_from_zero_and_wraps() {
        let mut encoder = HeaderEncoder::new(HeaderMode::Enabled, 0x0A0B, None);
        let mut buf = BytesMut::new();

        let first = encoder.encode(&mut buf).unwrap();
        assert_eq!(first.sequence_number, 0);
        assert_eq!(buf.as_ref(), &[0x0A, 0x0B, 0x00, 0x00]);

        encoder.next_sequence = u16::MAX;
        buf.clear();
        assert_eq!(encoder.encode(&mut buf).unwrap().sequence_number, u16::MAX);
        assert_eq!(encoder.next_sequence(), 0);
    }

    #[test]
    fn disabled_encoder_writes_nothing() {
        let mut encoder = HeaderEncoder::new(HeaderMode::Disabled, 1, None);
        let mut buf = BytesMut::new();
        assert!(encoder.encode(&mut buf).is_none());
        assert!(buf.is_empty());
        assert_eq!(encoder.next_sequence(), 0);
    }

    #[test]
    fn timestamp_field_uses_clock_or_zero() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Timestamp::new(5, 6)));
        let mut encoder = HeaderEncoder::new(HeaderMode::EnabledWithTimestamp, 2, Some(clock));
        let mut buf = BytesMut::new();
        encoder.encode(&mut buf);
        assert_eq!(buf.len(), 12);
        assert_eq!(&buf[4..], &[0, 0, 0, 5, 0, 0, 0, 6]);

        let mut encoder = HeaderEncoder::new(HeaderMode::EnabledWithTimestamp, 2, None);
        let mut buf = BytesMut::new();
        let header = encoder.encode(&mut buf).unwrap();
        assert_eq!(header.transport_timestamp, Some(Timestamp::ZERO));
        assert_eq!(&buf[4..], &[0u8; 8]);
    }

    #[test]
    fn decode_reads_what_encode_wrote() {
        let header = FrameHeader {
            producer_id: 42,
            sequence_number: 513,
            transport_timestamp: Some(Timestamp::new(9, 10)),
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        buf.put_slice(b"rest");

        let mut src = buf.freeze();
        let decoded = FrameHeader::decode(HeaderMode::EnabledWithTimestamp, &mut src)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, header);
        assert_eq!(src.as_ref(), b"rest");
    }

    #[test]
    fn decode_rejects_short_header() {
        let mut src = Bytes::from_static(&[0, 1, 0]);
        let err = FrameHeader::decode(HeaderMode::Enabled, &mut src).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { needed: 4, .. }));
    }

    #[test]
    fn disabled_decode_consumes_nothing() {
        let mut src = Bytes::from_static(&[1, 2, 3, 4]);
        assert!(FrameHeader::decode(HeaderMode::Disabled, &mut src)
            .unwrap()
            .is_none());
        assert_eq!(src.len(), 4);
    }

    #[test]
    fn gap_handles_wraparound() {
        assert_eq!(sequence_gap(10, 11), 0);
        assert_eq!(sequence_gap(10, 15), 4);
        assert_eq!(sequence_gap(65_534, 65_535), 0);
        assert_eq!(sequence_gap(65_535, 0), 0);
        assert_eq!(sequence_gap(65_535, 3), 3);
        assert_eq!(sequence_gap(7, 7), u16::MAX);
    }

    #[test]
    fn wraparound_sequence_reports_no_loss() {
        let mut tracker = ProducerTracker::default();
        for sn in [65_534u16, 65_535, 0, 1] {
            assert_eq!(tracker.observe(3, sn).unwrap(), 0);
        }
        assert_eq!(tracker.missed_frames(), 0);
    }

    #[test]
    fn producers_are_tracked_independently() {
        let mut tracker = ProducerTracker::default();
        tracker.observe(1, 10).unwrap();
        tracker.observe(2, 100).unwrap();
        assert_eq!(tracker.observe(1, 15).unwrap(), 4);
        assert_eq!(tracker.observe(2, 101).unwrap(), 0);

        assert_eq!(tracker.get(1).unwrap().missed, 4);
        assert_eq!(tracker.get(2).unwrap().missed, 0);
        assert_eq!(tracker.missed_frames(), 4);
        assert_eq!(tracker.producers()[0].producer_id, 1);
    }

    #[test]
    fn missed_counter_saturates() {
        let mut tracker = ProducerTracker::new(1);
        tracker.observe(1, 0).unwrap();
        tracker.observe(1, 0).unwrap();
        tracker.observe(1, 0).unwrap();
        assert_eq!(tracker.get(1).unwrap().missed, u16::MAX);
    }

    #[test]
    fn full_table_is_a_fatal_error() {
        let mut tracker = ProducerTracker::new(2);
        tracker.observe(1, 0).unwrap();
        tracker.observe(2, 0).unwrap();
        let err = tracker.observe(3, 0).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            FrameError::ProducerLimit {
                producer_id: 3,
                capacity: 2
            }
        ));
        // Known producers keep working.
        assert_eq!(tracker.observe(2, 2).unwrap(), 1);
    }
}
