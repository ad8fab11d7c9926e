use bytes::{Buf, BufMut, Bytes, BytesMut};
use ed247_transport::{Timestamp, TIMESTAMP_SIZE};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{FrameError, Result};
use crate::protocol::{SampleFraming, StreamProtocol};
use crate::sample::Sample;

/// Wire size of a precise data-timestamp offset.
pub const OFFSET_SIZE: usize = 4;

/// Per-stream data timestamp setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataTimestampMode {
    /// No timestamp bytes in the payload.
    #[default]
    Disabled,
    /// The first sample of a block carries an absolute timestamp shared by
    /// every sample of that block.
    Absolute,
    /// The first sample carries an absolute timestamp, every later sample a
    /// signed 32-bit nanosecond offset from it.
    AbsoluteWithOffset,
}

/// A sample split out of a block payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSample {
    pub data: Bytes,
    pub data_timestamp: Option<Timestamp>,
}

/// Outcome of [`PayloadLayout::encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodeReport {
    /// Samples written.
    pub samples: usize,
    /// Payload bytes written.
    pub bytes: usize,
    /// Offsets that did not fit 32 bits and were clamped.
    pub offset_overflows: u64,
}

/// How one stream's samples are laid out in a block payload.
///
/// ```text
/// Payload  := Entry*
/// Entry    := Stamp? Length? Data
/// Stamp    := first entry:  EpochS:u32 OffsetNs:u32      (any enabled mode)
///             later entries: DeltaNs:i32                 (offset mode only)
/// Length   := u8 | u16                                   (prefixed framings)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLayout {
    framing: SampleFraming,
    timestamp: DataTimestampMode,
    max_sample_size: usize,
}

impl PayloadLayout {
    /// Layout for a stream of `protocol` with the given sample bound.
    pub fn new(
        protocol: StreamProtocol,
        max_sample_size: usize,
        timestamp: DataTimestampMode,
    ) -> Self {
        Self::with_framing(protocol.framing(max_sample_size), max_sample_size, timestamp)
    }

    /// Layout with an explicit framing.
    pub fn with_framing(
        framing: SampleFraming,
        max_sample_size: usize,
        timestamp: DataTimestampMode,
    ) -> Self {
        Self {
            framing,
            timestamp,
            max_sample_size: max_sample_size.min(framing.length_limit()),
        }
    }

    pub fn framing(&self) -> SampleFraming {
        self.framing
    }

    pub fn timestamp_mode(&self) -> DataTimestampMode {
        self.timestamp
    }

    /// Largest sample this layout can carry.
    pub fn max_sample_size(&self) -> usize {
        self.max_sample_size
    }

    /// Payload bytes `encode` will produce for these samples.
    pub fn encoded_len<'a>(&self, samples: impl IntoIterator<Item = &'a Sample>) -> usize {
        samples
            .into_iter()
            .enumerate()
            .map(|(index, sample)| {
                let data = match self.framing {
                    SampleFraming::Fixed(size) => size,
                    prefixed => prefixed.prefix_size() + sample.len(),
                };
                self.stamp_size(index) + data
            })
            .sum()
    }

    /// Append the payload for `samples`, oldest first, to `dst`.
    ///
    /// Fixed-size samples shorter than the stream size are zero padded.
    /// Samples without a data timestamp are stamped with zero, or with a
    /// zero offset after the first one.
    pub fn encode<'a>(
        &self,
        samples: impl IntoIterator<Item = &'a Sample>,
        dst: &mut BytesMut,
    ) -> Result<EncodeReport> {
        let start = dst.len();
        let mut report = EncodeReport::default();
        let mut first_stamp = Timestamp::ZERO;

        for (index, sample) in samples.into_iter().enumerate() {
            if sample.len() > self.max_sample_size {
                return Err(FrameError::SampleTooLarge {
                    size: sample.len(),
                    max: self.max_sample_size,
                });
            }

            let stamp = sample.data_timestamp().unwrap_or(Timestamp::ZERO);
            match (self.timestamp, index) {
                (DataTimestampMode::Disabled, _) => {}
                (_, 0) => {
                    first_stamp = stamp;
                    dst.put_slice(&stamp.to_be_bytes());
                }
                (DataTimestampMode::Absolute, _) => {}
                (DataTimestampMode::AbsoluteWithOffset, _) => {
                    let delta = match sample.data_timestamp() {
                        Some(stamp) => stamp.nanos_since(&first_stamp),
                        None => 0,
                    };
                    let clamped = delta.clamp(i64::from(i32::MIN), i64::from(i32::MAX));
                    if clamped != delta {
                        report.offset_overflows += 1;
                        warn!(delta, "data timestamp offset exceeds 32 bits; clamped");
                    }
                    dst.put_i32(clamped as i32);
                }
            }

            match self.framing {
                SampleFraming::Fixed(size) => {
                    dst.put_slice(sample.data());
                    dst.put_bytes(0, size - sample.len());
                }
                SampleFraming::U8Prefixed => {
                    dst.put_u8(sample.len() as u8);
                    dst.put_slice(sample.data());
                }
                SampleFraming::U16Prefixed => {
                    dst.put_u16(sample.len() as u16);
                    dst.put_slice(sample.data());
                }
            }
            report.samples += 1;
        }

        report.bytes = dst.len() - start;
        Ok(report)
    }

    /// Split a block payload into samples, oldest first.
    pub fn decode(&self, payload: &Bytes) -> Result<Vec<DecodedSample>> {
        let mut src = payload.clone();
        let mut samples = Vec::new();
        let mut first_stamp = Timestamp::ZERO;

        while src.has_remaining() {
            let remaining_before = src.remaining();
            let index = samples.len();

            let data_timestamp = match (self.timestamp, index) {
                (DataTimestampMode::Disabled, _) => None,
                (_, 0) => {
                    need(&src, TIMESTAMP_SIZE, "data timestamp")?;
                    let mut raw = [0u8; TIMESTAMP_SIZE];
                    src.copy_to_slice(&mut raw);
                    first_stamp = Timestamp::from_be_bytes(raw);
                    Some(first_stamp)
                }
                (DataTimestampMode::Absolute, _) => Some(first_stamp),
                (DataTimestampMode::AbsoluteWithOffset, _) => {
                    need(&src, OFFSET_SIZE, "data timestamp offset")?;
                    let delta = src.get_i32();
                    Some(first_stamp.offset_by_nanos(i64::from(delta)))
                }
            };

            let size = match self.framing {
                SampleFraming::Fixed(size) => size,
                SampleFraming::U8Prefixed => {
                    need(&src, 1, "sample size")?;
                    usize::from(src.get_u8())
                }
                SampleFraming::U16Prefixed => {
                    need(&src, 2, "sample size")?;
                    usize::from(src.get_u16())
                }
            };
            if size > self.max_sample_size {
                return Err(FrameError::SampleTooLarge {
                    size,
                    max: self.max_sample_size,
                });
            }
            need(&src, size, "sample data")?;
            let data = src.split_to(size);

            if src.remaining() == remaining_before {
                return Err(FrameError::Malformed(
                    "zero-length fixed samples cannot be delimited".to_string(),
                ));
            }
            samples.push(DecodedSample {
                data,
                data_timestamp,
            });
        }

        Ok(samples)
    }

    fn stamp_size(&self, index: usize) -> usize {
        match (self.timestamp, index) {
            (DataTimestampMode::Disabled, _) => 0,
            (_, 0) => TIMESTAMP_SIZE,
            (DataTimestampMode::Absolute, _) => 0,
            (DataTimestampMode::AbsoluteWithOffset, _) => OFFSET_SIZE,
        }
    }
}

fn need(src: &Bytes, needed: usize, context: &'static str) -> Result<()> {
    if src.remaining() < needed {
        return Err(FrameError::Truncated {
            context,
            needed,
            available: src.remaining(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(layout: &PayloadLayout, samples: &[Sample]) -> (Bytes, EncodeReport) {
        let mut buf = BytesMut::new();
        let report = layout.encode(samples.iter(), &mut buf).unwrap();
        assert_eq!(buf.len(), layout.encoded_len(samples.iter()));
        (buf.freeze(), report)
    }

    #[test]
    fn fixed_samples_are_padded() {
        let layout = PayloadLayout::new(StreamProtocol::A429, 4, DataTimestampMode::Disabled);
        let samples = [Sample::new(vec![1, 2, 3, 4]), Sample::new(vec![5, 6])];
        let (payload, report) = encode(&layout, &samples);

        assert_eq!(payload.as_ref(), &[1, 2, 3, 4, 5, 6, 0, 0]);
        assert_eq!(report.samples, 2);
        assert_eq!(report.bytes, 8);

        let decoded = layout.decode(&payload).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1].data.as_ref(), &[5, 6, 0, 0]);
        assert!(decoded[0].data_timestamp.is_none());
    }

    #[test]
    fn a825_uses_one_byte_lengths() {
        let layout = PayloadLayout::new(StreamProtocol::A825, 8, DataTimestampMode::Disabled);
        let samples = [Sample::new(vec![0xAA, 0xBB]), Sample::new(Vec::<u8>::new())];
        let (payload, _) = encode(&layout, &samples);
        assert_eq!(payload.as_ref(), &[2, 0xAA, 0xBB, 0]);

        let decoded = layout.decode(&payload).unwrap();
        assert_eq!(decoded[0].data.as_ref(), &[0xAA, 0xBB]);
        assert!(decoded[1].data.is_empty());
    }

    #[test]
    fn a664_with_size_prefix_uses_two_byte_lengths() {
        let protocol = StreamProtocol::A664 {
            message_size_prefix: true,
        };
        let layout = PayloadLayout::new(protocol, 300, DataTimestampMode::Disabled);
        let samples = [Sample::new(vec![7u8; 258])];
        let (payload, _) = encode(&layout, &samples);
        assert_eq!(&payload[..2], &[0x01, 0x02]);
        assert_eq!(payload.len(), 260);
    }

    #[test]
    fn absolute_mode_stamps_first_sample_only() {
        let layout = PayloadLayout::new(StreamProtocol::A825, 8, DataTimestampMode::Absolute);
        let samples = [
            Sample::new(vec![1]).with_data_timestamp(Timestamp::new(100, 5)),
            Sample::new(vec![2]).with_data_timestamp(Timestamp::new(200, 9)),
        ];
        let (payload, _) = encode(&layout, &samples);
        assert_eq!(payload.as_ref(), &[0, 0, 0, 100, 0, 0, 0, 5, 1, 1, 1, 2]);

        let decoded = layout.decode(&payload).unwrap();
        assert_eq!(decoded[0].data_timestamp, Some(Timestamp::new(100, 5)));
        assert_eq!(decoded[1].data_timestamp, Some(Timestamp::new(100, 5)));
    }

    #[test]
    fn offset_mode_reconstructs_with_carry() {
        let layout = PayloadLayout::new(
            StreamProtocol::A429,
            4,
            DataTimestampMode::AbsoluteWithOffset,
        );
        let first = Timestamp::new(1_234_567, 8_910);
        let samples = [
            Sample::new(vec![1; 4]).with_data_timestamp(first),
            Sample::new(vec![2; 4]).with_data_timestamp(first.offset_by_nanos(1_000_000_000)),
            Sample::new(vec![3; 4]).with_data_timestamp(first.offset_by_nanos(-9_000)),
        ];
        let (payload, report) = encode(&layout, &samples);
        assert_eq!(report.offset_overflows, 0);
        assert_eq!(payload.len(), 8 + 4 + 4 + 4 + 4 + 4);
        assert_eq!(&payload[12..16], &1_000_000_000i32.to_be_bytes());

        let decoded = layout.decode(&payload).unwrap();
        assert_eq!(decoded[0].data_timestamp, Some(first));
        assert_eq!(
            decoded[1].data_timestamp,
            Some(Timestamp::new(1_234_568, 8_910))
        );
        assert_eq!(
            decoded[2].data_timestamp,
            Some(Timestamp::new(1_234_566, 999_999_910))
        );
    }

    #[test]
    fn offset_overflow_is_clamped_and_counted() {
        let layout = PayloadLayout::new(
            StreamProtocol::A825,
            8,
            DataTimestampMode::AbsoluteWithOffset,
        );
        let samples = [
            Sample::new(vec![1]).with_data_timestamp(Timestamp::new(10, 0)),
            Sample::new(vec![2]).with_data_timestamp(Timestamp::new(20, 0)),
        ];
        let (payload, report) = encode(&layout, &samples);
        assert_eq!(report.offset_overflows, 1);
        assert_eq!(&payload[10..14], &i32::MAX.to_be_bytes());
    }

    #[test]
    fn truncated_payloads_fail() {
        let layout = PayloadLayout::new(StreamProtocol::A429, 4, DataTimestampMode::Disabled);
        let err = layout.decode(&Bytes::from_static(&[1, 2, 3])).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { needed: 4, available: 3, .. }));

        let layout = PayloadLayout::new(StreamProtocol::Serial, 8, DataTimestampMode::Disabled);
        let err = layout.decode(&Bytes::from_static(&[5, 1, 2])).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { .. }));

        let layout = PayloadLayout::new(StreamProtocol::Serial, 8, DataTimestampMode::Absolute);
        let err = layout.decode(&Bytes::from_static(&[0, 0, 0, 1])).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                context: "data timestamp",
                ..
            }
        ));
    }

    #[test]
    fn oversized_samples_fail_both_ways() {
        let layout = PayloadLayout::new(StreamProtocol::Serial, 2, DataTimestampMode::Disabled);
        let err = layout.decode(&Bytes::from_static(&[3, 1, 2, 3])).unwrap_err();
        assert!(matches!(err, FrameError::SampleTooLarge { size: 3, max: 2 }));

        let mut buf = BytesMut::new();
        let sample = Sample::new(vec![0u8; 3]);
        let err = layout.encode([&sample], &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::SampleTooLarge { .. }));
    }

    #[test]
    fn zero_size_fixed_samples_are_rejected() {
        let layout = PayloadLayout::new(StreamProtocol::A429, 0, DataTimestampMode::Disabled);
        let err = layout.decode(&Bytes::from_static(&[1])).unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn empty_payload_has_no_samples() {
        let layout = PayloadLayout::new(StreamProtocol::Vnad, 16, DataTimestampMode::Absolute);
        assert!(layout.decode(&Bytes::new()).unwrap().is_empty());
    }
}
