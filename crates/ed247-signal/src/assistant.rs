use std::collections::HashSet;
use std::ops::Range;

use bytes::{BufMut, Bytes, BytesMut};
use ed247_frame::{FrameError, Sample, SampleInfo, SampleQueue, StreamProtocol, Timestamp};
use tracing::trace;

use crate::error::{Result, SignalError};
use crate::normalize::swap_elements;
use crate::signal::{SignalConfig, SignalPlacement};

/// Length prefix of each VNAD signal.
pub const VNAD_LENGTH_SIZE: usize = 2;

/// Metadata of a sample unpacked by [`StreamAssistant::pop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedSignals {
    pub info: SampleInfo,
    /// True when the incoming queue is empty after this pop.
    pub now_empty: bool,
}

#[derive(Debug, Clone)]
struct SignalSlot {
    config: SignalConfig,
    /// Latest value to send, host byte order.
    write: Vec<u8>,
    /// Set by a write, cleared by a successful push.
    written: bool,
    /// Latest value received, host byte order.
    read: Vec<u8>,
}

#[derive(Debug, Clone)]
enum Packing {
    Fixed { sample_size: usize },
    /// Slot indices in ascending position order.
    Vnad { order: Vec<usize> },
}

/// Packs the signals of one signal-based stream into stream samples and back.
#[derive(Debug, Clone)]
pub struct StreamAssistant {
    stream: String,
    packing: Packing,
    slots: Vec<SignalSlot>,
}

impl StreamAssistant {
    /// Build an assistant for `stream`.
    ///
    /// Fixed-layout streams (DISCRETE, ANALOG, NAD) need every signal to fit
    /// in `sample_max_size`. VNAD streams ignore `sample_max_size`; their
    /// sample bound follows from the signals, see [`Self::vnad_sample_max_size`].
    pub fn new(
        stream: &str,
        protocol: StreamProtocol,
        sample_max_size: usize,
        signals: Vec<SignalConfig>,
    ) -> Result<Self> {
        let layout_error = |reason: String| SignalError::Layout {
            stream: stream.to_string(),
            reason,
        };

        if !protocol.is_signal_based() {
            return Err(layout_error(format!(
                "{} streams do not carry signals",
                protocol.name()
            )));
        }

        let mut names = HashSet::new();
        for signal in &signals {
            if !names.insert(signal.name.as_str()) {
                return Err(layout_error(format!("duplicate signal '{}'", signal.name)));
            }
        }

        let packing = if protocol.is_vnad() {
            let mut order = Vec::with_capacity(signals.len());
            for (index, signal) in signals.iter().enumerate() {
                match signal.placement {
                    SignalPlacement::Vnad { position } => order.push((position, index)),
                    SignalPlacement::Fixed { .. } => {
                        return Err(layout_error(format!(
                            "signal '{}' has a fixed offset in a VNAD stream",
                            signal.name
                        )))
                    }
                }
                if signal.byte_size() > u16::MAX as usize {
                    return Err(layout_error(format!(
                        "signal '{}' exceeds the 16-bit VNAD length",
                        signal.name
                    )));
                }
            }
            order.sort_unstable();
            if let Some(pair) = order.windows(2).find(|pair| pair[0].0 == pair[1].0) {
                return Err(layout_error(format!("duplicate VNAD position {}", pair[0].0)));
            }
            Packing::Vnad {
                order: order.into_iter().map(|(_, index)| index).collect(),
            }
        } else {
            for signal in &signals {
                match signal.placement {
                    SignalPlacement::Fixed { byte_offset } => {
                        let end = byte_offset
                            .checked_add(signal.byte_size())
                            .filter(|&end| end <= sample_max_size);
                        if end.is_none() {
                            return Err(layout_error(format!(
                                "signal '{}' at byte {byte_offset} with {} elements does not fit in sample size {sample_max_size}",
                                signal.name, signal.element_count
                            )));
                        }
                    }
                    SignalPlacement::Vnad { .. } => {
                        return Err(layout_error(format!(
                            "signal '{}' has a VNAD position in a {} stream",
                            signal.name,
                            protocol.name()
                        )))
                    }
                }
            }
            Packing::Fixed {
                sample_size: sample_max_size,
            }
        };

        let slots = signals
            .into_iter()
            .map(|config| {
                let initial = match packing {
                    Packing::Fixed { .. } => vec![0u8; config.byte_size()],
                    Packing::Vnad { .. } => Vec::new(),
                };
                SignalSlot {
                    config,
                    write: initial.clone(),
                    written: false,
                    read: initial,
                }
            })
            .collect();

        Ok(Self {
            stream: stream.to_string(),
            packing,
            slots,
        })
    }

    /// Largest VNAD sample the given signals can produce, saturating at
    /// `usize::MAX`.
    pub fn vnad_sample_max_size(signals: &[SignalConfig]) -> usize {
        signals.iter().fold(0usize, |total, signal| {
            total.saturating_add(VNAD_LENGTH_SIZE.saturating_add(signal.byte_size()))
        })
    }

    pub fn stream_name(&self) -> &str {
        &self.stream
    }

    pub fn is_vnad(&self) -> bool {
        matches!(self.packing, Packing::Vnad { .. })
    }

    /// Upper bound of an encoded sample.
    pub fn sample_max_size(&self) -> usize {
        match &self.packing {
            Packing::Fixed { sample_size } => *sample_size,
            Packing::Vnad { .. } => self
                .slots
                .iter()
                .map(|slot| VNAD_LENGTH_SIZE + slot.config.byte_size())
                .sum(),
        }
    }

    /// Signal descriptions in declaration order.
    pub fn signals(&self) -> impl Iterator<Item = &SignalConfig> + '_ {
        self.slots.iter().map(|slot| &slot.config)
    }

    pub fn signal_index(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| slot.config.name == name)
    }

    /// Set the value sent by the next push.
    ///
    /// Fixed signals take exactly their declared size. VNAD signals take any
    /// whole number of elements up to their maximum.
    pub fn write(&mut self, name: &str, value: &[u8]) -> Result<()> {
        let index = self.require(name)?;
        self.write_at(index, value)
    }

    /// [`Self::write`] by signal index.
    pub fn write_at(&mut self, index: usize, value: &[u8]) -> Result<()> {
        let vnad = self.is_vnad();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| SignalError::UnknownSignal(format!("#{index}")))?;
        let max = slot.config.byte_size();
        let element_size = slot.config.element_size.bytes();

        if vnad {
            if value.len() > max {
                return Err(SignalError::TooLong {
                    signal: slot.config.name.clone(),
                    len: value.len(),
                    max,
                });
            }
            if value.len() % element_size != 0 {
                return Err(SignalError::Misaligned {
                    signal: slot.config.name.clone(),
                    len: value.len(),
                    element_size,
                });
            }
        } else if value.len() != max {
            return Err(SignalError::SizeMismatch {
                signal: slot.config.name.clone(),
                expected: max,
                actual: value.len(),
            });
        }

        slot.write.clear();
        slot.write.extend_from_slice(value);
        slot.written = true;
        Ok(())
    }

    /// Latest received value of a signal; zeros (fixed) or empty (VNAD)
    /// until something is received.
    pub fn read(&self, name: &str) -> Result<&[u8]> {
        let index = self.require(name)?;
        Ok(&self.slots[index].read)
    }

    /// Whether the signal was written since the last successful push.
    pub fn was_written(&self, name: &str) -> Result<bool> {
        let index = self.require(name)?;
        Ok(self.slots[index].written)
    }

    /// Pack the current write values into one stream sample.
    pub fn encode(&self) -> Bytes {
        match &self.packing {
            Packing::Fixed { sample_size } => {
                let mut sample = vec![0u8; *sample_size];
                for slot in &self.slots {
                    if let SignalPlacement::Fixed { byte_offset } = slot.config.placement {
                        let range = byte_offset..byte_offset + slot.write.len();
                        swap_elements(&slot.write, slot.config.element_size, &mut sample[range]);
                    }
                }
                Bytes::from(sample)
            }
            Packing::Vnad { order } => {
                let size = order
                    .iter()
                    .map(|&index| VNAD_LENGTH_SIZE + self.slots[index].write.len())
                    .sum();
                let mut sample = BytesMut::with_capacity(size);
                for &index in order {
                    let slot = &self.slots[index];
                    sample.put_u16(slot.write.len() as u16);
                    let start = sample.len();
                    sample.put_bytes(0, slot.write.len());
                    swap_elements(&slot.write, slot.config.element_size, &mut sample[start..]);
                }
                sample.freeze()
            }
        }
    }

    /// Unpack a stream sample into the read values of every signal.
    ///
    /// Either every signal is updated or, on error, none is.
    pub fn decode(&mut self, sample: &[u8]) -> Result<()> {
        for (index, range) in self.locate(sample)? {
            let slot = &mut self.slots[index];
            slot.read.resize(range.len(), 0);
            swap_elements(&sample[range], slot.config.element_size, &mut slot.read);
        }
        Ok(())
    }

    /// Check that `sample` unpacks cleanly without touching the read values.
    pub fn validate(&self, sample: &[u8]) -> Result<()> {
        self.locate(sample).map(|_| ())
    }

    /// Byte range of every signal within `sample`.
    fn locate(&self, sample: &[u8]) -> Result<Vec<(usize, Range<usize>)>> {
        match &self.packing {
            Packing::Fixed { .. } => {
                let mut ranges = Vec::with_capacity(self.slots.len());
                for (index, slot) in self.slots.iter().enumerate() {
                    if let SignalPlacement::Fixed { byte_offset } = slot.config.placement {
                        let end = byte_offset + slot.config.byte_size();
                        if end > sample.len() {
                            return Err(FrameError::Truncated {
                                context: "fixed signal",
                                needed: end,
                                available: sample.len(),
                            }
                            .into());
                        }
                        ranges.push((index, byte_offset..end));
                    }
                }
                Ok(ranges)
            }
            Packing::Vnad { order } => {
                let mut ranges = Vec::with_capacity(order.len());
                let mut cursor = 0usize;
                for &index in order {
                    let slot = &self.slots[index];
                    if sample.len() < cursor + VNAD_LENGTH_SIZE {
                        return Err(FrameError::Truncated {
                            context: "VNAD signal length",
                            needed: VNAD_LENGTH_SIZE,
                            available: sample.len() - cursor,
                        }
                        .into());
                    }
                    let len = usize::from(u16::from_be_bytes([sample[cursor], sample[cursor + 1]]));
                    cursor += VNAD_LENGTH_SIZE;

                    let max = slot.config.byte_size();
                    let element_size = slot.config.element_size.bytes();
                    if len > max {
                        return Err(SignalError::TooLong {
                            signal: slot.config.name.clone(),
                            len,
                            max,
                        });
                    }
                    if len % element_size != 0 {
                        return Err(SignalError::Misaligned {
                            signal: slot.config.name.clone(),
                            len,
                            element_size,
                        });
                    }
                    if sample.len() < cursor + len {
                        return Err(FrameError::Truncated {
                            context: "VNAD signal data",
                            needed: len,
                            available: sample.len() - cursor,
                        }
                        .into());
                    }
                    ranges.push((index, cursor..cursor + len));
                    cursor += len;
                }
                if cursor != sample.len() {
                    return Err(FrameError::Malformed(format!(
                        "{} trailing bytes after VNAD signals of stream '{}'",
                        sample.len() - cursor,
                        self.stream
                    ))
                    .into());
                }
                Ok(ranges)
            }
        }
    }

    /// Encode the current values and push them to the stream's outgoing
    /// queue. Returns whether the queue is full afterwards.
    ///
    /// On success the written flags are cleared and VNAD signals are reset
    /// to empty, so an unwritten VNAD signal is sent with length 0. Fixed
    /// signals keep their value for the next push.
    pub fn push(
        &mut self,
        queue: &mut SampleQueue,
        data_timestamp: Option<Timestamp>,
    ) -> Result<bool> {
        let mut sample = Sample::new(self.encode());
        if let Some(timestamp) = data_timestamp {
            sample = sample.with_data_timestamp(timestamp);
        }
        let full = queue.push(sample)?;
        let vnad = self.is_vnad();
        for slot in &mut self.slots {
            slot.written = false;
            if vnad {
                slot.write.clear();
            }
        }
        trace!(stream = %self.stream, full, "pushed signal sample");
        Ok(full)
    }

    /// Pop the oldest received sample and unpack it.
    ///
    /// Returns `Ok(None)` when nothing was received; read values then keep
    /// their last received contents.
    pub fn pop(&mut self, queue: &mut SampleQueue) -> Result<Option<ReceivedSignals>> {
        let Some(popped) = queue.pop() else {
            return Ok(None);
        };
        self.decode(popped.sample.data())?;
        Ok(Some(ReceivedSignals {
            info: *popped.sample.info(),
            now_empty: popped.now_empty,
        }))
    }

    fn require(&self, name: &str) -> Result<usize> {
        self.signal_index(name)
            .ok_or_else(|| SignalError::UnknownSignal(name.to_string()))
    }
}
