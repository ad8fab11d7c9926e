use bytes::{Bytes, BytesMut};
use ed247_frame::{
    DecodedSample, EncodeReport, PayloadLayout, Popped, Sample, SampleInfo, SampleQueue,
    StreamProtocol, Timestamp,
};
use ed247_signal::{ReceivedSignals, StreamAssistant};
use tracing::trace;

use crate::config::{Direction, StreamConfig};
use crate::error::{ChannelError, Result};

/// A typed, directional data stream with its two sample queues.
#[derive(Debug, Clone)]
pub struct Stream {
    config: StreamConfig,
    layout: PayloadLayout,
    outgoing: SampleQueue,
    incoming: SampleQueue,
    assistant: Option<StreamAssistant>,
}

impl Stream {
    /// Build a stream from its description.
    pub fn new(config: StreamConfig) -> Result<Self> {
        let layout = PayloadLayout::new(
            config.protocol,
            config.sample_max_size(),
            config.data_timestamp,
        );
        let assistant = if config.signals.is_empty() {
            None
        } else {
            Some(StreamAssistant::new(
                &config.name,
                config.protocol,
                config.sample_max_size_bytes,
                config.signals.clone(),
            )?)
        };
        let max_sample_size = layout.max_sample_size();

        Ok(Self {
            outgoing: SampleQueue::new(config.sample_max_number, max_sample_size),
            incoming: SampleQueue::new(config.sample_max_number, max_sample_size),
            layout,
            assistant,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn uid(&self) -> u16 {
        self.config.uid
    }

    pub fn protocol(&self) -> StreamProtocol {
        self.config.protocol
    }

    pub fn direction(&self) -> Direction {
        self.config.direction
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn layout(&self) -> &PayloadLayout {
        &self.layout
    }

    /// Largest sample the stream accepts.
    pub fn sample_max_size(&self) -> usize {
        self.layout.max_sample_size()
    }

    pub fn sample_max_number(&self) -> usize {
        self.outgoing.capacity()
    }

    /// Queue one sample for the next send. Returns whether the outgoing
    /// queue is full afterwards; a push on a full queue evicts the oldest
    /// pending sample.
    pub fn push(
        &mut self,
        data: impl Into<Bytes>,
        data_timestamp: Option<Timestamp>,
    ) -> Result<bool> {
        self.require(Direction::is_output, "output")?;
        let mut sample = Sample::new(data);
        if let Some(timestamp) = data_timestamp {
            sample = sample.with_data_timestamp(timestamp);
        }
        let full = self.outgoing.push(sample)?;
        trace!(stream = %self.config.name, pending = self.outgoing.len(), "sample pushed");
        Ok(full)
    }

    /// Queue several samples, oldest first.
    ///
    /// Every sample is checked against the stream size before any is queued.
    pub fn push_multiple<I>(&mut self, samples: I) -> Result<bool>
    where
        I: IntoIterator<Item = Sample>,
    {
        self.require(Direction::is_output, "output")?;
        let samples: Vec<Sample> = samples.into_iter().collect();
        if let Some(sample) = samples.iter().find(|s| s.len() > self.sample_max_size()) {
            return Err(ed247_frame::FrameError::SampleTooLarge {
                size: sample.len(),
                max: self.sample_max_size(),
            }
            .into());
        }

        let mut full = self.outgoing.is_full();
        for sample in samples {
            full = self.outgoing.push(sample)?;
        }
        Ok(full)
    }

    /// Take the oldest received sample. `Ok(None)` when nothing is queued.
    pub fn pop(&mut self) -> Result<Option<Popped>> {
        self.require(Direction::is_input, "input")?;
        Ok(self.incoming.pop())
    }

    pub fn is_outgoing_full(&self) -> bool {
        self.outgoing.is_full()
    }

    pub fn outgoing_len(&self) -> usize {
        self.outgoing.len()
    }

    pub fn incoming_len(&self) -> usize {
        self.incoming.len()
    }

    pub fn is_incoming_empty(&self) -> bool {
        self.incoming.is_empty()
    }

    pub fn outgoing(&self) -> &SampleQueue {
        &self.outgoing
    }

    pub fn incoming(&self) -> &SampleQueue {
        &self.incoming
    }

    /// Samples dropped by drop-oldest eviction in either queue.
    pub fn evicted_samples(&self) -> u64 {
        self.outgoing.evicted() + self.incoming.evicted()
    }

    pub fn assistant(&self) -> Option<&StreamAssistant> {
        self.assistant.as_ref()
    }

    /// Set a signal value for the next [`Self::push_signals`].
    pub fn write_signal(&mut self, signal: &str, value: &[u8]) -> Result<()> {
        self.require(Direction::is_output, "output")?;
        self.assistant_mut()?.write(signal, value)?;
        Ok(())
    }

    /// Last received value of a signal.
    pub fn read_signal(&self, signal: &str) -> Result<&[u8]> {
        let assistant = self
            .assistant
            .as_ref()
            .ok_or_else(|| ChannelError::NotSignalBased(self.config.name.clone()))?;
        Ok(assistant.read(signal)?)
    }

    /// Pack the current signal values into one sample and queue it.
    pub fn push_signals(&mut self, data_timestamp: Option<Timestamp>) -> Result<bool> {
        self.require(Direction::is_output, "output")?;
        let name = &self.config.name;
        let assistant = self
            .assistant
            .as_mut()
            .ok_or_else(|| ChannelError::NotSignalBased(name.clone()))?;
        Ok(assistant.push(&mut self.outgoing, data_timestamp)?)
    }

    /// Pop the oldest received sample into the signal read values.
    ///
    /// `Ok(None)` leaves the read values as they were.
    pub fn pop_signals(&mut self) -> Result<Option<ReceivedSignals>> {
        self.require(Direction::is_input, "input")?;
        let name = &self.config.name;
        let assistant = self
            .assistant
            .as_mut()
            .ok_or_else(|| ChannelError::NotSignalBased(name.clone()))?;
        Ok(assistant.pop(&mut self.incoming)?)
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// Block payload for everything pending, without draining the queue.
    pub(crate) fn encode_pending(&self) -> Result<(BytesMut, EncodeReport)> {
        let mut payload =
            BytesMut::with_capacity(self.layout.encoded_len(self.outgoing.iter()));
        let report = self.layout.encode(self.outgoing.iter(), &mut payload)?;
        Ok((payload, report))
    }

    pub(crate) fn clear_pending(&mut self) {
        self.outgoing.clear();
    }

    /// Split a block payload into samples. Signal-based samples must also
    /// unpack cleanly, so a bad VNAD length fails the whole block.
    pub(crate) fn decode_payload(&self, payload: &Bytes) -> Result<Vec<DecodedSample>> {
        let samples = self.layout.decode(payload)?;
        if let Some(assistant) = &self.assistant {
            for sample in &samples {
                assistant.validate(&sample.data)?;
            }
        }
        Ok(samples)
    }

    /// Queue decoded samples for the application.
    pub(crate) fn deliver(&mut self, samples: Vec<DecodedSample>, info: SampleInfo) -> Result<()> {
        for decoded in samples {
            let sample = Sample::new(decoded.data).with_info(SampleInfo {
                data_timestamp: decoded.data_timestamp,
                ..info
            });
            self.incoming.push(sample)?;
        }
        Ok(())
    }

    fn assistant_mut(&mut self) -> Result<&mut StreamAssistant> {
        let name = &self.config.name;
        self.assistant
            .as_mut()
            .ok_or_else(|| ChannelError::NotSignalBased(name.clone()))
    }

    fn require(&self, allowed: fn(Direction) -> bool, operation: &'static str) -> Result<()> {
        if allowed(self.config.direction) {
            Ok(())
        } else {
            Err(ChannelError::DirectionMismatch {
                stream: self.config.name.clone(),
                operation,
            })
        }
    }
}
