use bytes::Bytes;
use ed247_transport::Timestamp;

/// Frame-level metadata attached to received samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInfo {
    /// Component identifier of the sender.
    pub producer_id: u16,
    /// Sender's frame sequence number.
    pub sequence_number: u16,
    /// Transport timestamp from the header, when the channel carries one.
    pub transport_timestamp: Option<Timestamp>,
}

/// Everything known about a sample besides its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleInfo {
    /// Application-supplied (outgoing) or decoded (incoming) data timestamp.
    pub data_timestamp: Option<Timestamp>,
    /// Local time at which the sample was decoded.
    pub receive_timestamp: Option<Timestamp>,
    /// Header of the frame that carried the sample. `None` for outgoing
    /// samples and for channels without a header.
    pub frame: Option<FrameInfo>,
}

/// One immutable unit of stream data.
///
/// The payload is reference counted: cloning a sample or popping it from a
/// queue never copies the bytes, and a popped sample stays valid after any
/// later queue operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sample {
    data: Bytes,
    info: SampleInfo,
}

impl Sample {
    /// Create a sample with no metadata.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            info: SampleInfo::default(),
        }
    }

    /// Attach an application data timestamp.
    pub fn with_data_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.info.data_timestamp = Some(timestamp);
        self
    }

    /// Replace the whole metadata block.
    pub fn with_info(mut self, info: SampleInfo) -> Self {
        self.info = info;
        self
    }

    /// The sample bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The sample bytes as a shared buffer.
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    /// Consume the sample and return its bytes.
    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    /// Sample length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the sample carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn info(&self) -> &SampleInfo {
        &self.info
    }

    pub fn data_timestamp(&self) -> Option<Timestamp> {
        self.info.data_timestamp
    }
}
