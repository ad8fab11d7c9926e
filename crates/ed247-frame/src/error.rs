/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The input ended before a complete field could be read.
    #[error("truncated {context}: need {needed} bytes, {available} available")]
    Truncated {
        context: &'static str,
        needed: usize,
        available: usize,
    },

    /// The input is structurally invalid.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// A block references a stream UID this channel does not know.
    #[error("unknown stream uid {0:#06x}")]
    UnknownStream(u16),

    /// A sample exceeds the stream's maximum sample size.
    #[error("sample too large ({size} bytes, max {max})")]
    SampleTooLarge { size: usize, max: usize },

    /// A block payload does not fit its 16-bit size field.
    #[error("block payload too large ({size} bytes, max {max})")]
    BlockTooLarge { size: usize, max: usize },

    /// An encoded frame exceeds the channel's maximum frame size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// More distinct producers are sending on the channel than it can track.
    #[error("producer table full ({capacity} producers); cannot track producer {producer_id}")]
    ProducerLimit { producer_id: u16, capacity: usize },

    /// A caller-supplied argument is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl FrameError {
    /// Whether the channel cannot keep working without reconfiguration.
    ///
    /// Only producer-table exhaustion is fatal. Every other error concerns a
    /// single frame or call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FrameError::ProducerLimit { .. })
    }

    /// Whether this error means a received frame was discarded.
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            FrameError::Truncated { .. }
                | FrameError::Malformed(_)
                | FrameError::UnknownStream(_)
                | FrameError::SampleTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
