use ed247_frame::FrameError;

/// Errors that can occur while packing or unpacking signals.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// No signal with this name in the stream.
    #[error("unknown signal '{0}'")]
    UnknownSignal(String),

    /// A fixed-size signal was written with the wrong number of bytes.
    #[error("signal '{signal}' expects {expected} bytes, got {actual}")]
    SizeMismatch {
        signal: String,
        expected: usize,
        actual: usize,
    },

    /// A VNAD value is longer than the signal's declared maximum.
    #[error("signal '{signal}' value of {len} bytes exceeds maximum {max}")]
    TooLong {
        signal: String,
        len: usize,
        max: usize,
    },

    /// A VNAD value does not hold a whole number of elements.
    #[error("signal '{signal}' length {len} is not a multiple of element size {element_size}")]
    Misaligned {
        signal: String,
        len: usize,
        element_size: usize,
    },

    /// The signal set does not describe a valid sample layout.
    #[error("invalid signal layout for stream '{stream}': {reason}")]
    Layout { stream: String, reason: String },

    /// Frame-level error while queueing or decoding a sample.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

impl SignalError {
    /// Whether this error means a received sample could not be unpacked.
    pub fn is_decode_failure(&self) -> bool {
        match self {
            SignalError::TooLong { .. } | SignalError::Misaligned { .. } => true,
            SignalError::Frame(err) => err.is_decode_failure(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SignalError>;
