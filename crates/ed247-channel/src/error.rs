/// Errors that can occur in channel and component operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] ed247_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] ed247_frame::FrameError),

    /// Signal packing error.
    #[error("signal error: {0}")]
    Signal(#[from] ed247_signal::SignalError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error while reading a configuration file.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The component description is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No stream with this name.
    #[error("unknown stream '{0}'")]
    UnknownStream(String),

    /// No channel with this name.
    #[error("unknown channel '{0}'")]
    UnknownChannel(String),

    /// The operation needs a direction the stream is not configured for.
    #[error("stream '{stream}' is not configured for {operation}")]
    DirectionMismatch {
        stream: String,
        operation: &'static str,
    },

    /// A signal operation on a stream that carries no signals.
    #[error("stream '{0}' is not signal based")]
    NotSignalBased(String),

    /// The channel has samples to send but no transport attached.
    #[error("channel '{0}' has no transport attached")]
    NoTransport(String),
}

impl ChannelError {
    /// Whether a wait for a frame ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ChannelError::Transport(err) if err.is_timeout())
    }

    /// Whether the channel needs reconfiguration before it can go on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChannelError::Frame(err) if err.is_fatal())
    }

    /// Whether a received frame or sample was discarded as invalid.
    pub fn is_decode_failure(&self) -> bool {
        match self {
            ChannelError::Frame(err) => err.is_decode_failure(),
            ChannelError::Signal(err) => err.is_decode_failure(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
