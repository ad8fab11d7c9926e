//! Stream protocol kinds and how their samples are framed in a block.

use serde::{Deserialize, Serialize};

/// How consecutive samples are delimited inside a block payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFraming {
    /// Every sample occupies exactly this many bytes.
    Fixed(usize),
    /// Each sample is preceded by a 1-byte length.
    U8Prefixed,
    /// Each sample is preceded by a 2-byte big-endian length.
    U16Prefixed,
}

impl SampleFraming {
    /// Bytes of length prefix per sample.
    pub fn prefix_size(self) -> usize {
        match self {
            SampleFraming::Fixed(_) => 0,
            SampleFraming::U8Prefixed => 1,
            SampleFraming::U16Prefixed => 2,
        }
    }

    /// Largest sample length the prefix can express.
    pub fn length_limit(self) -> usize {
        match self {
            SampleFraming::Fixed(size) => size,
            SampleFraming::U8Prefixed => u8::MAX as usize,
            SampleFraming::U16Prefixed => u16::MAX as usize,
        }
    }
}

/// Protocol type of a stream, with its protocol-specific settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum StreamProtocol {
    /// ARINC 664 messages, optionally with a 2-byte size prefix.
    A664 {
        #[serde(default)]
        message_size_prefix: bool,
    },
    /// ARINC 429 words.
    A429,
    /// ARINC 825 (CAN) messages.
    A825,
    /// MIL-STD-1553 messages.
    M1553,
    /// Serial line bytes.
    Serial,
    Audio,
    Video,
    Ethernet,
    /// Analog signals.
    Analog,
    /// Discrete signals.
    Discrete,
    /// Non-avionic data signals at fixed offsets.
    Nad,
    /// Variable-length non-avionic data signals.
    Vnad,
}

impl StreamProtocol {
    /// Sample framing inside a block for a stream of this protocol.
    pub fn framing(&self, sample_max_size: usize) -> SampleFraming {
        match self {
            StreamProtocol::A664 {
                message_size_prefix: true,
            }
            | StreamProtocol::Ethernet
            | StreamProtocol::Video
            | StreamProtocol::Vnad => SampleFraming::U16Prefixed,
            StreamProtocol::A825 | StreamProtocol::Serial => SampleFraming::U8Prefixed,
            StreamProtocol::A664 {
                message_size_prefix: false,
            }
            | StreamProtocol::A429
            | StreamProtocol::M1553
            | StreamProtocol::Audio
            | StreamProtocol::Analog
            | StreamProtocol::Discrete
            | StreamProtocol::Nad => SampleFraming::Fixed(sample_max_size),
        }
    }

    /// Whether samples of this stream are built from signals.
    pub fn is_signal_based(&self) -> bool {
        matches!(
            self,
            StreamProtocol::Analog
                | StreamProtocol::Discrete
                | StreamProtocol::Nad
                | StreamProtocol::Vnad
        )
    }

    /// Whether signals of this stream live at fixed byte offsets.
    pub fn has_fixed_signals(&self) -> bool {
        matches!(
            self,
            StreamProtocol::Analog | StreamProtocol::Discrete | StreamProtocol::Nad
        )
    }

    pub fn is_vnad(&self) -> bool {
        matches!(self, StreamProtocol::Vnad)
    }

    /// Upper-case protocol name as used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            StreamProtocol::A664 { .. } => "A664",
            StreamProtocol::A429 => "A429",
            StreamProtocol::A825 => "A825",
            StreamProtocol::M1553 => "M1553",
            StreamProtocol::Serial => "SERIAL",
            StreamProtocol::Audio => "AUDIO",
            StreamProtocol::Video => "VIDEO",
            StreamProtocol::Ethernet => "ETHERNET",
            StreamProtocol::Analog => "ANALOG",
            StreamProtocol::Discrete => "DISCRETE",
            StreamProtocol::Nad => "NAD",
            StreamProtocol::Vnad => "VNAD",
        }
    }
}
