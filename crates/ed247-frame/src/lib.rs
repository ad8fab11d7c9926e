//! ED-247 frame codec.
//!
//! A frame is what one channel sends in one datagram:
//!
//! ```text
//! Frame    := Header? Block*
//! Header   := ProducerId:u16 SeqNum:u16 [EpochS:u32 OffsetNs:u32]
//! Block    := StreamUID:u16 PayloadSize:u16 Payload
//! Payload  := Sample*        (layout depends on the stream protocol)
//! ```
//!
//! All integers are big-endian. This crate owns the pieces that do not need
//! to know about channel configuration: the bounded [`SampleQueue`], the
//! [`FrameHeader`] codec with per-producer loss tracking, the block codec,
//! and [`PayloadLayout`] which splits a block payload into samples.

pub mod codec;
pub mod error;
pub mod header;
pub mod payload;
pub mod protocol;
pub mod queue;
pub mod sample;

pub use codec::{
    decode_block, encode_block, Block, BlockReader, BLOCK_HEADER_SIZE, MAX_BLOCK_PAYLOAD,
};
pub use error::{FrameError, Result};
pub use header::{
    sequence_gap, FrameHeader, HeaderEncoder, HeaderMode, ProducerStats, ProducerTracker,
    DEFAULT_PRODUCER_CAPACITY,
};
pub use payload::{DataTimestampMode, DecodedSample, EncodeReport, PayloadLayout, OFFSET_SIZE};
pub use protocol::{SampleFraming, StreamProtocol};
pub use queue::{Popped, SampleQueue};
pub use sample::{FrameInfo, Sample, SampleInfo};

pub use ed247_transport::{Clock, Timestamp};
