//! Signal packing for signal-based streams.
//!
//! DISCRETE, ANALOG and NAD streams carry their signals at fixed byte
//! offsets of a fixed-size sample. VNAD streams concatenate length-prefixed
//! signals in position order. A [`StreamAssistant`] keeps the latest written
//! and latest received value of every signal of one stream and translates
//! between those values and stream samples.
//!
//! Multi-byte signal elements travel big-endian; values handed to and
//! returned by the assistant are in host byte order.

pub mod assistant;
pub mod error;
pub mod normalize;
pub mod signal;

pub use assistant::{ReceivedSignals, StreamAssistant, VNAD_LENGTH_SIZE};
pub use error::{Result, SignalError};
pub use signal::{ElementSize, SignalConfig, SignalPlacement};
