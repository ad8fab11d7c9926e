//! ED-247 channels and components.
//!
//! This is the layer applications talk to. A [`Component`] is built from a
//! [`ComponentConfig`] and owns its [`Channel`]s; each channel owns its
//! [`Stream`]s and turns their pending samples into one frame per send, or
//! dispatches a received frame into their incoming queues.

pub mod channel;
pub mod component;
pub mod config;
pub mod error;
pub mod stream;

pub use channel::{Channel, ChannelStats, DecodeReport};
pub use component::{Component, ComponentClocks, RuntimeMetrics};
pub use config::{ChannelConfig, ComponentConfig, Direction, StreamConfig, TransportConfig};
pub use error::{ChannelError, Result};
pub use stream::Stream;
