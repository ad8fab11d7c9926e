//! ED-247 avionics data exchange.
//!
//! A component exchanges typed streams of samples with its peers over
//! datagram channels. Streams may be split into named signals. This crate
//! re-exports the layers of the workspace and ships the `ed247` command-line
//! tool behind the `cli` feature.
//!
//! # Crate Structure
//!
//! - [`transport`]: clocks, timestamps, UDP and in-memory transports
//! - [`frame`]: sample queues, frame headers, block and payload codecs
//! - [`signal`]: signal layouts and the stream assistant
//! - [`channel`]: configuration, streams, channels and components
//!
//! # Example
//!
//! ```
//! use ed247::{ComponentClocks, Component, ComponentConfig};
//!
//! let config = ComponentConfig::from_json_str(r#"{
//!     "name": "demo",
//!     "component_id": 1,
//!     "channels": [{
//!         "name": "bus",
//!         "header": "enabled",
//!         "streams": [{
//!             "name": "words",
//!             "uid": 1,
//!             "protocol": { "type": "A429" },
//!             "direction": "INOUT",
//!             "sample_max_size_bytes": 4
//!         }]
//!     }]
//! }"#).unwrap();
//!
//! let mut component = Component::new(config, ComponentClocks::default()).unwrap();
//! let stream = component.stream_mut("words").unwrap();
//! stream.push(vec![1, 2, 3, 4], None).unwrap();
//!
//! let frames = component.encode_all().unwrap();
//! assert_eq!(frames.len(), 1);
//! ```

/// Re-export transport types.
pub mod transport {
    pub use ed247_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use ed247_frame::*;
}

/// Re-export signal types.
pub mod signal {
    pub use ed247_signal::*;
}

/// Re-export channel and component types.
pub mod channel {
    pub use ed247_channel::*;
}

pub use ed247_channel::{
    Channel, ChannelConfig, ChannelError, Component, ComponentClocks, ComponentConfig, Direction,
    RuntimeMetrics, Stream, StreamConfig,
};
