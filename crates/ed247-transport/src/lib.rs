//! Datagram transport abstraction and time sources for ED-247 exchanges.
//!
//! This is the lowest layer of the workspace. It provides:
//! - [`Timestamp`], the `{epoch seconds, nanosecond offset}` pair used on the wire
//! - the [`Clock`] trait, injected wherever a transport or receive timestamp is taken
//! - the [`DatagramTransport`] trait with a UDP and an in-memory implementation
//!
//! Everything above this crate is transport agnostic: a channel only ever
//! hands complete datagrams to a transport and takes complete datagrams back.

pub mod clock;
pub mod error;
pub mod loopback;
pub mod traits;
pub mod udp;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp, NANOS_PER_SECOND, TIMESTAMP_SIZE};
pub use error::{Result, TransportError};
pub use loopback::LoopbackTransport;
pub use traits::DatagramTransport;
pub use udp::{UdpEndpoint, UdpEndpointConfig, MAX_UDP_PAYLOAD};
