use std::net::SocketAddr;
use std::time::Duration;

/// Errors that can occur in datagram transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified local address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to join a multicast group.
    #[error("failed to join multicast group {group}: {source}")]
    Multicast {
        group: std::net::Ipv4Addr,
        source: std::io::Error,
    },

    /// No datagram arrived before the deadline elapsed.
    #[error("no datagram received within {0:?}")]
    Timeout(Duration),

    /// The datagram does not fit the transport or the receive buffer.
    #[error("datagram too large ({size} bytes, max {max})")]
    DatagramTooLarge { size: usize, max: usize },

    /// The endpoint has no destination to send to.
    #[error("no destination configured for send")]
    NoDestination,

    /// The other side of an in-memory transport was dropped.
    #[error("transport disconnected")]
    Disconnected,

    /// An I/O error occurred on the socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether this error is a receive deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
