use std::time::Duration;

use crate::error::Result;

/// A connectionless, message-preserving transport bound to one channel.
///
/// Implementations may lose or reorder datagrams. They must never split or
/// merge them: one `send_datagram` call on one side is at most one
/// successful `recv_datagram` call on the other.
pub trait DatagramTransport: Send {
    /// Send one complete datagram.
    fn send_datagram(&mut self, datagram: &[u8]) -> Result<()>;

    /// Wait for one datagram and copy it into `buf`.
    ///
    /// Blocks until a datagram arrives or `timeout` elapses (`None` waits
    /// forever). Returns the datagram length, or
    /// [`TransportError::Timeout`](crate::TransportError::Timeout) on expiry.
    fn recv_datagram(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize>;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

impl<T: DatagramTransport + ?Sized> DatagramTransport for Box<T> {
    fn send_datagram(&mut self, datagram: &[u8]) -> Result<()> {
        (**self).send_datagram(datagram)
    }

    fn recv_datagram(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize> {
        (**self).recv_datagram(buf, timeout)
    }

    fn transport_name(&self) -> &'static str {
        (**self).transport_name()
    }
}
