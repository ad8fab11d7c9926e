use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::error::{Result, TransportError};
use crate::traits::DatagramTransport;

/// In-memory datagram transport.
///
/// Two ends created by [`LoopbackTransport::pair`] deliver to each other
/// in order and without loss. Useful to run two components in one process.
#[derive(Debug)]
pub struct LoopbackTransport {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl LoopbackTransport {
    /// Create two connected ends.
    pub fn pair() -> (Self, Self) {
        let (left_tx, right_rx) = mpsc::channel();
        let (right_tx, left_rx) = mpsc::channel();
        (
            Self {
                tx: left_tx,
                rx: left_rx,
            },
            Self {
                tx: right_tx,
                rx: right_rx,
            },
        )
    }
}

impl DatagramTransport for LoopbackTransport {
    fn send_datagram(&mut self, datagram: &[u8]) -> Result<()> {
        self.tx
            .send(datagram.to_vec())
            .map_err(|_| TransportError::Disconnected)
    }

    fn recv_datagram(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize> {
        let datagram = match timeout {
            None => self.rx.recv().map_err(|_| TransportError::Disconnected)?,
            Some(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(datagram) => datagram,
                Err(RecvTimeoutError::Timeout) => return Err(TransportError::Timeout(timeout)),
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Disconnected),
            },
        };

        if datagram.len() > buf.len() {
            return Err(TransportError::DatagramTooLarge {
                size: datagram.len(),
                max: buf.len(),
            });
        }
        buf[..datagram.len()].copy_from_slice(&datagram);
        Ok(datagram.len())
    }

    fn transport_name(&self) -> &'static str {
        "loopback"
    }
}
