use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::DatagramTransport;

/// Largest UDP payload over IPv4.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Settings for a [`UdpEndpoint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpEndpointConfig {
    /// Local address to bind.
    pub local: SocketAddr,
    /// Where `send_datagram` delivers to.
    pub destination: Option<SocketAddr>,
    /// IPv4 multicast group to join after binding.
    pub multicast_group: Option<Ipv4Addr>,
    /// Interface used for multicast membership.
    pub multicast_interface: Ipv4Addr,
    /// TTL of outgoing multicast datagrams.
    pub multicast_ttl: u32,
    /// Whether outgoing multicast datagrams loop back to local listeners.
    pub multicast_loop: bool,
}

impl Default for UdpEndpointConfig {
    fn default() -> Self {
        Self {
            local: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
            destination: None,
            multicast_group: None,
            multicast_interface: Ipv4Addr::UNSPECIFIED,
            multicast_ttl: 1,
            multicast_loop: true,
        }
    }
}

/// UDP socket bound to one channel.
#[derive(Debug)]
pub struct UdpEndpoint {
    socket: UdpSocket,
    destination: Option<SocketAddr>,
    last_source: Option<SocketAddr>,
}

impl UdpEndpoint {
    /// Bind a unicast endpoint on `local`.
    pub fn bind(local: SocketAddr) -> Result<Self> {
        Self::with_config(UdpEndpointConfig {
            local,
            ..UdpEndpointConfig::default()
        })
    }

    /// Bind an endpoint with explicit settings.
    pub fn with_config(config: UdpEndpointConfig) -> Result<Self> {
        let socket = UdpSocket::bind(config.local).map_err(|source| TransportError::Bind {
            addr: config.local,
            source,
        })?;

        if let Some(group) = config.multicast_group {
            socket
                .join_multicast_v4(&group, &config.multicast_interface)
                .map_err(|source| TransportError::Multicast { group, source })?;
            socket.set_multicast_ttl_v4(config.multicast_ttl)?;
            socket.set_multicast_loop_v4(config.multicast_loop)?;
            debug!(%group, interface = %config.multicast_interface, "joined multicast group");
        }

        info!(local = ?socket.local_addr().ok(), destination = ?config.destination, "udp endpoint bound");

        Ok(Self {
            socket,
            destination: config.destination,
            last_source: None,
        })
    }

    /// Set the address `send_datagram` delivers to.
    pub fn with_destination(mut self, destination: SocketAddr) -> Self {
        self.destination = Some(destination);
        self
    }

    /// The locally bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(Into::into)
    }

    /// Source address of the last received datagram.
    pub fn last_source(&self) -> Option<SocketAddr> {
        self.last_source
    }
}

impl DatagramTransport for UdpEndpoint {
    fn send_datagram(&mut self, datagram: &[u8]) -> Result<()> {
        let destination = self.destination.ok_or(TransportError::NoDestination)?;
        if datagram.len() > MAX_UDP_PAYLOAD {
            return Err(TransportError::DatagramTooLarge {
                size: datagram.len(),
                max: MAX_UDP_PAYLOAD,
            });
        }

        loop {
            match self.socket.send_to(datagram, destination) {
                Ok(_) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn recv_datagram(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize> {
        // A zero read timeout is rejected by the socket API; poll instead.
        let poll = timeout.is_some_and(|t| t.is_zero());
        if poll {
            self.socket.set_nonblocking(true)?;
        } else {
            self.socket.set_read_timeout(timeout)?;
        }

        let result = loop {
            match self.socket.recv_from(buf) {
                Ok((len, source)) => {
                    self.last_source = Some(source);
                    break Ok(len);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    break Err(TransportError::Timeout(timeout.unwrap_or_default()));
                }
                Err(err) => break Err(TransportError::Io(err)),
            }
        };

        if poll {
            self.socket.set_nonblocking(false)?;
        }
        result
    }

    fn transport_name(&self) -> &'static str {
        "udp"
    }
}
