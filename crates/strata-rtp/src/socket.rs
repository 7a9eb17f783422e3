//! # Socket Contract
//!
//! The capability a [`crate::session::Session`] needs from a datagram
//! transport. The session never touches a concrete socket; it asks a
//! [`SocketFactory`] for two instances and drives them through this trait.
//!
//! Implemented by [`crate::udp::UdpSocket`] and by the in-memory
//! [`crate::mem::MemorySocket`] used in tests.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;

/// Address family of a remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => f.write_str("IPv4"),
            AddressFamily::Ipv6 => f.write_str("IPv6"),
        }
    }
}

/// Where an inbound datagram came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemoteInfo {
    pub address: IpAddr,
    pub family: AddressFamily,
    pub port: u16,
}

impl RemoteInfo {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl From<SocketAddr> for RemoteInfo {
    fn from(addr: SocketAddr) -> Self {
        RemoteInfo {
            address: addr.ip(),
            family: if addr.is_ipv4() {
                AddressFamily::Ipv4
            } else {
                AddressFamily::Ipv6
            },
            port: addr.port(),
        }
    }
}

/// Completion callback for [`DatagramSocket::send`]: byte count or error.
pub type SendCallback = Box<dyn FnOnce(io::Result<usize>) + Send + 'static>;

/// Invoked once per inbound datagram, in arrival order.
pub type MessageHandler = Arc<dyn Fn(Bytes, RemoteInfo) + Send + Sync + 'static>;

/// A bindable datagram endpoint.
///
/// None of these calls block or fail synchronously. Bind failures are
/// reported through the implementation's own error channel; send failures
/// through the callback.
pub trait DatagramSocket: Send + Sync {
    /// Start listening on `port`.
    fn bind(&self, port: u16);

    /// Send `datagram` to `address:port`. `done` is called exactly once,
    /// unless the implementation never hears back from the network.
    fn send(&self, datagram: Bytes, port: u16, address: IpAddr, done: SendCallback);

    /// Stop sending and receiving. Calling it twice is a no-op.
    fn close(&self);

    /// Register the handler for inbound datagrams, replacing any previous one.
    fn on_message(&self, handler: MessageHandler);
}

/// Produces fresh, unbound sockets.
pub trait SocketFactory {
    fn create_socket(&self) -> Box<dyn DatagramSocket>;
}
