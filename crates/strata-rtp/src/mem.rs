//! # In-Memory Socket Network
//!
//! A process-local stand-in for UDP. Sockets bind ports on a shared hub and
//! a send to port P synchronously runs the handler of whichever socket holds
//! P. The destination address is recorded but otherwise ignored, so every
//! address behaves like loopback.
//!
//! Besides delivery the hub can capture everything addressed to a port,
//! fail sends on demand, and inject raw datagrams.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::socket::{DatagramSocket, MessageHandler, RemoteInfo, SendCallback, SocketFactory};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn handler_of(slot: &Mutex<SocketSlot>) -> Option<MessageHandler> {
    lock(slot).handler.clone()
}

/// One datagram as seen on the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub datagram: Bytes,
    pub address: IpAddr,
    /// Port of the sending socket, 0 if it never bound.
    pub from_port: u16,
}

#[derive(Default)]
struct SocketSlot {
    port: Option<u16>,
    handler: Option<MessageHandler>,
    closed: bool,
}

#[derive(Default)]
struct Hub {
    bound: HashMap<u16, Arc<Mutex<SocketSlot>>>,
    captured: HashMap<u16, Vec<Captured>>,
    fail_sends: Option<io::ErrorKind>,
    faults: Vec<(u16, io::ErrorKind)>,
}

/// Shared hub. Clones refer to the same network.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail with `kind`; `None` restores delivery.
    pub fn fail_sends(&self, kind: Option<io::ErrorKind>) {
        lock(&self.hub).fail_sends = kind;
    }

    /// Every datagram addressed to `port` so far, delivered or not.
    pub fn captured(&self, port: u16) -> Vec<Captured> {
        lock(&self.hub)
            .captured
            .get(&port)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_bound(&self, port: u16) -> bool {
        lock(&self.hub).bound.contains_key(&port)
    }

    /// Bind failures, in order: the port and the error kind.
    pub fn faults(&self) -> Vec<(u16, io::ErrorKind)> {
        lock(&self.hub).faults.clone()
    }

    /// Hand `datagram` to the socket bound on `port` as if it came from `from`.
    /// Returns whether a handler received it.
    pub fn inject(&self, port: u16, datagram: Bytes, from: SocketAddr) -> bool {
        let slot = lock(&self.hub).bound.get(&port).cloned();
        let handler = slot.and_then(|s| handler_of(&s));
        match handler {
            Some(handler) => {
                handler(datagram, RemoteInfo::from(from));
                true
            }
            None => false,
        }
    }

    fn deliver(
        &self,
        from_port: u16,
        datagram: Bytes,
        port: u16,
        address: IpAddr,
    ) -> io::Result<usize> {
        let slot = {
            let mut hub = lock(&self.hub);
            hub.captured.entry(port).or_default().push(Captured {
                datagram: datagram.clone(),
                address,
                from_port,
            });
            if let Some(kind) = hub.fail_sends {
                return Err(io::Error::new(kind, "injected send failure"));
            }
            hub.bound.get(&port).cloned()
        };

        let len = datagram.len();
        // Handlers run outside the hub lock so they may send in turn.
        if let Some(handler) = slot.and_then(|s| handler_of(&s)) {
            let source = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), from_port);
            handler(datagram, RemoteInfo::from(source));
        }
        Ok(len)
    }
}

impl SocketFactory for MemoryNetwork {
    fn create_socket(&self) -> Box<dyn DatagramSocket> {
        Box::new(MemorySocket {
            network: self.clone(),
            slot: Arc::new(Mutex::new(SocketSlot::default())),
        })
    }
}

/// Socket handed out by [`MemoryNetwork`].
pub struct MemorySocket {
    network: MemoryNetwork,
    slot: Arc<Mutex<SocketSlot>>,
}

impl DatagramSocket for MemorySocket {
    fn bind(&self, port: u16) {
        let mut hub = lock(&self.network.hub);
        if hub.bound.contains_key(&port) {
            tracing::warn!(port, "memory socket bind failed: port in use");
            hub.faults.push((port, io::ErrorKind::AddrInUse));
            return;
        }
        let mut slot = lock(&self.slot);
        if slot.closed {
            hub.faults.push((port, io::ErrorKind::NotConnected));
            return;
        }
        slot.port = Some(port);
        hub.bound.insert(port, self.slot.clone());
    }

    fn send(&self, datagram: Bytes, port: u16, address: IpAddr, done: SendCallback) {
        let (closed, from_port) = {
            let slot = lock(&self.slot);
            (slot.closed, slot.port.unwrap_or(0))
        };
        if closed {
            done(Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "socket is closed",
            )));
            return;
        }
        done(self.network.deliver(from_port, datagram, port, address));
    }

    fn close(&self) {
        let port = {
            let mut slot = lock(&self.slot);
            if slot.closed {
                return;
            }
            slot.closed = true;
            slot.handler = None;
            slot.port.take()
        };
        if let Some(port) = port {
            lock(&self.network.hub).bound.remove(&port);
        }
    }

    fn on_message(&self, handler: MessageHandler) {
        let mut slot = lock(&self.slot);
        if !slot.closed {
            slot.handler = Some(handler);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn recorder(socket: &dyn DatagramSocket) -> mpsc::Receiver<(Bytes, RemoteInfo)> {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        socket.on_message(Arc::new(move |data: Bytes, remote: RemoteInfo| {
            let _ = lock(&tx).send((data, remote));
        }));
        rx
    }

    fn send_sync(
        socket: &dyn DatagramSocket,
        data: &'static [u8],
        port: u16,
    ) -> io::Result<usize> {
        let (tx, rx) = mpsc::channel();
        socket.send(
            Bytes::from_static(data),
            port,
            Ipv4Addr::LOCALHOST.into(),
            Box::new(move |res| {
                let _ = tx.send(res);
            }),
        );
        rx.recv().unwrap()
    }

    #[test]
    fn delivers_to_bound_port() {
        let net = MemoryNetwork::new();
        let a = net.create_socket();
        let b = net.create_socket();
        a.bind(4000);
        b.bind(5000);
        let inbox = recorder(b.as_ref());

        assert_eq!(send_sync(a.as_ref(), b"ping", 5000).unwrap(), 4);

        let (data, remote) = inbox.try_recv().unwrap();
        assert_eq!(&data[..], b"ping");
        assert_eq!(remote.port, 4000);
        assert_eq!(net.captured(5000).len(), 1);
    }

    #[test]
    fn unbound_destination_still_succeeds() {
        let net = MemoryNetwork::new();
        let a = net.create_socket();
        a.bind(4000);
        assert_eq!(send_sync(a.as_ref(), b"lost", 9).unwrap(), 4);
        assert_eq!(net.captured(9)[0].from_port, 4000);
    }

    #[test]
    fn injected_failure_reaches_callback() {
        let net = MemoryNetwork::new();
        let a = net.create_socket();
        a.bind(4000);
        net.fail_sends(Some(io::ErrorKind::ConnectionRefused));
        let err = send_sync(a.as_ref(), b"x", 4000).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn double_bind_is_reported_as_fault() {
        let net = MemoryNetwork::new();
        let a = net.create_socket();
        let b = net.create_socket();
        a.bind(7000);
        b.bind(7000);
        assert_eq!(net.faults(), vec![(7000, io::ErrorKind::AddrInUse)]);
    }

    #[test]
    fn close_is_idempotent_and_frees_port() {
        let net = MemoryNetwork::new();
        let a = net.create_socket();
        a.bind(6000);
        a.close();
        a.close();
        assert!(!net.is_bound(6000));
        let err = send_sync(a.as_ref(), b"x", 6000).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
