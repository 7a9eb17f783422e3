//! # UDP Sockets
//!
//! [`DatagramSocket`] over tokio UDP. Each bound socket runs a reader task
//! that feeds the message handler and a writer task that drains a send
//! queue, both on the factory's runtime handle. Callers never block.
//!
//! Bind and receive failures have no caller to return to, so they are
//! logged and published on the factory's fault channel. A receive error
//! that [`is_recoverable`] rejects stops the reader for good: the socket
//! keeps sending but never delivers again, and the fault is the only
//! signal. Close the session and build a new one to recover.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::socket::{DatagramSocket, MessageHandler, RemoteInfo, SendCallback, SocketFactory};

/// Largest UDP payload.
const MAX_DATAGRAM: usize = 65_535;

const FAULT_CAPACITY: usize = 64;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn not_connected(reason: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, reason)
}

// ─── Faults ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultStage {
    Bind,
    Receive,
}

/// An asynchronous socket failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketFault {
    pub port: u16,
    pub stage: FaultStage,
    pub kind: io::ErrorKind,
    pub message: String,
}

fn report_fault(
    faults: &broadcast::Sender<SocketFault>,
    port: u16,
    stage: FaultStage,
    e: &io::Error,
) {
    tracing::warn!(port, ?stage, error = %e, "UDP socket fault");
    // No subscribers is fine.
    let _ = faults.send(SocketFault {
        port,
        stage,
        kind: e.kind(),
        message: e.to_string(),
    });
}

// ─── Factory ────────────────────────────────────────────────────────────────

/// Hands out [`UdpSocket`]s that share one runtime and one fault channel.
#[derive(Clone)]
pub struct UdpSocketFactory {
    runtime: Handle,
    faults: broadcast::Sender<SocketFault>,
}

impl UdpSocketFactory {
    pub fn new(runtime: Handle) -> Self {
        let (faults, _) = broadcast::channel(FAULT_CAPACITY);
        UdpSocketFactory { runtime, faults }
    }

    /// Factory on the runtime the caller is running in.
    pub fn try_current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }

    /// Faults from every socket this factory created, from now on.
    pub fn subscribe_faults(&self) -> broadcast::Receiver<SocketFault> {
        self.faults.subscribe()
    }

    /// Same as [`SocketFactory::create_socket`], without the box.
    pub fn socket(&self) -> UdpSocket {
        UdpSocket {
            runtime: self.runtime.clone(),
            faults: self.faults.clone(),
            handler: Arc::new(Mutex::new(None)),
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl SocketFactory for UdpSocketFactory {
    fn create_socket(&self) -> Box<dyn DatagramSocket> {
        Box::new(self.socket())
    }
}

// ─── Socket ─────────────────────────────────────────────────────────────────

struct Outbound {
    datagram: Bytes,
    target: SocketAddr,
    done: SendCallback,
}

#[derive(Default)]
struct Inner {
    local_addr: Option<SocketAddr>,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    reader: Option<JoinHandle<()>>,
    closed: bool,
}

type SharedHandler = Arc<Mutex<Option<MessageHandler>>>;

pub struct UdpSocket {
    runtime: Handle,
    faults: broadcast::Sender<SocketFault>,
    handler: SharedHandler,
    inner: Mutex<Inner>,
}

impl UdpSocket {
    /// Address actually bound, once bind succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.inner).local_addr
    }

    fn open(&self, port: u16) -> io::Result<tokio::net::UdpSocket> {
        let socket = std::net::UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))?;
        socket.set_nonblocking(true)?;
        let _guard = self.runtime.enter();
        tokio::net::UdpSocket::from_std(socket)
    }
}

impl DatagramSocket for UdpSocket {
    fn bind(&self, port: u16) {
        let mut inner = lock(&self.inner);
        if inner.closed {
            report_fault(
                &self.faults,
                port,
                FaultStage::Bind,
                &not_connected("socket is closed"),
            );
            return;
        }
        if inner.outbound.is_some() {
            report_fault(
                &self.faults,
                port,
                FaultStage::Bind,
                &io::Error::new(io::ErrorKind::AlreadyExists, "socket is already bound"),
            );
            return;
        }

        let socket = match self.open(port) {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                report_fault(&self.faults, port, FaultStage::Bind, &e);
                return;
            }
        };
        let local_addr = socket.local_addr().ok();
        let (tx, rx) = mpsc::unbounded_channel();

        inner.reader = Some(self.runtime.spawn(read_loop(
            port,
            socket.clone(),
            self.handler.clone(),
            self.faults.clone(),
        )));
        // The writer exits once the queue is dropped and drained.
        self.runtime.spawn(write_loop(socket, rx));
        inner.outbound = Some(tx);
        inner.local_addr = local_addr;

        tracing::debug!(port, ?local_addr, "UDP socket bound");
    }

    fn send(&self, datagram: Bytes, port: u16, address: IpAddr, done: SendCallback) {
        let (closed, outbound) = {
            let inner = lock(&self.inner);
            (inner.closed, inner.outbound.clone())
        };
        if closed {
            done(Err(not_connected("socket is closed")));
            return;
        }
        let Some(outbound) = outbound else {
            done(Err(not_connected("socket is not bound")));
            return;
        };

        let job = Outbound {
            datagram,
            target: SocketAddr::new(address, port),
            done,
        };
        if let Err(mpsc::error::SendError(job)) = outbound.send(job) {
            (job.done)(Err(not_connected("socket writer stopped")));
        }
    }

    fn close(&self) {
        let reader = {
            let mut inner = lock(&self.inner);
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.outbound = None;
            inner.reader.take()
        };
        if let Some(reader) = reader {
            reader.abort();
        }
        lock(&self.handler).take();
    }

    fn on_message(&self, handler: MessageHandler) {
        if lock(&self.inner).closed {
            return;
        }
        *lock(&self.handler) = Some(handler);
    }
}

impl Drop for UdpSocket {
    fn drop(&mut self) {
        self.close();
    }
}

/// Receive errors the reader survives. ICMP errors from earlier sends
/// surface on the next `recv_from` as reset or refused.
pub fn is_recoverable(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

async fn read_loop(
    port: u16,
    socket: Arc<tokio::net::UdpSocket>,
    handler: SharedHandler,
    faults: broadcast::Sender<SocketFault>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((n, from)) => {
                let current = lock(&handler).clone();
                if let Some(handler) = current {
                    handler(Bytes::copy_from_slice(&buf[..n]), RemoteInfo::from(from));
                }
            }
            Err(e) => {
                report_fault(&faults, port, FaultStage::Receive, &e);
                if !is_recoverable(e.kind()) {
                    tracing::error!(port, error = %e, "UDP reader stopped");
                    break;
                }
            }
        }
    }
}

async fn write_loop(socket: Arc<tokio::net::UdpSocket>, mut queue: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(job) = queue.recv().await {
        let result = socket.send_to(&job.datagram, job.target).await;
        if let Err(e) = &result {
            tracing::debug!(target_addr = %job.target, error = %e, "UDP send failed");
        }
        (job.done)(result);
    }
}
