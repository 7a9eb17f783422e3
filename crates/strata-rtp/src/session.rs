//! # Session Management
//!
//! An RTP session owns two sockets from a [`SocketFactory`]: the data
//! channel on `port` and the control channel on `port + 1`. The lifecycle is:
//!
//! ```text
//!   Constructed ──bind──▶ Bound ──close──▶ Closed
//! ```
//!
//! Sends update the counters synchronously and hand back a
//! [`SendCompletion`] that resolves once the socket reports the outcome.
//! Inbound data packets are decoded on the socket's handler and queued for
//! [`Session::recv`].

use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{RngExt as _, SeedableRng};
use tokio::sync::{mpsc, oneshot};

use crate::clock::{Clock, NtpTimestamp, SystemClock, TimeOrigin};
use crate::config::SessionConfig;
use crate::error::{Result, RtpError};
use crate::report::SenderReport;
use crate::socket::{DatagramSocket, MessageHandler, RemoteInfo, SendCallback, SocketFactory};
use crate::stats::{ReceiveCounters, SessionStats};
use crate::wire::DataPacket;

// ─── Session State ──────────────────────────────────────────────────────────

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Sockets created, not yet bound.
    Constructed,
    /// Both channels bound (bind outcome is reported by the socket).
    Bound,
    /// Both channels closed.
    Closed,
}

// ─── Send Options ───────────────────────────────────────────────────────────

/// Per-send overrides. Defaults target the configured address with the
/// seconds elapsed since the session started.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    pub address: Option<IpAddr>,
    pub timestamp: Option<u32>,
    /// Sets the marker bit; ignored for sender reports.
    pub marker: bool,
}

impl SendOptions {
    pub fn to(address: IpAddr) -> Self {
        SendOptions {
            address: Some(address),
            ..Default::default()
        }
    }

    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_marker(mut self) -> Self {
        self.marker = true;
        self
    }
}

/// A decoded inbound data packet and its sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub packet: DataPacket,
    pub remote: RemoteInfo,
}

// ─── Send Completion ────────────────────────────────────────────────────────

enum Completion {
    Pending(oneshot::Receiver<io::Result<usize>>),
    Ready(Option<Result<usize>>),
}

/// Resolves to the number of bytes the socket sent.
///
/// Dropping it does not cancel the send.
#[must_use = "a send failure is only observable by awaiting the completion"]
pub struct SendCompletion {
    inner: Completion,
}

impl SendCompletion {
    fn pending() -> (SendCallback, SendCompletion) {
        let (tx, rx) = oneshot::channel();
        let done: SendCallback = Box::new(move |res| {
            let _ = tx.send(res);
        });
        (
            done,
            SendCompletion {
                inner: Completion::Pending(rx),
            },
        )
    }

    fn ready(result: Result<usize>) -> SendCompletion {
        SendCompletion {
            inner: Completion::Ready(Some(result)),
        }
    }
}

impl Future for SendCompletion {
    type Output = Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            Completion::Pending(rx) => Pin::new(rx).poll(cx).map(|res| match res {
                Ok(Ok(n)) => Ok(n),
                Ok(Err(e)) => Err(RtpError::Transport(e)),
                // Socket dropped the callback without answering.
                Err(_) => Err(RtpError::Closed),
            }),
            Completion::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(RtpError::Closed)))
            }
        }
    }
}

// ─── Session ────────────────────────────────────────────────────────────────

/// An RTP sender/receiver bound to a data and a control port.
pub struct Session {
    config: SessionConfig,
    state: SessionState,
    ssrc: u32,
    sequence_number: u16,
    packet_count: u64,
    octet_count: u64,
    sender_reports_sent: u64,
    time_origin: TimeOrigin,
    clock: Arc<dyn Clock>,
    data: Box<dyn DatagramSocket>,
    control: Box<dyn DatagramSocket>,
    incoming: mpsc::UnboundedReceiver<Incoming>,
    received: Arc<ReceiveCounters>,
}

impl Session {
    /// Create a session on the system clock.
    pub fn new(config: SessionConfig, factory: &dyn SocketFactory) -> Result<Self> {
        Self::with_clock(config, factory, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: SessionConfig,
        factory: &dyn SocketFactory,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::rng().random::<u64>()),
        };
        let ssrc = config.ssrc.unwrap_or_else(|| rng.random::<u32>());
        let sequence_number = config
            .initial_sequence
            .unwrap_or_else(|| rng.random::<u16>());

        let (tx, incoming) = mpsc::unbounded_channel();
        let received = Arc::new(ReceiveCounters::default());

        let data = factory.create_socket();
        let control = factory.create_socket();

        let mut session = Session {
            time_origin: TimeOrigin::capture(clock.as_ref()),
            config,
            state: SessionState::Constructed,
            ssrc,
            sequence_number,
            packet_count: 0,
            octet_count: 0,
            sender_reports_sent: 0,
            clock,
            data,
            control,
            incoming,
            received: received.clone(),
        };

        // Handler goes in before bind so nothing that arrives is missed.
        let port = session.config.port;
        session
            .data
            .on_message(receive_handler(port, tx, received));
        session.data.bind(port);
        session.control.bind(session.config.control_port());
        session.state = SessionState::Bound;

        tracing::info!(
            port,
            control_port = session.config.control_port(),
            ssrc,
            seq = sequence_number,
            "RTP session bound"
        );
        Ok(session)
    }

    /// Send `payload` to the default address.
    pub fn send(&mut self, payload: impl Into<Bytes>) -> SendCompletion {
        self.send_with(payload, SendOptions::default())
    }

    pub fn send_with(&mut self, payload: impl Into<Bytes>, opts: SendOptions) -> SendCompletion {
        if self.state == SessionState::Closed {
            return SendCompletion::ready(Err(RtpError::Closed));
        }

        let timestamp = self.timestamp_for(&opts);
        let mut packet = DataPacket::new(
            payload.into(),
            self.sequence_number,
            self.ssrc,
            timestamp,
            self.config.payload_type,
        );
        if opts.marker {
            packet = packet.with_marker();
        }
        let datagram = packet.encode().freeze();

        self.sequence_number = self.sequence_number.wrapping_add(1);
        self.packet_count += 1;
        self.octet_count += packet.payload.len() as u64;

        let address = opts.address.unwrap_or(self.config.default_address);
        tracing::trace!(
            seq = packet.sequence_number(),
            timestamp,
            len = packet.payload.len(),
            %address,
            "sending data packet"
        );

        let (done, completion) = SendCompletion::pending();
        self.data.send(datagram, self.config.port, address, done);
        completion
    }

    /// Send a sender report on the control channel. Packet and octet
    /// counts are reported, not advanced.
    pub fn send_sr(&mut self) -> SendCompletion {
        self.send_sr_with(SendOptions::default())
    }

    pub fn send_sr_with(&mut self, opts: SendOptions) -> SendCompletion {
        if self.state == SessionState::Closed {
            return SendCompletion::ready(Err(RtpError::Closed));
        }

        let report = SenderReport::new(
            self.packet_count,
            self.octet_count,
            self.ssrc,
            self.timestamp_for(&opts),
            NtpTimestamp::now(self.clock.as_ref()),
        );
        self.sender_reports_sent += 1;

        let address = opts.address.unwrap_or(self.config.default_address);
        tracing::debug!(
            ssrc = self.ssrc,
            packets = report.packet_count,
            octets = report.octet_count,
            wall_clock = ?report.ntp_timestamp.to_unix(),
            %address,
            "sending sender report"
        );

        let (done, completion) = SendCompletion::pending();
        self.control.send(
            report.to_bytes().freeze(),
            self.config.control_port(),
            address,
            done,
        );
        completion
    }

    /// Close both channels. Further calls do nothing.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.data.close();
        self.control.close();
        self.state = SessionState::Closed;
        tracing::info!(
            port = self.config.port,
            ssrc = self.ssrc,
            packets = self.packet_count,
            "RTP session closed"
        );
    }

    /// Next inbound packet. `None` once the session is closed and drained.
    pub async fn recv(&mut self) -> Option<Incoming> {
        self.incoming.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Incoming> {
        self.incoming.try_recv().ok()
    }

    pub fn stats(&self) -> SessionStats {
        let mut stats = SessionStats {
            ssrc: self.ssrc,
            packets_sent: self.packet_count,
            octets_sent: self.octet_count,
            sender_reports_sent: self.sender_reports_sent,
            ..Default::default()
        };
        self.received.fill(&mut stats);
        stats
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Sequence number the next data packet will carry.
    pub fn sequence_number(&self) -> u16 {
        self.sequence_number
    }

    pub fn packet_count(&self) -> u64 {
        self.packet_count
    }

    pub fn octet_count(&self) -> u64 {
        self.octet_count
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn time_origin(&self) -> TimeOrigin {
        self.time_origin
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn timestamp_for(&self, opts: &SendOptions) -> u32 {
        opts.timestamp
            .unwrap_or_else(|| self.time_origin.elapsed(self.clock.as_ref()))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn receive_handler(
    port: u16,
    tx: mpsc::UnboundedSender<Incoming>,
    counters: Arc<ReceiveCounters>,
) -> MessageHandler {
    Arc::new(move |mut datagram: Bytes, remote: RemoteInfo| {
        let len = datagram.len();
        match DataPacket::decode(&mut datagram) {
            Ok(packet) => {
                counters.record_packet(packet.payload.len());
                let _ = tx.send(Incoming { packet, remote });
            }
            Err(e) => {
                counters.record_malformed();
                tracing::warn!(port, len, from = %remote.socket_addr(), error = %e, "dropping malformed datagram");
            }
        }
    })
}
