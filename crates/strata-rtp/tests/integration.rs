//! # Integration tests: Session over loopback UDP
//!
//! Every test owns a distinct port pair so they can run in parallel.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use strata_rtp::clock::ManualClock;
use strata_rtp::udp::{FaultStage, UdpSocketFactory};
use strata_rtp::{DataPacket, Incoming, RtpError, SenderReport, Session, SessionConfig, SessionState};

const WAIT: Duration = Duration::from_secs(2);

// ─── Helpers ────────────────────────────────────────────────────────────────

fn open(port: u16) -> Session {
    let factory = UdpSocketFactory::try_current().unwrap();
    Session::new(SessionConfig::new(port), &factory).unwrap()
}

async fn next(session: &mut Session) -> Incoming {
    tokio::time::timeout(WAIT, session.recv())
        .await
        .expect("timed out waiting for a packet")
        .expect("session stream ended")
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn loopback_hello_world() {
    let mut session = open(1373);

    session
        .send(Bytes::from_static(b"Hello world"))
        .await
        .unwrap();
    let seq_after = session.sequence_number();

    let incoming = next(&mut session).await;
    assert_eq!(&incoming.packet.payload[..], b"Hello world");
    assert_eq!(incoming.packet.ssrc(), session.ssrc());
    assert_eq!(incoming.packet.sequence_number(), seq_after.wrapping_sub(1));
    assert_eq!(incoming.packet.payload_type(), 95);
    assert_eq!(incoming.remote.port, 1373);
}

#[tokio::test]
async fn burst_arrives_in_sequence() {
    let mut session = open(41000);
    let first = session.sequence_number();

    for i in 0..50u8 {
        session.send(Bytes::from(vec![i; 100])).await.unwrap();
    }

    for i in 0..50u16 {
        let incoming = next(&mut session).await;
        assert_eq!(incoming.packet.sequence_number(), first.wrapping_add(i));
        assert_eq!(incoming.packet.payload[0], i as u8);
    }

    let stats = session.stats();
    assert_eq!(stats.packets_sent, 50);
    assert_eq!(stats.octets_sent, 5000);
    assert_eq!(stats.packets_received, 50);
    assert_eq!(stats.octets_received, 5000);
}

#[tokio::test]
async fn sender_report_is_sent_on_control_port() {
    let factory = UdpSocketFactory::try_current().unwrap();
    let clock = ManualClock::new(Duration::from_secs(1_700_000_000));
    let mut session = Session::with_clock(
        SessionConfig::new(41010).with_initial_sequence(65535),
        &factory,
        Arc::new(clock.clone()),
    )
    .unwrap();

    session.send(Bytes::from_static(b"abc")).await.unwrap();
    assert_eq!(session.sequence_number(), 0);

    let sent = session.send_sr().await.unwrap();
    assert_eq!(sent, SenderReport::ENCODED_LEN);
    assert_eq!(session.packet_count(), 1);
    assert_eq!(session.octet_count(), 3);
    assert_eq!(session.sequence_number(), 0);
}

#[tokio::test]
async fn malformed_datagrams_are_dropped() {
    let mut session = open(41020);
    let peer = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();

    peer.send_to(&[0x80, 95, 0, 1], "127.0.0.1:41020").await.unwrap();
    let good = DataPacket::new(Bytes::from_static(b"valid"), 9, 0xFEED, 1, 95).encode();
    peer.send_to(&good, "127.0.0.1:41020").await.unwrap();

    let incoming = next(&mut session).await;
    assert_eq!(incoming.packet.sequence_number(), 9);
    assert_eq!(incoming.packet.ssrc(), 0xFEED);
    assert_eq!(incoming.remote.socket_addr(), peer.local_addr().unwrap());

    let stats = session.stats();
    assert_eq!(stats.malformed_dropped, 1);
    assert_eq!(stats.packets_received, 1);
}

#[tokio::test]
async fn port_in_use_is_a_fault_not_an_error() {
    let _holder = tokio::net::UdpSocket::bind("0.0.0.0:41030").await.unwrap();
    let factory = UdpSocketFactory::try_current().unwrap();
    let mut faults = factory.subscribe_faults();

    let mut session = Session::new(SessionConfig::new(41030), &factory).unwrap();
    assert_eq!(session.state(), SessionState::Bound);

    let fault = faults.try_recv().unwrap();
    assert_eq!(fault.port, 41030);
    assert_eq!(fault.stage, FaultStage::Bind);
    assert_eq!(fault.kind, io::ErrorKind::AddrInUse);

    // Data socket never bound, so the send fails through the completion.
    match session.send(Bytes::from_static(b"x")).await {
        Err(RtpError::Transport(e)) => assert_eq!(e.kind(), io::ErrorKind::NotConnected),
        other => panic!("expected transport error, got {other:?}"),
    }
    assert_eq!(session.packet_count(), 1);
}

#[tokio::test]
async fn close_ends_the_stream() {
    let mut session = open(41040);
    session.close();
    session.close();

    let end = tokio::time::timeout(WAIT, session.recv()).await.unwrap();
    assert!(end.is_none());
    assert!(matches!(
        session.send(Bytes::from_static(b"late")).await,
        Err(RtpError::Closed)
    ));
    assert_eq!(session.stats().packets_sent, 0);
}
