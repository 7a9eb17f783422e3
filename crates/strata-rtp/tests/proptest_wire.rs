//! Property-based tests for the RTP wire formats and session counters.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use proptest::prelude::*;
use strata_rtp::clock::{ManualClock, NtpTimestamp};
use strata_rtp::mem::MemoryNetwork;
use strata_rtp::wire::{DataPacket, HEADER_LEN};
use strata_rtp::{SenderReport, Session, SessionConfig};

fn payload() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..1500)
}

proptest! {
    #[test]
    fn data_packet_roundtrip(
        seq in any::<u16>(),
        ssrc in any::<u32>(),
        ts in any::<u32>(),
        pt in any::<u8>(),
        body in payload(),
    ) {
        let pkt = DataPacket::new(Bytes::from(body.clone()), seq, ssrc, ts, pt);
        let encoded = pkt.encode();
        prop_assert_eq!(encoded.len(), HEADER_LEN + body.len());

        let decoded = DataPacket::decode(&mut encoded.freeze()).unwrap();
        prop_assert_eq!(decoded.sequence_number(), seq);
        prop_assert_eq!(decoded.ssrc(), ssrc);
        prop_assert_eq!(decoded.timestamp(), ts);
        prop_assert_eq!(decoded.payload_type(), pt & 0x7F);
        prop_assert_eq!(decoded.header.version, 2);
        prop_assert_eq!(&decoded.payload[..], &body[..]);
    }

    #[test]
    fn any_long_enough_buffer_reencodes_identically(
        raw in prop::collection::vec(any::<u8>(), HEADER_LEN..200),
    ) {
        let decoded = DataPacket::decode(&mut &raw[..]).unwrap();
        prop_assert_eq!(&decoded.encode()[..], &raw[..]);
    }

    #[test]
    fn short_buffers_never_decode(raw in prop::collection::vec(any::<u8>(), 0..HEADER_LEN)) {
        let err = DataPacket::decode(&mut &raw[..]).unwrap_err();
        prop_assert!(err.is_malformed());
    }

    #[test]
    fn sender_report_roundtrip(
        packets in any::<u64>(),
        octets in any::<u64>(),
        ssrc in any::<u32>(),
        ts in any::<u32>(),
        ntp in any::<u64>(),
    ) {
        let report = SenderReport::new(packets, octets, ssrc, ts, NtpTimestamp(ntp));
        let bytes = report.to_bytes();
        prop_assert_eq!(bytes.len(), SenderReport::ENCODED_LEN);
        prop_assert_eq!(bytes[1], 200);
        prop_assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 6);

        let decoded = SenderReport::decode(&mut bytes.freeze()).unwrap();
        prop_assert_eq!(decoded.packet_count, packets as u32);
        prop_assert_eq!(decoded.octet_count, octets as u32);
        prop_assert_eq!(decoded, report);
    }

    #[test]
    fn report_decoder_never_panics(raw in prop::collection::vec(any::<u8>(), 0..128)) {
        let _ = SenderReport::decode(&mut &raw[..]);
    }

    #[test]
    fn sequence_advances_once_per_send(
        initial in any::<u16>(),
        sizes in prop::collection::vec(0usize..64, 0..300),
    ) {
        let net = MemoryNetwork::new();
        let clock = ManualClock::new(Duration::from_secs(1_000));
        let mut session = Session::with_clock(
            SessionConfig::new(5000).with_initial_sequence(initial),
            &net,
            Arc::new(clock),
        )
        .unwrap();

        for &size in &sizes {
            let _ = session.send(Bytes::from(vec![0u8; size]));
        }
        let _ = session.send_sr();

        let n = sizes.len();
        prop_assert_eq!(session.sequence_number(), initial.wrapping_add(n as u16));
        prop_assert_eq!(session.packet_count(), n as u64);
        prop_assert_eq!(session.octet_count(), sizes.iter().sum::<usize>() as u64);
        prop_assert_eq!(session.stats().packets_received, n as u64);
    }
}
