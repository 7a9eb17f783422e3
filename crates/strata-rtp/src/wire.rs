//! # RTP Wire Format
//!
//! RFC 3550 §5.1 fixed header, no CSRC list, no header extension parsing.
//!
//! ## Data Packet Header (12 bytes)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       sequence number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           synchronization source (SSRC) identifier            |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! |                           payload ...                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Field widths are enforced by masking, never by rejecting: a payload type
//! above 127 loses its top bit, a CSRC count above 15 keeps its low nibble.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, RtpError};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Protocol version carried in every packet.
pub const RTP_VERSION: u8 = 2;

/// Fixed header size: flags (1) + marker/PT (1) + seq (2) + ts (4) + ssrc (4).
pub const HEADER_LEN: usize = 12;

/// Dynamic payload type used when none is configured.
pub const DEFAULT_PAYLOAD_TYPE: u8 = 95;

/// Payload type occupies the low 7 bits of byte 1.
pub const PAYLOAD_TYPE_MASK: u8 = 0x7F;

// ─── Header ──────────────────────────────────────────────────────────────────

/// Decoded fixed header.
///
/// Flag fields are kept as read so that a decoded packet re-encodes to the
/// same bytes, even when a peer sets bits this crate never emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    /// Protocol version (2 bits).
    pub version: u8,
    /// Padding flag. Never set on outgoing packets.
    pub padding: bool,
    /// Header extension flag. Never set on outgoing packets.
    pub extension: bool,
    /// Contributing source count (4 bits). Always 0 on outgoing packets.
    pub csrc_count: u8,
    /// Marker bit, profile defined (e.g. end of frame).
    pub marker: bool,
    /// Payload format identifier (7 bits).
    pub payload_type: u8,
    /// Per-packet counter, wraps at 65536.
    pub sequence_number: u16,
    /// Media timestamp.
    pub timestamp: u32,
    /// Synchronization source identifier.
    pub ssrc: u32,
}

impl DataHeader {
    /// Header for an outgoing packet: version 2, no flags, no CSRCs.
    pub fn new(sequence_number: u16, timestamp: u32, ssrc: u32, payload_type: u8) -> Self {
        DataHeader {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            csrc_count: 0,
            marker: false,
            payload_type: payload_type & PAYLOAD_TYPE_MASK,
            sequence_number,
            timestamp,
            ssrc,
        }
    }

    /// Set the marker bit.
    pub fn with_marker(mut self) -> Self {
        self.marker = true;
        self
    }

    /// Encode the 12 header bytes.
    pub fn encode(&self, buf: &mut impl BufMut) {
        // V V P X C C C C
        let b0: u8 = ((self.version & 0x03) << 6)
            | ((self.padding as u8) << 5)
            | ((self.extension as u8) << 4)
            | (self.csrc_count & 0x0F);
        // M P P P P P P P
        let b1: u8 = ((self.marker as u8) << 7) | (self.payload_type & PAYLOAD_TYPE_MASK);

        buf.put_u8(b0);
        buf.put_u8(b1);
        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
    }

    /// Decode the fixed header. Only the length is validated.
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < HEADER_LEN {
            return Err(RtpError::MalformedPacket {
                len: buf.remaining(),
                needed: HEADER_LEN,
            });
        }

        let b0 = buf.get_u8();
        let b1 = buf.get_u8();

        Ok(DataHeader {
            version: b0 >> 6,
            padding: (b0 >> 5) & 1 == 1,
            extension: (b0 >> 4) & 1 == 1,
            csrc_count: b0 & 0x0F,
            marker: b1 >> 7 == 1,
            payload_type: b1 & PAYLOAD_TYPE_MASK,
            sequence_number: buf.get_u16(),
            timestamp: buf.get_u32(),
            ssrc: buf.get_u32(),
        })
    }
}

// ─── Full Packet ─────────────────────────────────────────────────────────────

/// A data packet: fixed header plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub header: DataHeader,
    pub payload: Bytes,
}

impl DataPacket {
    /// Build an outgoing packet.
    pub fn new(
        payload: Bytes,
        sequence_number: u16,
        ssrc: u32,
        timestamp: u32,
        payload_type: u8,
    ) -> Self {
        DataPacket {
            header: DataHeader::new(sequence_number, timestamp, ssrc, payload_type),
            payload,
        }
    }

    /// Set the marker bit on the header.
    pub fn with_marker(mut self) -> Self {
        self.header = self.header.with_marker();
        self
    }

    /// Serialize header and payload into a new buffer.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.header.encode(&mut buf);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode a packet. Everything after the header is payload; an empty
    /// payload is valid.
    pub fn decode(data: &mut impl Buf) -> Result<Self> {
        let header = DataHeader::decode(data)?;
        let payload = data.copy_to_bytes(data.remaining());
        Ok(DataPacket { header, payload })
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    pub fn sequence_number(&self) -> u16 {
        self.header.sequence_number
    }

    pub fn ssrc(&self) -> u32 {
        self.header.ssrc
    }

    pub fn timestamp(&self) -> u32 {
        self.header.timestamp
    }

    pub fn payload_type(&self) -> u8 {
        self.header.payload_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn proptest_packet_roundtrip_masks_fields(
            seq in any::<u32>(),
            ssrc in any::<u64>(),
            ts in any::<u64>(),
            pt in any::<u8>(),
            payload in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            // Wider counters are truncated the way the session truncates them.
            let pkt = DataPacket::new(
                Bytes::from(payload.clone()),
                seq as u16,
                ssrc as u32,
                ts as u32,
                pt,
            );
            let decoded = DataPacket::decode(&mut pkt.encode().freeze()).unwrap();

            prop_assert_eq!(decoded.sequence_number() as u32, seq % 65536);
            prop_assert_eq!(decoded.ssrc() as u64, ssrc % (1 << 32));
            prop_assert_eq!(decoded.timestamp() as u64, ts % (1 << 32));
            prop_assert_eq!(decoded.payload_type(), pt & 0x7F);
            prop_assert_eq!(&decoded.payload[..], &payload[..]);
        }

        #[test]
        fn proptest_short_buffers_rejected(data in proptest::collection::vec(any::<u8>(), 0..HEADER_LEN)) {
            let err = DataPacket::decode(&mut &data[..]).unwrap_err();
            let is_short = matches!(err, RtpError::MalformedPacket { len, needed: HEADER_LEN } if len == data.len());
            prop_assert!(is_short);
        }
    }

    #[test]
    fn header_layout_is_byte_exact() {
        let pkt = DataPacket::new(
            Bytes::from_static(b"abc"),
            0x1234,
            0xDEAD_BEEF,
            0x0102_0304,
            DEFAULT_PAYLOAD_TYPE,
        );
        let bytes = pkt.encode();
        assert_eq!(
            &bytes[..],
            &[
                0x80, // V=2, P=0, X=0, CC=0
                0x5F, // M=0, PT=95
                0x12, 0x34, // seq
                0x01, 0x02, 0x03, 0x04, // timestamp
                0xDE, 0xAD, 0xBE, 0xEF, // ssrc
                b'a', b'b', b'c',
            ][..]
        );
        assert_eq!(pkt.encoded_len(), 15);
    }

    #[test]
    fn marker_sets_top_bit_of_second_byte() {
        let pkt = DataPacket::new(Bytes::new(), 0, 0, 0, 96).with_marker();
        let bytes = pkt.encode();
        assert_eq!(bytes[1], 0x80 | 96);
        let decoded = DataPacket::decode(&mut bytes.freeze()).unwrap();
        assert!(decoded.header.marker);
        assert_eq!(decoded.payload_type(), 96);
    }

    #[test]
    fn payload_type_is_masked_to_seven_bits() {
        let pkt = DataPacket::new(Bytes::new(), 0, 0, 0, 0xFF);
        assert_eq!(pkt.payload_type(), 0x7F);
        assert_eq!(pkt.encode()[1], 0x7F);
    }

    #[test]
    fn header_only_packet_has_empty_payload() {
        let raw = [0x80u8, 0x5F, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3];
        let pkt = DataPacket::decode(&mut &raw[..]).unwrap();
        assert!(pkt.payload.is_empty());
        assert_eq!(pkt.sequence_number(), 1);
        assert_eq!(pkt.timestamp(), 2);
        assert_eq!(pkt.ssrc(), 3);
    }

    #[test]
    fn eleven_bytes_is_malformed() {
        let raw = [0u8; 11];
        match DataPacket::decode(&mut &raw[..]) {
            Err(RtpError::MalformedPacket { len, needed }) => {
                assert_eq!(len, 11);
                assert_eq!(needed, HEADER_LEN);
            }
            other => panic!("expected MalformedPacket, got {other:?}"),
        }
    }

    #[test]
    fn nonstandard_flags_are_preserved() {
        // V=1, P=1, X=1, CC=5, M=1, PT=0
        let raw = [0x75u8, 0x80, 0, 7, 0, 0, 0, 0, 0, 0, 0, 9, 0xAA];
        let pkt = DataPacket::decode(&mut &raw[..]).unwrap();
        assert_eq!(pkt.header.version, 1);
        assert!(pkt.header.padding);
        assert!(pkt.header.extension);
        assert_eq!(pkt.header.csrc_count, 5);
        assert!(pkt.header.marker);
        // No CSRC list parsing: the payload starts right after byte 11.
        assert_eq!(&pkt.payload[..], &[0xAA]);
        assert_eq!(&pkt.encode()[..], &raw[..]);
    }
}
