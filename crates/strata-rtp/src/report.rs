//! # RTCP Sender Report
//!
//! RFC 3550 §6.4.1, without reception report blocks (this session never
//! tracks remote sources).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|   RC    |   PT=SR=200   |             length            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         SSRC of sender                        |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! |              NTP timestamp, most significant word             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |             NTP timestamp, least significant word             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         RTP timestamp                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     sender's packet count                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      sender's octet count                     |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! ```
//!
//! `length` counts 32-bit words minus one, so a compound datagram can be
//! walked packet by packet.

use bytes::{Buf, BufMut, BytesMut};

use crate::clock::NtpTimestamp;
use crate::error::{Result, RtpError};
use crate::wire::RTP_VERSION;

// ─── Constants ───────────────────────────────────────────────────────────────

/// RTCP packet type for sender reports.
pub const PT_SENDER_REPORT: u8 = 200;

/// Version, padding, count, type, length.
pub const CONTROL_HEADER_LEN: usize = 4;

/// SSRC + NTP (8) + RTP ts + packet count + octet count.
pub const SENDER_BODY_LEN: usize = 24;

/// One reception report block; only skipped when decoding.
pub const REPORT_BLOCK_LEN: usize = 24;

// ─── Common Header ──────────────────────────────────────────────────────────

/// First word of every RTCP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlHeader {
    pub version: u8,
    pub padding: bool,
    /// Report count (5 bits).
    pub count: u8,
    pub packet_type: u8,
    /// Packet length in 32-bit words, minus one.
    pub length: u16,
}

impl ControlHeader {
    pub fn encode(&self, buf: &mut impl BufMut) {
        let b0: u8 =
            ((self.version & 0x03) << 6) | ((self.padding as u8) << 5) | (self.count & 0x1F);
        buf.put_u8(b0);
        buf.put_u8(self.packet_type);
        buf.put_u16(self.length);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < CONTROL_HEADER_LEN {
            return Err(RtpError::MalformedPacket {
                len: buf.remaining(),
                needed: CONTROL_HEADER_LEN,
            });
        }
        let b0 = buf.get_u8();
        Ok(ControlHeader {
            version: b0 >> 6,
            padding: (b0 >> 5) & 1 == 1,
            count: b0 & 0x1F,
            packet_type: buf.get_u8(),
            length: buf.get_u16(),
        })
    }

    /// Total packet size in bytes, header included.
    pub fn packet_len(&self) -> usize {
        (self.length as usize + 1) * 4
    }
}

// ─── Sender Report ──────────────────────────────────────────────────────────

/// Sender status snapshot sent on the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderReport {
    pub ssrc: u32,
    /// Sender wall clock at report time.
    pub ntp_timestamp: NtpTimestamp,
    /// Same relative timeline as data packet timestamps.
    pub rtp_timestamp: u32,
    pub packet_count: u32,
    pub octet_count: u32,
}

impl SenderReport {
    pub const ENCODED_LEN: usize = CONTROL_HEADER_LEN + SENDER_BODY_LEN; // 28

    /// Build a report from session counters. Counts wrap at 2^32 on the wire.
    pub fn new(
        packet_count: u64,
        octet_count: u64,
        ssrc: u32,
        rtp_timestamp: u32,
        ntp_timestamp: NtpTimestamp,
    ) -> Self {
        SenderReport {
            ssrc,
            ntp_timestamp,
            rtp_timestamp,
            packet_count: packet_count as u32,
            octet_count: octet_count as u32,
        }
    }

    pub fn header(&self) -> ControlHeader {
        ControlHeader {
            version: RTP_VERSION,
            padding: false,
            count: 0,
            packet_type: PT_SENDER_REPORT,
            length: (Self::ENCODED_LEN / 4 - 1) as u16,
        }
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        self.header().encode(buf);
        buf.put_u32(self.ssrc);
        buf.put_u32(self.ntp_timestamp.msw());
        buf.put_u32(self.ntp_timestamp.lsw());
        buf.put_u32(self.rtp_timestamp);
        buf.put_u32(self.packet_count);
        buf.put_u32(self.octet_count);
    }

    /// Serialize into a new buffer.
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(Self::ENCODED_LEN);
        self.encode(&mut buf);
        buf
    }

    /// Decode one sender report, consuming exactly `length` words.
    ///
    /// Reception report blocks and profile extensions are skipped.
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        let header = ControlHeader::decode(buf)?;
        if header.version != RTP_VERSION {
            return Err(RtpError::MalformedReport("unsupported version"));
        }
        if header.packet_type != PT_SENDER_REPORT {
            return Err(RtpError::MalformedReport("not a sender report"));
        }

        let body_len = header.packet_len() - CONTROL_HEADER_LEN;
        if buf.remaining() < body_len {
            return Err(RtpError::MalformedReport("length field exceeds buffer"));
        }
        if body_len < SENDER_BODY_LEN + header.count as usize * REPORT_BLOCK_LEN {
            return Err(RtpError::MalformedReport("length field too small"));
        }

        let ssrc = buf.get_u32();
        let msw = buf.get_u32();
        let lsw = buf.get_u32();
        let report = SenderReport {
            ssrc,
            ntp_timestamp: NtpTimestamp::from_parts(msw, lsw),
            rtp_timestamp: buf.get_u32(),
            packet_count: buf.get_u32(),
            octet_count: buf.get_u32(),
        };
        buf.advance(body_len - SENDER_BODY_LEN);

        Ok(report)
    }
}
