//! # Session Statistics
//!
//! Send counters live on the session itself; receive counters are updated
//! from the socket's message handler and therefore atomic.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// ─── Snapshot ───────────────────────────────────────────────────────────────

/// Point-in-time view of a session's traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// SSRC of the reporting session.
    pub ssrc: u32,
    /// Data packets sent.
    pub packets_sent: u64,
    /// Payload bytes sent (headers excluded).
    pub octets_sent: u64,
    /// Sender reports sent on the control channel.
    pub sender_reports_sent: u64,
    /// Data packets decoded on the data channel.
    pub packets_received: u64,
    /// Payload bytes received (headers excluded).
    pub octets_received: u64,
    /// Inbound datagrams dropped because they failed to decode.
    pub malformed_dropped: u64,
}

impl SessionStats {
    /// Average payload size of sent packets.
    pub fn mean_payload_sent(&self) -> f64 {
        if self.packets_sent == 0 {
            0.0
        } else {
            self.octets_sent as f64 / self.packets_sent as f64
        }
    }

    /// Fraction of inbound datagrams that were malformed.
    pub fn malformed_ratio(&self) -> f64 {
        let total = self.packets_received + self.malformed_dropped;
        if total == 0 {
            0.0
        } else {
            self.malformed_dropped as f64 / total as f64
        }
    }
}

// ─── Receive Counters ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct ReceiveCounters {
    packets: AtomicU64,
    octets: AtomicU64,
    malformed: AtomicU64,
}

impl ReceiveCounters {
    pub(crate) fn record_packet(&self, payload_len: usize) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.octets.fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the receive side into `stats`.
    pub(crate) fn fill(&self, stats: &mut SessionStats) {
        stats.packets_received = self.packets.load(Ordering::Relaxed);
        stats.octets_received = self.octets.load(Ordering::Relaxed);
        stats.malformed_dropped = self.malformed.load(Ordering::Relaxed);
    }
}
