//! # Clocks
//!
//! Wall-clock source injected into the session so timestamps are
//! deterministic under test, plus the two timestamp encodings RTP uses:
//! relative media seconds and 64-bit NTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch.
pub const NTP_UNIX_OFFSET_SECS: u64 = 2_208_988_800;

// ─── Clock ──────────────────────────────────────────────────────────────────

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Time elapsed since the Unix epoch.
    fn now(&self) -> Duration;

    /// Whole seconds since the Unix epoch.
    fn now_secs(&self) -> u64 {
        self.now().as_secs()
    }
}

/// The operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        // A clock set before 1970 reads as the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }
}

/// Hand-driven clock for tests. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Duration) -> Self {
        let clock = ManualClock::default();
        clock.set(start);
        clock
    }

    pub fn set(&self, now: Duration) {
        self.nanos.store(now.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }
}

// ─── TimeOrigin ─────────────────────────────────────────────────────────────

/// Second-resolution instant captured at session construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOrigin {
    secs: u64,
}

impl TimeOrigin {
    pub fn capture(clock: &dyn Clock) -> Self {
        TimeOrigin {
            secs: clock.now_secs(),
        }
    }

    pub fn secs(&self) -> u64 {
        self.secs
    }

    /// Whole seconds elapsed since the origin, as a 32-bit RTP timestamp.
    pub fn elapsed(&self, clock: &dyn Clock) -> u32 {
        // Wraps with the 32-bit timestamp field.
        (clock.now_secs().saturating_sub(self.secs) & 0xFFFF_FFFF) as u32
    }
}

// ─── NTP ────────────────────────────────────────────────────────────────────

/// 64-bit NTP timestamp: 32.32 fixed-point seconds since 1900.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NtpTimestamp(pub u64);

impl NtpTimestamp {
    pub fn from_unix(since_epoch: Duration) -> Self {
        let secs = since_epoch.as_secs().wrapping_add(NTP_UNIX_OFFSET_SECS) & 0xFFFF_FFFF;
        let frac = ((since_epoch.subsec_nanos() as u64) << 32) / 1_000_000_000;
        NtpTimestamp((secs << 32) | frac)
    }

    pub fn now(clock: &dyn Clock) -> Self {
        Self::from_unix(clock.now())
    }

    /// Integer seconds part.
    pub fn msw(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Fractional part, in units of 2^-32 s.
    pub fn lsw(self) -> u32 {
        self.0 as u32
    }

    pub fn from_parts(msw: u32, lsw: u32) -> Self {
        NtpTimestamp(((msw as u64) << 32) | lsw as u64)
    }

    /// Back to Unix time. Only valid for NTP era 0 (until 2036).
    pub fn to_unix(self) -> Duration {
        let secs = (self.msw() as u64).saturating_sub(NTP_UNIX_OFFSET_SECS);
        let nanos = ((self.lsw() as u64) * 1_000_000_000) >> 32;
        Duration::new(secs, nanos as u32)
    }
}
