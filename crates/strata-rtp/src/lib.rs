//! # strata-rtp
//!
//! Minimal RTP session (RFC 3550): 12-byte data packets on one port,
//! sender reports on the next, over any datagram transport.
//!
//! ## Crate structure
//!
//! - [`wire`]: Data packet header and codec
//! - [`report`]: RTCP sender report codec
//! - [`clock`]: Injectable wall clock, RTP and NTP timestamps
//! - [`socket`]: Datagram socket contract and factory trait
//! - [`session`]: Session state, send/receive, completions
//! - [`udp`]: tokio UDP sockets
//! - [`mem`]: In-process socket network for tests
//! - [`config`]: TOML session configuration
//! - [`stats`]: Serializable traffic counters
//! - [`error`]: Error type

pub mod clock;
pub mod config;
pub mod error;
pub mod mem;
pub mod report;
pub mod session;
pub mod socket;
pub mod stats;
pub mod udp;
pub mod wire;

pub use config::SessionConfig;
pub use error::{Result, RtpError};
pub use report::SenderReport;
pub use session::{Incoming, SendCompletion, SendOptions, Session, SessionState};
pub use stats::SessionStats;
pub use wire::DataPacket;
