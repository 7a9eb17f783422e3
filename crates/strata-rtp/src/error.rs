//! # Error Taxonomy
//!
//! Decode failures surface synchronously from the codecs. Transport failures
//! only ever surface through a [`crate::session::SendCompletion`].

use std::io;

use thiserror::Error;

/// Errors produced by the codecs and the session.
#[derive(Debug, Error)]
pub enum RtpError {
    /// Buffer too short to hold a data packet header.
    #[error("malformed packet: {len} bytes, need at least {needed}")]
    MalformedPacket { len: usize, needed: usize },

    /// Control packet failed structural validation.
    #[error("malformed sender report: {0}")]
    MalformedReport(&'static str),

    /// Socket send failure, propagated verbatim.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The session or socket was closed before the send completed.
    #[error("session closed")]
    Closed,

    /// Rejected at construction time.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl RtpError {
    /// Whether this error came from decoding bytes off the wire.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            RtpError::MalformedPacket { .. } | RtpError::MalformedReport(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RtpError>;
