use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::error::RtpError;
use crate::wire::{DEFAULT_PAYLOAD_TYPE, PAYLOAD_TYPE_MASK};

/// RFC 3551 default RTP port.
pub const DEFAULT_PORT: u16 = 5004;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfigInput {
    pub port: Option<u16>,
    pub payload_type: Option<u8>,
    pub default_address: Option<String>,
    pub initial_sequence: Option<u16>,
    pub ssrc: Option<u32>,
    pub seed: Option<u64>,
}

/// Validated session parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Data port; the control channel uses `port + 1`.
    pub port: u16,
    pub payload_type: u8,
    /// Destination used when a send names no address.
    pub default_address: IpAddr,
    /// Fixed first sequence number instead of a random one.
    pub initial_sequence: Option<u16>,
    /// Fixed SSRC instead of a random one.
    pub ssrc: Option<u32>,
    /// Seed for the session's identifier RNG.
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PORT)
    }
}

impl SessionConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            payload_type: DEFAULT_PAYLOAD_TYPE,
            default_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            initial_sequence: None,
            ssrc: None,
            seed: None,
        }
    }

    /// Payload types wider than 7 bits lose their top bit.
    pub fn with_payload_type(mut self, payload_type: u8) -> Self {
        self.payload_type = payload_type & PAYLOAD_TYPE_MASK;
        self
    }

    pub fn with_initial_sequence(mut self, seq: u16) -> Self {
        self.initial_sequence = Some(seq);
        self
    }

    pub fn with_ssrc(mut self, ssrc: u32) -> Self {
        self.ssrc = Some(ssrc);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Port of the control channel.
    pub fn control_port(&self) -> u16 {
        self.port.wrapping_add(1)
    }

    pub fn validate(&self) -> Result<(), RtpError> {
        if self.port == u16::MAX {
            return Err(RtpError::InvalidConfig(format!(
                "port {} leaves no room for the control port",
                self.port
            )));
        }
        Ok(())
    }

    pub fn from_toml_str(input: &str) -> Result<Self, RtpError> {
        if input.trim().is_empty() {
            return Ok(SessionConfig::default());
        }
        let parsed: SessionConfigInput = toml::from_str(input)
            .map_err(|e| RtpError::InvalidConfig(format!("invalid config TOML: {e}")))?;
        parsed.resolve()
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

impl SessionConfigInput {
    pub fn resolve(self) -> Result<SessionConfig, RtpError> {
        let mut cfg = SessionConfig::new(self.port.unwrap_or(DEFAULT_PORT));
        if let Some(pt) = self.payload_type {
            cfg = cfg.with_payload_type(pt);
        }
        if let Some(addr) = self.default_address {
            let trimmed = addr.trim();
            if !trimmed.is_empty() {
                cfg.default_address = trimmed.parse().map_err(|_| {
                    RtpError::InvalidConfig(format!("invalid default_address {trimmed:?}"))
                })?;
            }
        }
        cfg.initial_sequence = self.initial_sequence;
        cfg.ssrc = self.ssrc;
        cfg.seed = self.seed;
        cfg.validate()?;
        Ok(cfg)
    }
}
