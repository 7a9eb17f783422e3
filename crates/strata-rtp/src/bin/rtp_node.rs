//! RTP test node.
//!
//! Streams a payload at a fixed interval with periodic sender reports,
//! logs whatever arrives on the data port, and prints final stats as JSON.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use strata_rtp::udp::UdpSocketFactory;
use strata_rtp::{Incoming, SendOptions, Session, SessionConfig};
use tracing_subscriber::EnvFilter;

/// Send RTP packets and sender reports over UDP.
#[derive(Parser, Debug)]
#[command(name = "rtp-node", about = "Strata RTP test node")]
struct Cli {
    /// TOML session config.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data port (control uses port + 1). Overrides the config.
    #[arg(long)]
    port: Option<u16>,

    /// Destination address. Overrides the config.
    #[arg(long)]
    dest: Option<IpAddr>,

    /// Number of data packets to send.
    #[arg(long, default_value_t = 10)]
    count: u64,

    /// Delay between packets.
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,

    /// Send a sender report after every N packets (0 disables).
    #[arg(long, default_value_t = 5)]
    report_every: u64,

    /// Payload text.
    #[arg(long, default_value = "Hello world")]
    payload: String,
}

fn log_incoming(incoming: &Incoming) {
    tracing::info!(
        from = %incoming.remote.socket_addr(),
        ssrc = incoming.packet.ssrc(),
        seq = incoming.packet.sequence_number(),
        timestamp = incoming.packet.timestamp(),
        len = incoming.packet.payload.len(),
        "received data packet"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(dest) = cli.dest {
        config.default_address = dest;
    }

    let factory = UdpSocketFactory::try_current().context("no tokio runtime")?;
    let mut faults = factory.subscribe_faults();
    let mut session = Session::new(config, &factory)?;

    tracing::info!(
        port = session.config().port,
        dest = %session.config().default_address,
        ssrc = session.ssrc(),
        count = cli.count,
        "rtp-node starting"
    );

    let payload = Bytes::from(cli.payload.clone().into_bytes());
    let mut ticker = tokio::time::interval(Duration::from_millis(cli.interval_ms.max(1)));
    let mut sent = 0u64;

    while sent < cli.count {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
            fault = faults.recv() => {
                if let Ok(fault) = fault {
                    tracing::error!(port = fault.port, kind = ?fault.kind, "socket fault: {}", fault.message);
                }
            }
            Some(incoming) = session.recv() => log_incoming(&incoming),
            _ = ticker.tick() => {
                if let Err(e) = session.send(payload.clone()).await {
                    tracing::warn!(seq = session.sequence_number().wrapping_sub(1), error = %e, "data send failed");
                }
                sent += 1;

                if cli.report_every > 0 && sent % cli.report_every == 0 {
                    if let Err(e) = session.send_sr_with(SendOptions::default()).await {
                        tracing::warn!(error = %e, "sender report failed");
                    }
                }
            }
        }
    }

    // Let in-flight datagrams land before reporting.
    tokio::time::sleep(Duration::from_millis(cli.interval_ms.min(500))).await;
    while let Some(incoming) = session.try_recv() {
        log_incoming(&incoming);
    }

    session.close();
    let stats = session.stats();
    tracing::info!(
        sent = stats.packets_sent,
        received = stats.packets_received,
        mean_payload = stats.mean_payload_sent(),
        malformed_ratio = stats.malformed_ratio(),
        "rtp-node finished"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
