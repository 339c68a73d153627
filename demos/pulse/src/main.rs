//! PULSE Demo
//!
//! Runs a PULSE server, a single client, or both at once.
//!
//! Environment variables:
//! - PULSE_MODE: "server", "client" or "demo" (default demo)
//! - PULSE_TCP_ADDR: TCP listen address (default 0.0.0.0:9000)
//! - PULSE_UDP_ADDR: UDP unicast bind address (default 0.0.0.0:9001)
//! - PULSE_MULTICAST_ADDR: multicast group and port (default 224.0.0.1:9002)
//! - PULSE_PROTOCOL: tcp|udp-unicast|udp-multicast (client only)
//! - PULSE_SERVER_ADDR: address the client sends to (client only)
//! - PULSE_USERNAME / PULSE_PASSWORD: client credentials
//! - PULSE_HEARTBEAT_SECS: seconds between heartbeats (default 7)
//! - PULSE_TICKS: heartbeats per client (client default unlimited, demo default 3)
//! - PULSE_AUTH_POLICY: strict|lenient
//! - PULSE_LOG_LEVEL: trace|debug|info|warn|error, overridden by RUST_LOG

mod config;

use anyhow::{Context, Result};
use pulse_protocol::client::{PulseClient, PulseClientBuilder};
use pulse_protocol::server::PulseServer;
use pulse_protocol::transport::ProtocolKind;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{DemoConfig, Mode, default_target};

/// Heartbeats per client in demo mode unless `PULSE_TICKS` says otherwise.
const DEMO_TICKS: u32 = 3;

/// Demo participants: one per TCP and UDP unicast, two sharing the group.
const DEMO_CLIENTS: [(&str, ProtocolKind); 4] = [
    ("alice", ProtocolKind::Tcp),
    ("bob", ProtocolKind::UdpUnicast),
    ("chris", ProtocolKind::UdpMulticast),
    ("dick", ProtocolKind::UdpMulticast),
];

#[tokio::main]
async fn main() -> Result<()> {
    let config = DemoConfig::from_env().context("invalid environment")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("Starting pulse-demo v{} in {:?} mode", env!("CARGO_PKG_VERSION"), config.mode);

    match config.mode {
        Mode::Server => run_server(&config).await,
        Mode::Client => run_client(&config).await,
        Mode::Demo => run_demo(&config).await,
    }
}

async fn run_server(config: &DemoConfig) -> Result<()> {
    let mut handle = PulseServer::new(config.server.clone())
        .start()
        .await
        .context("failed to start server")?;

    let interrupted = tokio::select! {
        _ = handle.wait() => None,
        signal = tokio::signal::ctrl_c() => Some(signal),
    };

    match interrupted {
        Some(signal) => {
            signal.context("failed to listen for Ctrl-C")?;
            handle.shutdown().await;
        }
        None => warn!("all listeners stopped"),
    }
    Ok(())
}

async fn run_client(config: &DemoConfig) -> Result<()> {
    let client_config = PulseClientBuilder::new()
        .protocol(config.protocol)
        .server_addr(config.server_addr.as_str())
        .credentials(config.username.as_str(), config.password.as_str())
        .heartbeat_interval(config.heartbeat_interval)
        .auth_policy(config.auth_policy)
        .build();

    let mut client = PulseClient::establish(client_config)
        .await
        .context("session setup failed")?;

    match config.ticks {
        Some(ticks) => {
            client.run_ticks(ticks).await?;
        }
        None => client.run().await?,
    }
    client.close().await;
    Ok(())
}

async fn run_demo(config: &DemoConfig) -> Result<()> {
    let mut server = PulseServer::new(config.server.clone())
        .start()
        .await
        .context("failed to start server")?;

    let ticks = config.ticks.unwrap_or(DEMO_TICKS);
    let mut sessions = JoinSet::new();

    for (username, protocol) in DEMO_CLIENTS {
        let client_config = PulseClientBuilder::new()
            .protocol(protocol)
            .server_addr(default_target(&config.server, protocol).to_string())
            .credentials(username, config.password.as_str())
            .heartbeat_interval(config.heartbeat_interval)
            .auth_policy(config.auth_policy)
            .build();

        sessions.spawn(async move {
            let mut client = PulseClient::establish(client_config).await?;
            let reports = client.run_ticks(ticks).await?;
            client.close().await;
            Ok::<_, anyhow::Error>((username, protocol, reports))
        });
    }

    let mut failures = 0;
    while let Some(joined) = sessions.join_next().await {
        match joined.context("client task panicked")? {
            Ok((username, protocol, reports)) => {
                let acked = reports.iter().filter(|r| r.acknowledged).count();
                info!(
                    "Client {} ({}) completed {} heartbeats, {} acknowledged",
                    username,
                    protocol,
                    reports.len(),
                    acked
                );
            }
            Err(e) => {
                failures += 1;
                error!("Client session failed: {:#}", e);
            }
        }
    }

    info!(
        "{} UDP addresses authenticated",
        server.auth_table().len().await
    );
    server.shutdown().await;

    if failures > 0 {
        anyhow::bail!("{} of {} client sessions failed", failures, DEMO_CLIENTS.len());
    }
    Ok(())
}
