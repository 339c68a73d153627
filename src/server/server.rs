//! High-level PULSE server API.
//!
//! Provides [`PulseServer`], which binds the TCP, UDP unicast and UDP
//! multicast endpoints and answers authentication and heartbeat messages on
//! each of them.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::auth_table::AuthTable;
use crate::core::constants::{
    ACCEPT_RETRY_DELAY, DEFAULT_MULTICAST_ADDR, DEFAULT_TCP_ADDR, DEFAULT_UDP_ADDR,
};
use crate::core::{CredentialValidator, NonEmptyCredentials};
use crate::message::CodecError;
use crate::transport::{DatagramSocket, ProtocolKind, TcpTransport, TransportError};

/// Errors that can occur in the PULSE server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind an endpoint.
    #[error("bind {addr} failed: {source}")]
    Bind {
        /// Address that could not be bound.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be decoded as the expected message.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Transport failure on a connection.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The credential validator refused the client.
    #[error("credentials rejected for user {username:?}")]
    AuthRejected {
        /// Username that was presented.
        username: String,
    },
}

/// Server configuration.
///
/// An endpoint set to `None` is not served.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP listen address.
    pub tcp_addr: Option<SocketAddr>,

    /// UDP unicast bind address.
    pub udp_addr: Option<SocketAddr>,

    /// UDP multicast group and port.
    pub multicast_addr: Option<SocketAddr>,

    /// IPv4 interface used to join the multicast group.
    pub multicast_interface: Ipv4Addr,

    /// Bound on each TCP read. `None` waits for the peer indefinitely.
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tcp_addr: Some(DEFAULT_TCP_ADDR),
            udp_addr: Some(DEFAULT_UDP_ADDR),
            multicast_addr: Some(DEFAULT_MULTICAST_ADDR),
            multicast_interface: Ipv4Addr::UNSPECIFIED,
            idle_timeout: None,
        }
    }
}

/// Builder for creating a [`ServerConfig`].
#[derive(Debug)]
pub struct PulseServerBuilder {
    config: ServerConfig,
}

impl PulseServerBuilder {
    /// Create a new server builder with every endpoint on its default address.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Set the TCP listen address.
    pub fn tcp_addr(mut self, addr: SocketAddr) -> Self {
        self.config.tcp_addr = Some(addr);
        self
    }

    /// Set the UDP unicast bind address.
    pub fn udp_addr(mut self, addr: SocketAddr) -> Self {
        self.config.udp_addr = Some(addr);
        self
    }

    /// Set the multicast group address.
    pub fn multicast_addr(mut self, addr: SocketAddr) -> Self {
        self.config.multicast_addr = Some(addr);
        self
    }

    /// Set the interface used to join the multicast group.
    pub fn multicast_interface(mut self, interface: Ipv4Addr) -> Self {
        self.config.multicast_interface = interface;
        self
    }

    /// Do not serve TCP.
    pub fn without_tcp(mut self) -> Self {
        self.config.tcp_addr = None;
        self
    }

    /// Do not serve UDP unicast.
    pub fn without_udp(mut self) -> Self {
        self.config.udp_addr = None;
        self
    }

    /// Do not join a multicast group.
    pub fn without_multicast(mut self) -> Self {
        self.config.multicast_addr = None;
        self
    }

    /// Set the per-read idle timeout for TCP connections.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = Some(timeout);
        self
    }

    /// Build the server configuration.
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

impl Default for PulseServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A PULSE protocol server.
///
/// Cloning is cheap; every clone shares one [`AuthTable`] and validator, so
/// each transport loop gets its own clone of the same server.
///
/// # Example
///
/// ```ignore
/// use pulse_protocol::server::{PulseServer, PulseServerBuilder};
///
/// let config = PulseServerBuilder::new()
///     .tcp_addr("0.0.0.0:9000".parse()?)
///     .build();
///
/// let mut handle = PulseServer::new(config).start().await?;
/// println!("TCP on {:?}", handle.tcp_addr());
/// handle.wait().await;
/// ```
#[derive(Clone)]
pub struct PulseServer {
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) auth_table: Arc<AuthTable>,
    pub(crate) validator: Arc<dyn CredentialValidator>,
}

impl PulseServer {
    /// Create a server that accepts any non-empty credentials.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_validator(config, NonEmptyCredentials)
    }

    /// Create a server with a custom credential check.
    pub fn with_validator(config: ServerConfig, validator: impl CredentialValidator) -> Self {
        Self {
            config: Arc::new(config),
            auth_table: Arc::new(AuthTable::new()),
            validator: Arc::new(validator),
        }
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The table of authenticated UDP source addresses.
    pub fn auth_table(&self) -> &Arc<AuthTable> {
        &self.auth_table
    }

    /// Bind every configured endpoint and spawn its loop.
    ///
    /// Fails without serving anything if any endpoint cannot be bound.
    pub async fn start(&self) -> Result<ServerHandle, ServerError> {
        let listener = match self.config.tcp_addr {
            Some(addr) => Some(
                TcpListener::bind(addr)
                    .await
                    .map_err(|source| ServerError::Bind { addr, source })?,
            ),
            None => None,
        };
        let unicast = match self.config.udp_addr {
            Some(addr) => Some(
                DatagramSocket::bind(addr)
                    .await
                    .map_err(|source| ServerError::Bind { addr, source })?,
            ),
            None => None,
        };
        let multicast = match self.config.multicast_addr {
            Some(addr) => Some(
                DatagramSocket::bind_multicast(addr, self.config.multicast_interface)
                    .await
                    .map_err(|source| ServerError::Bind { addr, source })?,
            ),
            None => None,
        };

        let mut handle = ServerHandle {
            tcp_addr: None,
            udp_addr: None,
            multicast_addr: None,
            auth_table: self.auth_table.clone(),
            tasks: JoinSet::new(),
        };

        if let Some(listener) = listener {
            let addr = listener.local_addr()?;
            info!("[tcp server] Listening on {}", addr);
            handle.tcp_addr = Some(addr);
            let server = self.clone();
            handle.tasks.spawn(async move { server.serve_tcp(listener).await });
        }
        if let Some(socket) = unicast {
            let addr = socket.local_addr()?;
            info!("[udp-unicast server] Listening on {}", addr);
            handle.udp_addr = Some(addr);
            let server = self.clone();
            handle.tasks.spawn(async move { server.serve_datagrams(socket).await });
        }
        if let Some(socket) = multicast {
            let port = socket.local_addr()?.port();
            let addr = match socket.group() {
                Some(group) => SocketAddr::new(group, port),
                None => socket.local_addr()?,
            };
            info!("[udp-multicast server] Listening on {}", addr);
            handle.multicast_addr = Some(addr);
            let server = self.clone();
            handle.tasks.spawn(async move { server.serve_datagrams(socket).await });
        }

        Ok(handle)
    }

    /// Accept connections forever, one task per connection.
    ///
    /// Connection tasks are owned by this loop and end with it.
    pub async fn serve_tcp(&self, listener: TcpListener) {
        let mut connections = JoinSet::new();

        loop {
            // Reap finished connections so the set does not grow unbounded.
            while connections.try_join_next().is_some() {}

            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    // Errors like EMFILE persist until a connection closes.
                    warn!("[tcp server] accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };

            let transport = match TcpTransport::from_stream(stream) {
                Ok(transport) => transport,
                Err(e) => {
                    warn!("[tcp server] dropping connection from {}: {}", peer, e);
                    continue;
                }
            };

            debug!("[tcp server] Accepted {}", peer);
            let server = self.clone();
            connections.spawn(async move {
                if let Err(e) = server.handle_connection(transport).await {
                    warn!("[tcp server] connection from {} ended: {}", peer, e);
                }
            });
        }
    }

    /// Process datagrams from `socket` one at a time, forever.
    ///
    /// Receive errors and bad datagrams are logged; they never end the loop.
    pub async fn serve_datagrams(&self, mut socket: DatagramSocket) {
        let kind = if socket.is_multicast() {
            ProtocolKind::UdpMulticast
        } else {
            ProtocolKind::UdpUnicast
        };

        loop {
            let (payload, peer) = match socket.recv_from().await {
                Ok(received) => received,
                Err(e) => {
                    warn!("[{} server] receive failed: {}", kind, e);
                    continue;
                }
            };

            let Some(ack) = self.handle_datagram(payload, peer).await else {
                continue;
            };

            let bytes = match kind.framing().encode_as(ack) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("[{} server] cannot encode {}: {}", kind, ack.status, e);
                    continue;
                }
            };

            match socket.send_to(&bytes, peer).await {
                Ok(_) => debug!("[{} server] {} -> {}", kind, ack.status, peer),
                Err(e) => warn!("[{} server] reply to {} failed: {}", kind, peer, e),
            }
        }
    }
}

impl fmt::Debug for PulseServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PulseServer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Handle to a running server.
///
/// Dropping the handle stops every endpoint loop.
#[derive(Debug)]
pub struct ServerHandle {
    tcp_addr: Option<SocketAddr>,
    udp_addr: Option<SocketAddr>,
    multicast_addr: Option<SocketAddr>,
    auth_table: Arc<AuthTable>,
    tasks: JoinSet<()>,
}

impl ServerHandle {
    /// Bound TCP address, if TCP is served.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp_addr
    }

    /// Bound UDP unicast address, if served.
    pub fn udp_addr(&self) -> Option<SocketAddr> {
        self.udp_addr
    }

    /// Multicast group and bound port, if joined.
    pub fn multicast_addr(&self) -> Option<SocketAddr> {
        self.multicast_addr
    }

    /// The shared table of authenticated UDP source addresses.
    pub fn auth_table(&self) -> &Arc<AuthTable> {
        &self.auth_table
    }

    /// Stop every endpoint loop and wait for them to finish.
    pub async fn shutdown(&mut self) {
        info!("Shutting down server");
        self.tasks.abort_all();
        self.wait().await;
    }

    /// Wait until every endpoint loop has finished.
    pub async fn wait(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    warn!("server task failed: {}", e);
                }
            }
        }
    }
}
