//! High-level PULSE client API.
//!
//! Provides [`PulseClient`], a session that connects over one transport,
//! authenticates once, and then reports heartbeats (see the `heartbeat`
//! module for the tick loop).

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::constants::{
    ACK_TIMEOUT, AUTH_ACK_TIMEOUT, CONNECT_TIMEOUT, DEFAULT_TCP_PORT, HEARTBEAT_INTERVAL,
    MAX_SEND_ATTEMPTS,
};
use crate::message::{AckMessage, AckStatus, AuthMessage, CodecError, Framing};
use crate::transport::{self, ProtocolKind, Transport, TransportError};

/// Errors that can occur in the PULSE client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure (including failure to connect).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Outgoing message could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Strict policy: the server never confirmed the credentials.
    #[error("authentication not confirmed: {0}")]
    AuthNotConfirmed(String),

    /// Every attempt of one heartbeat tick went unacknowledged.
    #[error("no ACK_TIME after {attempts} attempts")]
    RetryExhausted {
        /// Number of sends made for the tick.
        attempts: u32,
    },

    /// The operation is not valid in the current session state.
    #[error("operation not valid in state {0:?}")]
    InvalidState(ClientState),
}

/// What to do when `ACK_AUTH` does not arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthPolicy {
    /// Close the session and report [`ClientError::AuthNotConfirmed`].
    #[default]
    Strict,
    /// Log a warning and continue as if authenticated.
    Lenient,
}

/// Client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Transport to use.
    pub protocol: ProtocolKind,

    /// Server address (`host:port`), or multicast group for `UdpMulticast`.
    pub server_addr: String,

    /// Account name.
    pub username: String,

    /// Account password.
    pub password: String,

    /// Interval between heartbeat ticks.
    pub heartbeat_interval: Duration,

    /// How long each send attempt waits for `ACK_TIME`.
    pub ack_timeout: Duration,

    /// How long to wait for `ACK_AUTH`.
    pub auth_timeout: Duration,

    /// Send attempts per heartbeat tick.
    pub max_attempts: u32,

    /// Bound on the TCP connection handshake.
    pub connect_timeout: Duration,

    /// Behavior when the auth acknowledgment is missing.
    pub auth_policy: AuthPolicy,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("protocol", &self.protocol)
            .field("server_addr", &self.server_addr)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("ack_timeout", &self.ack_timeout)
            .field("auth_timeout", &self.auth_timeout)
            .field("max_attempts", &self.max_attempts)
            .field("connect_timeout", &self.connect_timeout)
            .field("auth_policy", &self.auth_policy)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolKind::Tcp,
            server_addr: format!("127.0.0.1:{}", DEFAULT_TCP_PORT),
            username: String::new(),
            password: String::new(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            ack_timeout: ACK_TIMEOUT,
            auth_timeout: AUTH_ACK_TIMEOUT,
            max_attempts: MAX_SEND_ATTEMPTS,
            connect_timeout: CONNECT_TIMEOUT,
            auth_policy: AuthPolicy::Strict,
        }
    }
}

/// Builder for creating a [`ClientConfig`].
#[derive(Debug)]
pub struct PulseClientBuilder {
    config: ClientConfig,
}

impl PulseClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Set the transport.
    pub fn protocol(mut self, protocol: ProtocolKind) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// Set the server (or multicast group) address.
    pub fn server_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server_addr = addr.into();
        self
    }

    /// Set the credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = username.into();
        self.config.password = password.into();
        self
    }

    /// Set the heartbeat interval.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Set the per-attempt acknowledgment timeout.
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    /// Set the auth acknowledgment timeout.
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.config.auth_timeout = timeout;
        self
    }

    /// Set the number of send attempts per tick (at least one).
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts.max(1);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the auth acknowledgment policy.
    pub fn auth_policy(mut self, policy: AuthPolicy) -> Self {
        self.config.auth_policy = policy;
        self
    }

    /// Build the client configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for PulseClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Client session state.
///
/// ```text
/// Init → Connected → AuthSent → Authenticated → (Sending ⇄ AwaitingAck) → Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No transport yet.
    Init,
    /// Transport open, credentials not sent.
    Connected,
    /// Credentials sent, waiting for `ACK_AUTH`.
    AuthSent,
    /// Ready for heartbeats.
    Authenticated,
    /// Writing a heartbeat.
    Sending,
    /// Waiting for `ACK_TIME`.
    AwaitingAck,
    /// Transport released; the session is finished.
    Closed,
}

/// Result of waiting for one acknowledgment.
#[derive(Debug)]
pub(crate) enum AckWait {
    /// The expected ack arrived.
    Received,
    /// The deadline passed.
    TimedOut,
    /// The transport failed while waiting.
    Failed(TransportError),
}

/// A PULSE client session.
///
/// The session exclusively owns its transport. It never reconnects: once
/// closed, callers build a new session.
///
/// # Example
///
/// ```ignore
/// use pulse_protocol::client::{PulseClient, PulseClientBuilder};
/// use pulse_protocol::transport::ProtocolKind;
///
/// let config = PulseClientBuilder::new()
///     .protocol(ProtocolKind::UdpUnicast)
///     .server_addr("localhost:9001")
///     .credentials("bob", "secret")
///     .build();
///
/// let mut client = PulseClient::establish(config).await?;
/// client.run().await?; // returns only when the session fails
/// ```
pub struct PulseClient {
    pub(crate) config: ClientConfig,
    pub(crate) state: ClientState,
    pub(crate) transport: Option<Box<dyn Transport>>,
}

impl PulseClient {
    /// Create a session in the `Init` state.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: ClientState::Init,
            transport: None,
        }
    }

    /// Create, connect, and authenticate a session.
    pub async fn establish(config: ClientConfig) -> Result<Self, ClientError> {
        let mut client = Self::new(config);
        client.connect().await?;
        client.authenticate().await?;
        Ok(client)
    }

    /// Open the transport (`Init → Connected`).
    ///
    /// On failure the session stays in `Init`.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        self.require(ClientState::Init)?;

        info!(
            "[{} client] Connecting to {}",
            self.config.protocol, self.config.server_addr
        );

        let transport = transport::open(
            self.config.protocol,
            &self.config.server_addr,
            self.config.connect_timeout,
        )
        .await
        .inspect_err(|e| warn!("[{} client] connect failed: {}", self.config.protocol, e))?;

        self.transport = Some(transport);
        self.state = ClientState::Connected;
        Ok(())
    }

    /// Send credentials and wait for `ACK_AUTH` (`Connected → Authenticated`).
    ///
    /// A missing or unreadable acknowledgment closes the session under
    /// [`AuthPolicy::Strict`]. Multicast sessions always proceed, since
    /// replies to a group sender are best-effort.
    pub async fn authenticate(&mut self) -> Result<(), ClientError> {
        self.require(ClientState::Connected)?;

        let protocol = self.config.protocol;
        let framing = protocol.framing();
        let payload = framing.encode_as(AuthMessage::new(
            self.config.username.as_str(),
            self.config.password.as_str(),
        ))?;

        info!(
            "[{} client] Sending auth (user={})",
            protocol, self.config.username
        );

        let Some(transport) = self.transport.as_mut() else {
            return Err(ClientError::InvalidState(self.state));
        };
        if let Err(e) = transport.send(&payload).await {
            self.shutdown().await;
            return Err(e.into());
        }
        self.state = ClientState::AuthSent;

        let deadline = Instant::now() + self.config.auth_timeout;
        let reason = match await_ack(&mut **transport, framing, AckStatus::AckAuth, deadline).await {
            AckWait::Received => {
                info!("[{} client] Authenticated as {}", protocol, self.config.username);
                self.state = ClientState::Authenticated;
                return Ok(());
            }
            AckWait::TimedOut => format!("no ACK_AUTH within {:?}", self.config.auth_timeout),
            // A server that rejects credentials hangs up without replying.
            AckWait::Failed(TransportError::Closed)
                if self.config.auth_policy == AuthPolicy::Strict =>
            {
                warn!("[{} client] server closed the connection during auth", protocol);
                self.shutdown().await;
                return Err(ClientError::AuthNotConfirmed(
                    "server closed the connection".into(),
                ));
            }
            AckWait::Failed(e) if e.is_fatal() => {
                self.shutdown().await;
                return Err(e.into());
            }
            AckWait::Failed(e) => e.to_string(),
        };

        if self.config.auth_policy == AuthPolicy::Strict && protocol.acks_reliable() {
            warn!("[{} client] {}; closing session", protocol, reason);
            self.shutdown().await;
            return Err(ClientError::AuthNotConfirmed(reason));
        }

        warn!("[{} client] {}; proceeding as authenticated", protocol, reason);
        self.state = ClientState::Authenticated;
        Ok(())
    }

    /// Close the session. Idempotent.
    pub async fn close(&mut self) {
        if self.state != ClientState::Closed {
            info!("[{} client] Closing session", self.config.protocol);
        }
        self.shutdown().await;
    }

    /// Current state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Whether the session can send heartbeats.
    pub fn is_authenticated(&self) -> bool {
        self.state == ClientState::Authenticated
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.state == ClientState::Closed
    }

    /// Local address of the transport (the address the server sees).
    pub fn local_addr(&self) -> Result<SocketAddr, ClientError> {
        match &self.transport {
            Some(transport) => Ok(transport.local_addr()?),
            None => Err(ClientError::InvalidState(self.state)),
        }
    }

    /// The session configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn require(&self, expected: ClientState) -> Result<(), ClientError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ClientError::InvalidState(self.state))
        }
    }

    /// Release the transport and mark the session closed.
    pub(crate) async fn shutdown(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!("[{} client] close: {}", self.config.protocol, e);
            }
        }
        self.state = ClientState::Closed;
    }
}

impl fmt::Debug for PulseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PulseClient")
            .field("protocol", &self.config.protocol)
            .field("server_addr", &self.config.server_addr)
            .field("username", &self.config.username)
            .field("state", &self.state)
            .finish()
    }
}

/// Read replies until one acknowledges `expected` or `deadline` passes.
///
/// Replies that fail to decode or carry another status are skipped; they do
/// not end the wait.
pub(crate) async fn await_ack(
    transport: &mut dyn Transport,
    framing: Framing,
    expected: AckStatus,
    deadline: Instant,
) -> AckWait {
    loop {
        let record = match transport.recv(Some(deadline)).await {
            Ok(record) => record,
            Err(e) if e.is_timeout() => return AckWait::TimedOut,
            Err(e) => return AckWait::Failed(e),
        };

        match framing.decode_as::<AckMessage>(&record) {
            Ok(ack) if ack.status == expected => {
                debug!("received {}", ack.status);
                return AckWait::Received;
            }
            Ok(ack) => debug!("ignoring {} while awaiting {}", ack.status, expected),
            Err(e) => warn!("discarding unreadable reply: {}", e),
        }
    }
}

/// Discard replies that are already waiting on the transport.
///
/// Called before a new exchange so that a late ack for an earlier request
/// is not taken as the answer to the next one. Returns how many records
/// were dropped.
pub(crate) async fn discard_pending(transport: &mut dyn Transport) -> usize {
    let now = Instant::now();
    let mut dropped = 0;
    // An expired deadline still yields a record that is ready right away.
    while transport.recv(Some(now)).await.is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        debug!("discarded {} stale replies", dropped);
    }
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, UdpSocket};

    #[test]
    fn test_builder_overrides_defaults() {
        let config = PulseClientBuilder::new()
            .protocol(ProtocolKind::UdpUnicast)
            .server_addr("localhost:9001")
            .credentials("bob", "secret")
            .ack_timeout(Duration::from_millis(250))
            .max_attempts(0)
            .auth_policy(AuthPolicy::Lenient)
            .build();

        assert_eq!(config.protocol, ProtocolKind::UdpUnicast);
        assert_eq!(config.server_addr, "localhost:9001");
        assert_eq!(config.username, "bob");
        assert_eq!(config.ack_timeout, Duration::from_millis(250));
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.auth_policy, AuthPolicy::Lenient);
        assert_eq!(config.heartbeat_interval, HEARTBEAT_INTERVAL);
    }

    #[test]
    fn test_default_policy_is_strict() {
        assert_eq!(ClientConfig::default().auth_policy, AuthPolicy::Strict);
        assert_eq!(ClientConfig::default().max_attempts, 5);
    }

    #[test]
    fn test_config_debug_redacts_password() {
        let config = PulseClientBuilder::new().credentials("alice", "hunter2").build();
        let debug = format!("{:?}", config);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_connect_failure_stays_in_init() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let config = PulseClientBuilder::new()
            .server_addr(addr)
            .credentials("alice", "secret")
            .connect_timeout(Duration::from_secs(2))
            .build();

        let mut client = PulseClient::new(config);
        let err = client.connect().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport(TransportError::Connect { .. })
        ));
        assert_eq!(client.state(), ClientState::Init);
    }

    #[tokio::test]
    async fn test_authenticate_requires_connection() {
        let mut client = PulseClient::new(ClientConfig::default());
        let err = client.authenticate().await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidState(ClientState::Init)));
    }

    async fn silent_udp_session(policy: AuthPolicy) -> (PulseClient, UdpSocket, Result<(), ClientError>) {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = PulseClientBuilder::new()
            .protocol(ProtocolKind::UdpUnicast)
            .server_addr(server.local_addr().unwrap().to_string())
            .credentials("carol", "secret")
            .auth_timeout(Duration::from_millis(150))
            .auth_policy(policy)
            .build();

        let mut client = PulseClient::new(config);
        client.connect().await.unwrap();
        let result = client.authenticate().await;
        (client, server, result)
    }

    #[tokio::test]
    async fn test_strict_policy_closes_without_ack_auth() {
        let (client, _server, result) = silent_udp_session(AuthPolicy::Strict).await;
        assert!(matches!(result, Err(ClientError::AuthNotConfirmed(_))));
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_lenient_policy_proceeds_without_ack_auth() {
        let (client, server, result) = silent_udp_session(AuthPolicy::Lenient).await;
        result.unwrap();
        assert!(client.is_authenticated());

        // The credentials still reached the server.
        let mut buf = [0u8; 256];
        let (len, _) = server.recv_from(&mut buf).await.unwrap();
        let auth: AuthMessage = Framing::Datagram.decode_as(&buf[..len]).unwrap();
        assert_eq!(auth.username, "carol");
    }

    #[tokio::test]
    async fn test_await_ack_skips_other_replies() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut transport = crate::transport::UdpTransport::connect_unicast(
            server.local_addr().unwrap(),
        )
        .await
        .unwrap();
        let client_addr = transport.local_addr().unwrap();

        let auth_ack = Framing::Datagram.encode_as(AckMessage::AUTH).unwrap();
        let time_ack = Framing::Datagram.encode_as(AckMessage::TIME).unwrap();
        server.send_to(b"garbage", client_addr).await.unwrap();
        server.send_to(&auth_ack, client_addr).await.unwrap();
        server.send_to(&time_ack, client_addr).await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(1);
        let outcome = await_ack(&mut transport, Framing::Datagram, AckStatus::AckTime, deadline).await;
        assert!(matches!(outcome, AckWait::Received));
    }

    #[tokio::test]
    async fn test_discard_pending_empties_the_queue() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut transport = crate::transport::UdpTransport::connect_unicast(
            server.local_addr().unwrap(),
        )
        .await
        .unwrap();
        let client_addr = transport.local_addr().unwrap();

        let time_ack = Framing::Datagram.encode_as(AckMessage::TIME).unwrap();
        server.send_to(&time_ack, client_addr).await.unwrap();
        server.send_to(&time_ack, client_addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(discard_pending(&mut transport).await, 2);

        let deadline = Instant::now() + Duration::from_millis(100);
        let outcome = await_ack(&mut transport, Framing::Datagram, AckStatus::AckTime, deadline).await;
        assert!(matches!(outcome, AckWait::TimedOut));
    }

    #[tokio::test]
    async fn test_strict_policy_reports_hangup_as_unconfirmed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            use tokio::io::AsyncBufReadExt;

            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = tokio::io::BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            // Reject by hanging up without a reply.
        });

        let config = PulseClientBuilder::new()
            .server_addr(addr.to_string())
            .credentials("alice", "wrong")
            .auth_timeout(Duration::from_secs(2))
            .build();

        let err = PulseClient::establish(config).await.unwrap_err();
        assert!(matches!(err, ClientError::AuthNotConfirmed(_)), "got {err:?}");
        server.await.unwrap();
    }
}
