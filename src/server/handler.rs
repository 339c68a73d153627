//! Per-message server logic for TCP connections and UDP datagrams.

use std::net::SocketAddr;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::server::{PulseServer, ServerError};
use crate::message::{AckMessage, AuthMessage, Framing, Message, TimeMessage};
use crate::transport::{TcpTransport, Transport, TransportError};

impl PulseServer {
    /// Serve one TCP connection until the peer goes away.
    ///
    /// The first record must be valid credentials; anything else closes the
    /// connection without a reply. After `ACK_AUTH`, every time record is
    /// answered with `ACK_TIME` and unreadable records are skipped.
    pub async fn handle_connection(&self, mut transport: TcpTransport) -> Result<(), ServerError> {
        let peer = transport.peer_addr();

        let auth = match self.read_auth(&mut transport).await {
            Ok(auth) => auth,
            Err(e) => {
                let _ = transport.close().await;
                return Err(e);
            }
        };

        if !self.validator.validate(&auth.username, &auth.password) {
            warn!("[tcp server] rejected credentials from {} (user={:?})", peer, auth.username);
            let _ = transport.close().await;
            return Err(ServerError::AuthRejected {
                username: auth.username,
            });
        }

        info!("[tcp server] {} authenticated as {}", peer, auth.username);
        self.reply(&mut transport, AckMessage::AUTH).await?;

        loop {
            let record = match transport.recv(self.read_deadline()).await {
                Ok(record) => record,
                Err(TransportError::Closed) => {
                    info!("[tcp server] {} disconnected", peer);
                    return Ok(());
                }
                Err(e) => {
                    let _ = transport.close().await;
                    return Err(e.into());
                }
            };

            match Framing::Stream.decode_as::<TimeMessage>(&record) {
                Ok(time) => {
                    debug!("[tcp server] {} time {}", peer, time.timestamp);
                    self.reply(&mut transport, AckMessage::TIME).await?;
                }
                Err(e) => warn!("[tcp server] skipping record from {}: {}", peer, e),
            }
        }
    }

    /// Decide the reply to one datagram from `peer`.
    ///
    /// Valid credentials mark `peer` authenticated and earn `ACK_AUTH`. A time
    /// message earns `ACK_TIME` only from an authenticated address. Everything
    /// else, including undecodable payloads, gets no reply.
    pub async fn handle_datagram(&self, payload: &[u8], peer: SocketAddr) -> Option<AckMessage> {
        let message = match Framing::Datagram.decode(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("[udp server] malformed datagram from {}: {}", peer, e);
                return None;
            }
        };

        match message {
            Message::Auth(auth) => {
                if !self.validator.validate(&auth.username, &auth.password) {
                    warn!("[udp server] rejected credentials from {} (user={:?})", peer, auth.username);
                    return None;
                }
                if self.auth_table.mark_authenticated(peer).await {
                    info!("[udp server] {} authenticated as {}", peer, auth.username);
                }
                Some(AckMessage::AUTH)
            }
            Message::Time(time) => {
                if !self.auth_table.is_authenticated(&peer).await {
                    debug!("[udp server] dropping time from unauthenticated {}", peer);
                    return None;
                }
                debug!("[udp server] {} time {}", peer, time.timestamp);
                Some(AckMessage::TIME)
            }
            Message::Ack(ack) => {
                debug!("[udp server] ignoring {} from {}", ack.status, peer);
                None
            }
        }
    }

    async fn read_auth(&self, transport: &mut TcpTransport) -> Result<AuthMessage, ServerError> {
        let record = transport.recv(self.read_deadline()).await?;
        Ok(Framing::Stream.decode_as::<AuthMessage>(&record)?)
    }

    async fn reply(&self, transport: &mut TcpTransport, ack: AckMessage) -> Result<(), ServerError> {
        let bytes = Framing::Stream.encode_as(ack)?;
        if let Err(e) = transport.send(&bytes).await {
            let _ = transport.close().await;
            return Err(e.into());
        }
        Ok(())
    }

    fn read_deadline(&self) -> Option<Instant> {
        self.config.idle_timeout.map(|timeout| Instant::now() + timeout)
    }
}
