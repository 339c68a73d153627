//! UDP client transports (unicast and multicast).

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};
use tracing::debug;

use super::error::{TransportError, TransportResult};
use super::kind::ProtocolKind;
use super::Transport;
use crate::core::constants::{MAX_DATAGRAM_SIZE, MULTICAST_TTL};

/// Client-side UDP transport.
///
/// In unicast mode the socket is connected to the server, so the kernel
/// filters replies from other sources. In multicast mode sends go to the
/// group and a reply from any source is accepted, since the server answers
/// from its own unicast address.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
    kind: ProtocolKind,
    recv_buffer: Vec<u8>,
    closed: bool,
}

impl UdpTransport {
    /// Bind an ephemeral port and associate it with `peer`.
    pub async fn connect_unicast(peer: SocketAddr) -> TransportResult<Self> {
        let socket = bind_ephemeral(peer).await?;
        socket
            .connect(peer)
            .await
            .map_err(|source| connect_error(peer, source))?;

        debug!("UDP associated {:?} -> {}", socket.local_addr().ok(), peer);
        Ok(Self::new(socket, peer, ProtocolKind::UdpUnicast))
    }

    /// Bind an ephemeral port for sending to the multicast `group`.
    pub async fn open_multicast(group: SocketAddr) -> TransportResult<Self> {
        if !group.ip().is_multicast() {
            return Err(connect_error(
                group,
                io::Error::new(io::ErrorKind::InvalidInput, "not a multicast group"),
            ));
        }

        let socket = bind_ephemeral(group).await?;
        if group.is_ipv4() {
            socket.set_multicast_ttl_v4(MULTICAST_TTL)?;
        }

        debug!(
            "UDP multicast sender {:?} -> group {}",
            socket.local_addr().ok(),
            group
        );
        Ok(Self::new(socket, group, ProtocolKind::UdpMulticast))
    }

    fn new(socket: UdpSocket, peer: SocketAddr, kind: ProtocolKind) -> Self {
        Self {
            socket,
            peer,
            kind,
            recv_buffer: vec![0u8; MAX_DATAGRAM_SIZE],
            closed: false,
        }
    }

    async fn recv_datagram(&mut self) -> TransportResult<Vec<u8>> {
        let len = match self.kind {
            ProtocolKind::UdpMulticast => {
                let (len, from) = self.socket.recv_from(&mut self.recv_buffer).await?;
                debug!("multicast reply from {}", from);
                len
            }
            _ => self.socket.recv(&mut self.recv_buffer).await?,
        };
        Ok(self.recv_buffer[..len].to_vec())
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn kind(&self) -> ProtocolKind {
        self.kind
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn send(&mut self, payload: &[u8]) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.kind {
            ProtocolKind::UdpMulticast => self.socket.send_to(payload, self.peer).await?,
            _ => self.socket.send(payload).await?,
        };
        Ok(())
    }

    async fn recv(&mut self, deadline: Option<Instant>) -> TransportResult<Vec<u8>> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match deadline {
            Some(deadline) => timeout_at(deadline, self.recv_datagram())
                .await
                .map_err(|_| TransportError::ReadTimeout)?,
            None => self.recv_datagram().await,
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        // No teardown on the wire; the socket is released on drop.
        self.closed = true;
        Ok(())
    }
}

/// Bind an ephemeral port in the same address family as `peer`.
async fn bind_ephemeral(peer: SocketAddr) -> TransportResult<UdpSocket> {
    let local: SocketAddr = match peer {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    UdpSocket::bind(local)
        .await
        .map_err(|source| connect_error(peer, source))
}

fn connect_error(peer: SocketAddr, source: io::Error) -> TransportError {
    TransportError::Connect {
        addr: peer.to_string(),
        source,
    }
}
