//! PULSE Protocol - Transport Layer
//!
//! A uniform send/receive contract over three transports:
//!
//! - **TCP**: [`TcpTransport`], newline-framed records on a stream
//! - **UDP unicast**: [`UdpTransport`] associated with one server address
//! - **UDP multicast**: [`UdpTransport`] sending to a group address
//!
//! Client sessions hold a `Box<dyn Transport>` from [`open`], so the session
//! logic is written once. Servers use [`TcpTransport`] per accepted
//! connection and a [`DatagramSocket`] per UDP endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │      Client session / Server handler    │
//! ├─────────────────────────────────────────┤
//! │             Message codec               │
//! ├─────────────────────────────────────────┤
//! │           Transport Layer               │  ← This module
//! │   open, send, recv(deadline), close     │
//! ├─────────────────────────────────────────┤
//! │        TCP  │  UDP  │  UDP multicast    │
//! └─────────────────────────────────────────┘
//! ```

mod error;
mod kind;
mod socket;
mod tcp;
mod udp;

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::message::Framing;

pub use error::*;
pub use kind::*;
pub use socket::*;
pub use tcp::TcpTransport;
pub use udp::UdpTransport;

/// One end of a client/server association.
///
/// `recv` returns exactly one record: a full line on TCP, a full datagram on
/// UDP. The record is not decoded.
#[async_trait]
pub trait Transport: Send + fmt::Debug {
    /// Transport kind.
    fn kind(&self) -> ProtocolKind;

    /// Record framing of this transport.
    fn framing(&self) -> Framing {
        self.kind().framing()
    }

    /// Local socket address.
    fn local_addr(&self) -> TransportResult<SocketAddr>;

    /// Remote address (server, multicast group, or TCP peer).
    fn peer_addr(&self) -> SocketAddr;

    /// Whether `close` has been called.
    fn is_closed(&self) -> bool;

    /// Write one encoded record.
    async fn send(&mut self, payload: &[u8]) -> TransportResult<()>;

    /// Read one record, giving up with [`TransportError::ReadTimeout`] at
    /// `deadline`. `None` waits indefinitely.
    async fn recv(&mut self, deadline: Option<Instant>) -> TransportResult<Vec<u8>>;

    /// Release the transport. Further I/O fails with [`TransportError::Closed`].
    async fn close(&mut self) -> TransportResult<()>;
}

/// Open a client transport of the given kind to `addr`.
///
/// `addr` may be a host name (`localhost:9000`). `connect_timeout` bounds the
/// TCP handshake; UDP association does not touch the network.
pub async fn open(
    kind: ProtocolKind,
    addr: &str,
    connect_timeout: Duration,
) -> TransportResult<Box<dyn Transport>> {
    match kind {
        ProtocolKind::Tcp => Ok(Box::new(TcpTransport::connect(addr, connect_timeout).await?)),
        ProtocolKind::UdpUnicast => {
            let peer = resolve(addr).await?;
            Ok(Box::new(UdpTransport::connect_unicast(peer).await?))
        }
        ProtocolKind::UdpMulticast => {
            let group = resolve(addr).await?;
            Ok(Box::new(UdpTransport::open_multicast(group).await?))
        }
    }
}

/// Resolve `addr` to its first socket address.
pub async fn resolve(addr: &str) -> TransportResult<SocketAddr> {
    let mut addrs = tokio::net::lookup_host(addr)
        .await
        .map_err(|source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        })?;
    addrs
        .next()
        .ok_or_else(|| TransportError::Resolve(addr.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, UdpSocket};

    #[tokio::test]
    async fn test_open_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let transport = open(ProtocolKind::Tcp, &addr.to_string(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(transport.kind(), ProtocolKind::Tcp);
        assert_eq!(transport.framing(), Framing::Stream);
        assert_eq!(transport.peer_addr(), addr);
    }

    #[tokio::test]
    async fn test_open_udp_unicast() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        let transport = open(
            ProtocolKind::UdpUnicast,
            &format!("127.0.0.1:{}", port),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(transport.kind(), ProtocolKind::UdpUnicast);
        assert_eq!(transport.framing(), Framing::Datagram);
        assert_eq!(transport.peer_addr().port(), port);
    }

    #[tokio::test]
    async fn test_open_multicast_group() {
        let transport = open(
            ProtocolKind::UdpMulticast,
            "224.0.0.1:9002",
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(transport.kind(), ProtocolKind::UdpMulticast);
        assert!(transport.peer_addr().ip().is_multicast());
    }

    #[tokio::test]
    async fn test_open_rejects_garbage_address() {
        let err = open(ProtocolKind::UdpUnicast, "not an address", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Connect { .. } | TransportError::Resolve(_)
        ));
    }
}
