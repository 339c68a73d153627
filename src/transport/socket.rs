//! Async UDP socket wrapper for PULSE servers.
//!
//! A server socket receives datagrams from many peers, so it works with
//! `recv_from`/`send_to` rather than through the [`Transport`](super::Transport)
//! association used by clients.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::UdpSocket;
use tracing::info;

use crate::core::constants::MAX_DATAGRAM_SIZE;

/// Server-side UDP socket, unicast or joined to a multicast group.
#[derive(Debug)]
pub struct DatagramSocket {
    /// The underlying UDP socket.
    socket: UdpSocket,
    /// Receive buffer.
    recv_buffer: Vec<u8>,
    /// Multicast group this socket joined, if any.
    group: Option<IpAddr>,
}

impl DatagramSocket {
    /// Bind a unicast socket to the given address.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(socket))
    }

    /// Bind the group's port and join the multicast group.
    ///
    /// `interface` selects the IPv4 interface to join on; `UNSPECIFIED` lets
    /// the kernel choose. IPv6 groups join on the default interface.
    pub async fn bind_multicast(group_addr: SocketAddr, interface: Ipv4Addr) -> io::Result<Self> {
        let group = group_addr.ip();
        if !group.is_multicast() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a multicast group", group),
            ));
        }

        let socket = match group {
            IpAddr::V4(v4) => {
                let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, group_addr.port())).await?;
                socket.join_multicast_v4(v4, interface)?;
                socket
            }
            IpAddr::V6(v6) => {
                let socket = UdpSocket::bind((Ipv6Addr::UNSPECIFIED, group_addr.port())).await?;
                socket.join_multicast_v6(&v6, 0)?;
                socket
            }
        };

        info!("Joined multicast group {} on port {}", group, group_addr.port());

        let mut wrapped = Self::from_socket(socket);
        wrapped.group = Some(group);
        Ok(wrapped)
    }

    /// Create a socket from an existing UDP socket.
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket,
            recv_buffer: vec![0u8; MAX_DATAGRAM_SIZE],
            group: None,
        }
    }

    /// Get the local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// The multicast group, if this socket joined one.
    pub fn group(&self) -> Option<IpAddr> {
        self.group
    }

    /// Whether this socket serves a multicast group.
    pub fn is_multicast(&self) -> bool {
        self.group.is_some()
    }

    /// Send data to a specific address.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(data, addr).await
    }

    /// Receive data and return the sender's address.
    pub async fn recv_from(&mut self) -> io::Result<(&[u8], SocketAddr)> {
        let (len, addr) = self.socket.recv_from(&mut self.recv_buffer).await?;
        Ok((&self.recv_buffer[..len], addr))
    }
}
