//! Protocol constants for PULSE.
//!
//! Timing values are defaults; sessions and servers can override them through
//! their configuration builders.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Record terminator on stream transports.
pub const RECORD_DELIMITER: u8 = b'\n';

/// Largest record accepted on a stream transport (terminator included).
pub const MAX_RECORD_SIZE: usize = 64 * 1024;

/// Receive buffer for a single datagram.
pub const MAX_DATAGRAM_SIZE: usize = 65535;

// =============================================================================
// DEFAULT ENDPOINTS
// =============================================================================

/// Default TCP listener port.
pub const DEFAULT_TCP_PORT: u16 = 9000;

/// Default UDP unicast port.
pub const DEFAULT_UDP_PORT: u16 = 9001;

/// Default UDP multicast port.
pub const DEFAULT_MULTICAST_PORT: u16 = 9002;

/// Default multicast group (all-hosts).
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 1);

/// Default TCP bind address.
pub const DEFAULT_TCP_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_TCP_PORT));

/// Default UDP unicast bind address.
pub const DEFAULT_UDP_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_UDP_PORT));

/// Default multicast group address (group + port).
pub const DEFAULT_MULTICAST_ADDR: SocketAddr = SocketAddr::V4(SocketAddrV4::new(
    DEFAULT_MULTICAST_GROUP,
    DEFAULT_MULTICAST_PORT,
));

// =============================================================================
// TIMING
// =============================================================================

/// Interval between heartbeat ticks.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(7);

/// How long one send attempt waits for `ACK_TIME`.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// How long the session waits for `ACK_AUTH`.
pub const AUTH_ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Bound on the TCP connection handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed TCP accept before trying again.
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Send attempts per heartbeat tick before giving up.
pub const MAX_SEND_ATTEMPTS: u32 = 5;

/// Multicast TTL for client sends (stay on the local segment).
pub const MULTICAST_TTL: u32 = 1;
