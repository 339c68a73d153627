//! Transport selector.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::message::Framing;

/// Which transport a session runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    /// Connection-oriented TCP stream.
    Tcp,
    /// Connectionless UDP to a single server address.
    UdpUnicast,
    /// UDP sent to a multicast group; replies come back unicast.
    UdpMulticast,
}

impl ProtocolKind {
    /// All transport kinds.
    pub const ALL: [ProtocolKind; 3] = [
        ProtocolKind::Tcp,
        ProtocolKind::UdpUnicast,
        ProtocolKind::UdpMulticast,
    ];

    /// Record framing used on this transport.
    pub fn framing(&self) -> Framing {
        match self {
            ProtocolKind::Tcp => Framing::Stream,
            ProtocolKind::UdpUnicast | ProtocolKind::UdpMulticast => Framing::Datagram,
        }
    }

    /// Whether a missing acknowledgment indicates a failure.
    ///
    /// Replies to a multicast sender are best-effort, so missing acks on that
    /// transport are warnings rather than errors.
    pub fn acks_reliable(&self) -> bool {
        !matches!(self, ProtocolKind::UdpMulticast)
    }

    /// Selector string (`"tcp"`, `"udp-unicast"`, `"udp-multicast"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::Tcp => "tcp",
            ProtocolKind::UdpUnicast => "udp-unicast",
            ProtocolKind::UdpMulticast => "udp-multicast",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown protocol selector.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown protocol {0:?} (expected tcp, udp-unicast or udp-multicast)")]
pub struct UnknownProtocol(pub String);

impl FromStr for ProtocolKind {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProtocolKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownProtocol(s.to_string()))
    }
}
