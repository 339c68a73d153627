//! # PULSE Protocol
//!
//! PULSE is a small authenticated heartbeat protocol. A client presents
//! credentials once, then reports the current time at a fixed interval; the
//! server acknowledges each report. It runs over three transports:
//!
//! - **TCP**: newline-delimited records on one connection per client
//! - **UDP unicast**: one record per datagram, authenticated by source address
//! - **UDP multicast**: clients send to a group, the server replies unicast
//!
//! ## Feature Flags
//!
//! - `transport` (default): Transports and the server datagram socket
//! - `client` (default): Client sessions with heartbeat retry
//! - `server` (default): Server with TCP and UDP handlers
//!
//! ## Modules
//!
//! - [`core`]: Constants, error types and the credential validator (always included)
//! - [`message`]: Message types and the wire codec (always included)
//! - [`transport`]: Transport layer (requires `transport` feature)
//! - [`client`]: Client API (requires `client` feature)
//! - [`server`]: Server API (requires `server` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use pulse_protocol::prelude::*;
//!
//! let hello = AuthMessage::new("alice", "secret");
//! let line = Framing::Stream.encode_as(hello.clone()).unwrap();
//! assert!(line.ends_with(b"\n"));
//!
//! let decoded: AuthMessage = Framing::Stream.decode_as(&line).unwrap();
//! assert_eq!(decoded, hello);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Messages and codec (always included)
pub mod message;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Client API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

// Server API (feature-gated)
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;
    pub use crate::message::*;

    #[cfg(feature = "transport")]
    pub use crate::transport::{ProtocolKind, Transport, TransportError, TransportResult};

    #[cfg(feature = "client")]
    pub use crate::client::{
        AuthPolicy, ClientConfig, ClientError, ClientState, HeartbeatReport, PulseClient,
        PulseClientBuilder,
    };

    #[cfg(feature = "server")]
    pub use crate::server::{
        AuthTable, PulseServer, PulseServerBuilder, ServerConfig, ServerError, ServerHandle,
    };
}

// Re-export commonly used items at crate root
pub use core::{CredentialValidator, NonEmptyCredentials, PulseError, PulseResult};
pub use message::{AckMessage, AckStatus, AuthMessage, Framing, Message, TimeMessage};

#[cfg(feature = "transport")]
pub use transport::ProtocolKind;
