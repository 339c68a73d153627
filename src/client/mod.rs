//! PULSE Protocol - Client Library
//!
//! High-level API for PULSE clients: connect, authenticate, heartbeat.

#[allow(clippy::module_inception)]
mod client;
mod heartbeat;

pub use client::*;
pub use heartbeat::*;
