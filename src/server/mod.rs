//! PULSE Protocol - Server Library
//!
//! One [`PulseServer`] value drives every listener: a TCP acceptor with a
//! task per connection, and one sequential loop per UDP socket. The
//! [`AuthTable`] is the only state the loops share.

mod auth_table;
mod handler;
#[allow(clippy::module_inception)]
mod server;

pub use auth_table::*;
pub use server::*;
