//! PULSE Protocol - Message Codec
//!
//! Three message kinds travel on the wire: [`AuthMessage`] and [`TimeMessage`]
//! from client to server, [`AckMessage`] from server to client. All of them
//! are wrapped in the [`Message`] enum, whose `kind` discriminant is decoded
//! first so receivers dispatch over a closed set of variants.
//!
//! [`Framing`] applies the record-boundary rule of the transport in use.

mod codec;
mod types;

pub use codec::*;
pub use types::*;
