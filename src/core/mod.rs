//! Core constants, traits, and error types (always included).

pub mod constants;
mod error;
mod traits;

pub use error::*;
pub use traits::*;
