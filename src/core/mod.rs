//! netcode-protocol - Core types, configuration, and constants.
//!
//! This module has no dependencies on the other layers and defines the
//! values every layer agrees on: logical time, wire sizes, timeouts, and
//! the error taxonomy.

mod codec;
mod config;
mod constants;
mod error;

pub use codec::*;
pub use config::*;
pub use constants::*;
pub use error::*;

/// Logical time in seconds.
///
/// Every timing decision in the crate is taken against a value of this type
/// that the caller pushes in explicitly; nothing reads a wall clock.
pub type Time = f64;
