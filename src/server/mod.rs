//! netcode-protocol - Server
//!
//! Multi-session server: validates connect tokens, challenges clients,
//! commits session slots, and drives each slot's keep-alive and timeout.

mod config;
#[allow(clippy::module_inception)]
mod server;
mod session;

pub use config::*;
pub use server::*;
pub use session::*;
