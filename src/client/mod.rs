//! netcode-protocol - Client
//!
//! Single-session state machine driven by the caller's tick loop:
//! [`Client::send_packets`], then the transport's write/read, then
//! [`Client::receive_packets`] and [`Client::check_for_timeout`].

#[allow(clippy::module_inception)]
mod client;

pub use client::*;
