//! netcode-protocol - Transport Layer
//!
//! Moves packets between endpoints over an unreliable datagram network:
//!
//! - **Packet codec**: the [`Packet`] sum type and its wire format
//! - **Encryption mappings**: per-peer keys, sequence numbers and replay
//!   windows ([`EncryptionManager`])
//! - **Network emulation**: loss, duplication, latency and jitter
//!   ([`NetworkSimulator`])
//! - **Sockets**: the poll-style [`DatagramSocket`] trait, with an in-memory
//!   [`LoopbackNetwork`] and a mio-backed `UdpSocket` (feature `udp`)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Client / Server state            │
//! ├─────────────────────────────────────────┤
//! │            Transport                    │  ← This module
//! │  seal on enqueue, open + replay on read │
//! ├─────────────────────────────────────────┤
//! │         NetworkSimulator                │
//! ├─────────────────────────────────────────┤
//! │     UDP socket / loopback network       │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Unauthenticated, malformed or replayed datagrams never surface as errors
//! to the layers above; they are counted in [`TransportCounters`] and dropped.

mod encryption;
mod error;
mod loopback;
mod packet;
mod simulator;
mod socket;
#[allow(clippy::module_inception)]
mod transport;

pub use encryption::*;
pub use error::*;
pub use loopback::*;
pub use packet::*;
pub use simulator::*;
pub use socket::*;
pub use transport::*;
