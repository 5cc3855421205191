//! # netcode-protocol
//!
//! Secure client/server session establishment and packet transport over
//! unreliable datagrams, for real-time applications such as games.
//!
//! - **Connect tokens**: an external issuer hands each client a token sealed
//!   under a key it shares with the servers; servers validate, challenge and
//!   only then commit a session slot
//! - **Encrypted packets**: every packet after the request is sealed with
//!   XChaCha20-Poly1305 under per-direction session keys, with a sliding
//!   replay window per peer
//! - **Silent drops**: malformed, forged, expired or replayed input never
//!   produces a reply
//! - **Logical time**: nothing reads a wall clock; every component acts on
//!   the time pushed into it, so runs are reproducible
//! - **Network emulation**: loss, duplication, latency and jitter on any
//!   transport
//!
//! ## Feature Flags
//!
//! - `udp` (default): real UDP sockets via mio
//! - `matcher` (default): [`token::LocalMatcher`], an in-process token issuer
//!
//! ## Modules
//!
//! - [`core`]: constants, timing configuration, codec, error types
//! - [`crypto`]: keys, AEAD, packet nonces, replay window, [`crypto::CryptoContext`]
//! - [`token`]: connect and challenge tokens, replay cache, issuer
//! - [`transport`]: packets, sockets, network emulation, [`transport::Transport`]
//! - [`client`]: [`client::Client`] state machine
//! - [`server`]: [`server::Server`] and its session slots
//! - [`sim`]: [`sim::Simulation`], the six-step tick
//!
//! ## Example Usage
//!
//! ```rust
//! use netcode_protocol::prelude::*;
//!
//! let network = LoopbackNetwork::new();
//! let server_addr = "[::1]:40000".parse().unwrap();
//! let client_addr = "[::1]:50000".parse().unwrap();
//! let private_key = Key::from_bytes([1; 32]);
//! let mut crypto = CryptoContext::from_seed(42);
//! let start = 100.0;
//!
//! let transport = Transport::bind_loopback(&network, server_addr, TransportConfig::default(), start);
//! let config = ServerConfigBuilder::new(private_key.clone()).max_clients(4).build();
//! let mut server = Server::new(transport, config, &mut crypto, start).unwrap();
//! server.set_server_address(server_addr);
//! server.start().unwrap();
//!
//! let c2s = crypto.generate_key();
//! let s2c = crypto.generate_key();
//! let token = ConnectToken::generate(
//!     7,
//!     vec![server_addr],
//!     c2s,
//!     s2c,
//!     start + 30.0,
//!     DEFAULT_PROTOCOL_ID,
//!     &private_key,
//!     &mut crypto,
//! )
//! .unwrap();
//!
//! let transport = Transport::bind_loopback(&network, client_addr, TransportConfig::default(), start);
//! let mut client = Client::new(transport, ClientServerConfig::default(), start).unwrap();
//! client.connect(token).unwrap();
//!
//! let mut sim = Simulation::new(server, 0.1);
//! sim.add_client(client);
//! sim.run_until(256, |s| s.server().num_connected_clients() == 1).unwrap();
//! assert!(sim.clients()[0].is_connected());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Security layer
pub mod crypto;

// Connect tokens and issuer
pub mod token;

// Transport layer
pub mod transport;

// Endpoints
pub mod client;
pub mod server;

// Tick orchestration
pub mod sim;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;

    pub use crate::crypto::{CryptoContext, Key, TokenNonce};

    pub use crate::token::{ConnectToken, TokenValidation};

    #[cfg(feature = "matcher")]
    pub use crate::token::{LocalMatcher, Matcher};

    #[cfg(feature = "udp")]
    pub use crate::transport::UdpSocket;
    pub use crate::transport::{
        DatagramSocket, LoopbackNetwork, NetworkConditions, Packet, SocketError, Transport,
        TransportConfig, TransportConfigBuilder, TransportCounters, TransportError,
    };

    pub use crate::client::{Client, ClientError, ClientState};

    pub use crate::server::{
        DisconnectReason, Server, ServerConfig, ServerConfigBuilder, ServerError, ServerEvent,
    };

    pub use crate::sim::{Simulation, SimulationClock};
}

// Re-export commonly used items at crate root
pub use crate::client::{Client, ClientState};
pub use crate::core::{ClientServerConfig, NetcodeError, Time};
pub use crate::server::{Server, ServerConfig};
pub use crate::transport::{NetworkConditions, Transport, TransportConfig};
