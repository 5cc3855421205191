//! Protocol constants.
//!
//! Wire sizes are fixed by the protocol and MUST NOT be changed; timing
//! values here are only the defaults used by [`ClientServerConfig`].
//!
//! [`ClientServerConfig`]: super::ClientServerConfig

// =============================================================================
// CRYPTOGRAPHIC CONSTANTS
// =============================================================================

/// Symmetric key size (XChaCha20-Poly1305).
pub const KEY_BYTES: usize = 32;

/// XChaCha20 nonce size.
pub const NONCE_BYTES: usize = 24;

/// Poly1305 authentication tag size.
pub const MAC_BYTES: usize = 16;

// =============================================================================
// TOKENS
// =============================================================================

/// Size of the sealed connect token blob carried in a connection request.
pub const CONNECT_TOKEN_BYTES: usize = 1024;

/// Size of the sealed challenge token carried in challenge/response packets.
pub const CHALLENGE_TOKEN_BYTES: usize = 256;

/// Maximum number of candidate server addresses in one connect token.
pub const MAX_SERVERS_PER_CONNECT: usize = 8;

/// Default lifetime of a connect token issued by the local matcher.
pub const DEFAULT_TOKEN_LIFETIME: f64 = 30.0;

// =============================================================================
// PACKETS
// =============================================================================

/// Default protocol identifier, mixed into every authenticated packet.
pub const DEFAULT_PROTOCOL_ID: u64 = 0x1234_1651;

/// Packet header size (type + sequence).
pub const PACKET_HEADER_BYTES: usize = 1 + 8;

/// Largest payload carried in a single payload packet.
pub const MAX_PAYLOAD_BYTES: usize = 1024;

/// Largest datagram the transport will read or write.
pub const MAX_PACKET_BYTES: usize = 1500;

/// Number of redundant disconnect packets sent on a graceful disconnect.
pub const NUM_DISCONNECT_PACKETS: usize = 10;

// =============================================================================
// SERVER
// =============================================================================

/// Hard upper bound on concurrent sessions per server.
pub const MAX_CLIENTS: usize = 64;

/// Default number of remembered connect tokens for replay detection.
pub const DEFAULT_REPLAY_CACHE_CAPACITY: usize = 1024;

// =============================================================================
// TIMING DEFAULTS (logical seconds)
// =============================================================================

/// Interval between connection request / challenge response retransmits.
pub const CONNECTION_REQUEST_SEND_INTERVAL: f64 = 0.1;

/// Give up on a negotiation phase after this long without a reply.
pub const CONNECTION_NEGOTIATION_TIMEOUT: f64 = 5.0;

/// Send a keep-alive if nothing else was sent for this long.
pub const KEEP_ALIVE_INTERVAL: f64 = 1.0;

/// Consider a connected peer gone after this long without packets.
pub const CONNECTION_TIMEOUT: f64 = 5.0;

// =============================================================================
// TRANSPORT
// =============================================================================

/// Default anti-replay window size in sequence numbers.
pub const DEFAULT_REPLAY_WINDOW_SIZE: usize = 256;

/// Drop an encryption mapping after this long without traffic.
pub const ENCRYPTION_MAPPING_TIMEOUT: f64 = 10.0;

/// Default cap on datagrams drained from the socket per `read_packets`.
pub const MAX_PACKETS_PER_READ: usize = 256;
