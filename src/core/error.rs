//! Error types for netcode-protocol.
//!
//! Protocol violations (bad tags, replays, malformed bodies) are represented
//! here so that the transport can count and log them, but they never surface
//! through the client or server APIs: the packet is dropped silently.

use thiserror::Error;

/// Errors in the crypto layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD encryption failed.
    #[error("AEAD encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (invalid tag or corrupted).
    #[error("AEAD decryption failed (invalid tag or corrupted)")]
    DecryptionFailed,

    /// Key derivation failed.
    #[error("key derivation failed")]
    KeyDerivationFailed,
}

/// Errors reading or writing the wire format.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Buffer ended before the structure was complete.
    #[error("unexpected end of data")]
    UnexpectedEof,

    /// Unknown packet type discriminator.
    #[error("invalid packet type: {0:#04x}")]
    InvalidPacketType(u8),

    /// Unknown address family tag.
    #[error("invalid address type: {0}")]
    InvalidAddress(u8),

    /// Too many server addresses for one token.
    #[error("too many server addresses: {0}")]
    TooManyServerAddresses(usize),

    /// Payload exceeds the per-packet limit.
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Structure does not fit its fixed-size slot.
    #[error("encoded data does not fit: {0} bytes")]
    Overflow(usize),
}

/// Outcomes of connect token handling that reject the token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The token's expiry lies in the past.
    #[error("connect token expired")]
    Expired,

    /// The token failed authentication or does not parse.
    #[error("connect token malformed")]
    Malformed,

    /// The token lists no server addresses.
    #[error("connect token has no server addresses")]
    NoServerAddresses,

    /// Encoding error while building a token.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Sealing the token failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Top-level netcode errors.
#[derive(Debug, Error)]
pub enum NetcodeError {
    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Token error.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Socket initialisation error.
    #[error("socket error: {0}")]
    Socket(#[from] crate::transport::SocketError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    /// Client error.
    #[error("client error: {0}")]
    Client(#[from] crate::client::ClientError),

    /// Server error.
    #[error("server error: {0}")]
    Server(#[from] crate::server::ServerError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
