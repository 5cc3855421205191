//! Transport layer error types.
//!
//! Everything except [`SocketError`] describes a single bad datagram and is
//! handled by silently dropping it: answering would tell an attacker which
//! guesses decrypted and which sessions exist.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::core::{CodecError, CryptoError};

/// Socket initialisation failure, reported once at construction.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Another socket is already bound to the address.
    #[error("address {0} already in use")]
    AddressInUse(SocketAddr),

    /// Any other bind or configuration failure.
    #[error("socket i/o error: {0}")]
    Io(#[from] io::Error),
}

impl SocketError {
    /// Classify a bind error for `address`.
    pub fn from_bind(address: SocketAddr, error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::AddrInUse {
            Self::AddressInUse(address)
        } else {
            Self::Io(error)
        }
    }
}

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket failed to initialise; the transport does nothing.
    #[error("transport unavailable: socket failed to initialise")]
    Unavailable,

    /// No keys registered for the peer.
    /// Per design: silently drop to prevent session enumeration.
    #[error("no encryption mapping for {0}")]
    NoEncryptionMapping(SocketAddr),

    /// Datagram or body failed to parse.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Sealing failed on send.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Invalid AEAD tag - packet authentication failed.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Sequence already seen or below the replay window.
    #[error("sequence replay detected")]
    Replay,

    /// Connection request for a different protocol.
    #[error("protocol id mismatch: {0:#x}")]
    ProtocolMismatch(u64),

    /// Socket send/receive failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Check if this error should result in silent drop (no response sent).
    pub fn is_silent_drop(&self) -> bool {
        matches!(
            self,
            TransportError::NoEncryptionMapping(_)
                | TransportError::Codec(_)
                | TransportError::AuthenticationFailed
                | TransportError::Replay
                | TransportError::ProtocolMismatch(_)
        )
    }
}
