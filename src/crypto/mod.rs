//! netcode-protocol - Security Layer
//!
//! Implements the cryptographic envelope around every packet:
//! - Key and nonce types with zeroize-on-drop
//! - XChaCha20-Poly1305 AEAD seal/open
//! - Per-packet nonce construction from sequence numbers
//! - Anti-replay sliding window
//! - [`CryptoContext`], the explicit randomness resource handed to constructors

mod aead;
mod context;
mod nonce;
mod replay;

pub use aead::*;
pub use context::*;
pub use nonce::*;
pub use replay::*;
