//! XChaCha20-Poly1305 AEAD encryption.
//!
//! Used for three things: sealing connect tokens under the server private
//! key, sealing challenge tokens under the server's challenge key, and
//! sealing packet bodies under the directional session keys.

use std::fmt;

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use zeroize::Zeroize;

use crate::core::{CryptoError, KEY_BYTES, MAC_BYTES, NONCE_BYTES};

/// A symmetric key.
///
/// Zeroized on drop for security.
#[derive(Clone, PartialEq, Eq)]
pub struct Key {
    key: [u8; KEY_BYTES],
}

impl Key {
    /// Create a key from bytes.
    pub fn from_bytes(key: [u8; KEY_BYTES]) -> Self {
        Self { key }
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.key
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(..)")
    }
}

/// Nonce issued with each connect token.
///
/// Doubles as the AEAD nonce of the sealed token and as half of the
/// `(client_id, nonce)` replay-cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenNonce(pub [u8; NONCE_BYTES]);

impl TokenNonce {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; NONCE_BYTES]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_BYTES] {
        &self.0
    }
}

/// Encrypt plaintext using XChaCha20-Poly1305.
///
/// Returns ciphertext with the 16-byte Poly1305 tag appended.
pub fn encrypt(
    key: &Key,
    nonce: &[u8; NONCE_BYTES],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let xnonce = XNonce::from_slice(nonce);

    cipher
        .encrypt(xnonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::EncryptionFailed)
}

/// Decrypt ciphertext using XChaCha20-Poly1305.
///
/// Fails with [`CryptoError::DecryptionFailed`] on any authentication error.
pub fn decrypt(
    key: &Key,
    nonce: &[u8; NONCE_BYTES],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < MAC_BYTES {
        return Err(CryptoError::DecryptionFailed);
    }

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let xnonce = XNonce::from_slice(nonce);

    cipher
        .decrypt(xnonce, Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = Key::from_bytes([0x42; KEY_BYTES]);
        let nonce = [0x01; NONCE_BYTES];
        let aad = b"header";
        let plaintext = b"keep-alive";

        let ciphertext = encrypt(&key, &nonce, aad, plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + MAC_BYTES);

        let decrypted = decrypt(&key, &nonce, aad, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let key1 = Key::from_bytes([0x42; KEY_BYTES]);
        let key2 = Key::from_bytes([0x43; KEY_BYTES]);
        let nonce = [0x01; NONCE_BYTES];

        let ciphertext = encrypt(&key1, &nonce, &[], b"secret").unwrap();
        let result = decrypt(&key2, &nonce, &[], &ciphertext);

        assert_eq!(result, Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn test_decrypt_wrong_aad_fails() {
        let key = Key::from_bytes([0x42; KEY_BYTES]);
        let nonce = [0x01; NONCE_BYTES];

        let ciphertext = encrypt(&key, &nonce, b"aad-1", b"secret").unwrap();
        assert!(decrypt(&key, &nonce, b"aad-2", &ciphertext).is_err());
    }

    #[test]
    fn test_decrypt_truncated_fails() {
        let key = Key::from_bytes([0x42; KEY_BYTES]);
        let nonce = [0x01; NONCE_BYTES];
        assert!(decrypt(&key, &nonce, &[], &[0u8; MAC_BYTES - 1]).is_err());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = Key::from_bytes([0xAB; KEY_BYTES]);
        assert_eq!(format!("{:?}", key), "Key(..)");
    }
}
