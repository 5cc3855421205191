//! Explicit crypto resource.
//!
//! There is no global library initialisation: anything that needs fresh
//! keys, nonces, or simulator randomness takes a `&mut CryptoContext`.

use rand::{rngs::StdRng, RngCore, SeedableRng};

use super::aead::{Key, TokenNonce};
use crate::core::{KEY_BYTES, NONCE_BYTES};

/// Source of key material and random values.
///
/// Backed by `StdRng` (a ChaCha-based CSPRNG). [`CryptoContext::new`]
/// seeds it from the operating system; [`CryptoContext::from_seed`] makes
/// every derived value reproducible, which the simulation tests rely on.
pub struct CryptoContext {
    rng: StdRng,
}

impl CryptoContext {
    /// Create a context seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a deterministic context.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate a fresh random key.
    pub fn generate_key(&mut self) -> Key {
        let mut key = [0u8; KEY_BYTES];
        self.rng.fill_bytes(&mut key);
        Key::from_bytes(key)
    }

    /// Generate a fresh token nonce.
    pub fn generate_nonce(&mut self) -> TokenNonce {
        let mut nonce = [0u8; NONCE_BYTES];
        self.rng.fill_bytes(&mut nonce);
        TokenNonce::from_bytes(nonce)
    }

    /// Fill `buf` with random bytes.
    pub fn fill_bytes(&mut self, buf: &mut [u8]) {
        self.rng.fill_bytes(buf);
    }

    /// Draw a random `u64` (used to seed per-transport simulators).
    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }
}

impl Default for CryptoContext {
    fn default() -> Self {
        Self::new()
    }
}
