//! Challenge tokens.
//!
//! After validating a connect token the server does not allocate a slot
//! yet. It seals what it learned into a challenge token under its own random
//! challenge key and sends it to the client. Only a client that can decrypt
//! the challenge packet (i.e. holds the server -> client key) can echo the
//! token back, and only then is a slot committed.

use crate::core::{
    CodecError, TokenError, WireReader, WireWriter, CHALLENGE_TOKEN_BYTES, KEY_BYTES, MAC_BYTES,
    NONCE_BYTES,
};
use crate::crypto::{decrypt, encrypt, packet_nonce, Key, TokenNonce};

/// Size of the challenge token plaintext before sealing.
pub const CHALLENGE_TOKEN_PRIVATE_BYTES: usize = CHALLENGE_TOKEN_BYTES - MAC_BYTES;

/// Server state carried through the client during negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeToken {
    /// Client the challenge was issued to.
    pub client_id: u64,
    /// Nonce of the connect token that produced this challenge.
    pub connect_token_nonce: TokenNonce,
    /// Key for client -> server packets.
    pub client_to_server_key: Key,
    /// Key for server -> client packets.
    pub server_to_client_key: Key,
}

impl ChallengeToken {
    /// Serialize to the fixed-size plaintext.
    pub fn write(&self) -> Result<Vec<u8>, CodecError> {
        let mut writer = WireWriter::with_capacity(CHALLENGE_TOKEN_PRIVATE_BYTES);
        writer.write_u64(self.client_id);
        writer.write_bytes(self.connect_token_nonce.as_bytes());
        writer.write_bytes(self.client_to_server_key.as_bytes());
        writer.write_bytes(self.server_to_client_key.as_bytes());
        writer.pad_to(CHALLENGE_TOKEN_PRIVATE_BYTES)?;
        Ok(writer.into_bytes())
    }

    /// Parse the plaintext written by [`ChallengeToken::write`].
    pub fn read(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = WireReader::new(bytes);
        Ok(Self {
            client_id: reader.read_u64()?,
            connect_token_nonce: TokenNonce::from_bytes(reader.read_array::<NONCE_BYTES>()?),
            client_to_server_key: Key::from_bytes(reader.read_array::<KEY_BYTES>()?),
            server_to_client_key: Key::from_bytes(reader.read_array::<KEY_BYTES>()?),
        })
    }

    /// Seal under the server's challenge key; `sequence` must never repeat
    /// for the same key.
    pub fn seal(&self, sequence: u64, challenge_key: &Key) -> Result<Vec<u8>, TokenError> {
        let plaintext = self.write()?;
        Ok(encrypt(challenge_key, &packet_nonce(sequence), &[], &plaintext)?)
    }

    /// Open a sealed challenge token. Any failure is [`TokenError::Malformed`].
    pub fn open(sealed: &[u8], sequence: u64, challenge_key: &Key) -> Result<Self, TokenError> {
        if sealed.len() != CHALLENGE_TOKEN_BYTES {
            return Err(TokenError::Malformed);
        }
        let plaintext = decrypt(challenge_key, &packet_nonce(sequence), &[], sealed)
            .map_err(|_| TokenError::Malformed)?;
        Self::read(&plaintext).map_err(|_| TokenError::Malformed)
    }
}
