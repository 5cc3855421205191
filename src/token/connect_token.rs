//! Connect token encoding, sealing, and validation.

use std::net::SocketAddr;

use crate::core::{
    CodecError, Time, TokenError, WireReader, WireWriter, CONNECT_TOKEN_BYTES, KEY_BYTES,
    MAC_BYTES, MAX_SERVERS_PER_CONNECT,
};
use crate::crypto::{decrypt, encrypt, CryptoContext, Key, TokenNonce};

/// Size of the private token plaintext before sealing.
pub const CONNECT_TOKEN_PRIVATE_BYTES: usize = CONNECT_TOKEN_BYTES - MAC_BYTES;

/// The part of a connect token only servers can read.
///
/// Plaintext layout (zero padded to [`CONNECT_TOKEN_PRIVATE_BYTES`]):
/// ```text
/// client_id (8) | n (1) | n x address | c2s key (32) | s2c key (32)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTokenPrivate {
    /// Unique client identifier.
    pub client_id: u64,
    /// Candidate servers, in the order the client tries them.
    pub server_addresses: Vec<SocketAddr>,
    /// Key for client -> server packets.
    pub client_to_server_key: Key,
    /// Key for server -> client packets.
    pub server_to_client_key: Key,
}

impl ConnectTokenPrivate {
    /// Serialize to the fixed-size plaintext.
    pub fn write(&self) -> Result<Vec<u8>, CodecError> {
        if self.server_addresses.len() > MAX_SERVERS_PER_CONNECT {
            return Err(CodecError::TooManyServerAddresses(self.server_addresses.len()));
        }

        let mut writer = WireWriter::with_capacity(CONNECT_TOKEN_PRIVATE_BYTES);
        writer.write_u64(self.client_id);
        writer.write_u8(self.server_addresses.len() as u8);
        for address in &self.server_addresses {
            writer.write_address(address);
        }
        writer.write_bytes(self.client_to_server_key.as_bytes());
        writer.write_bytes(self.server_to_client_key.as_bytes());
        writer.pad_to(CONNECT_TOKEN_PRIVATE_BYTES)?;
        Ok(writer.into_bytes())
    }

    /// Parse the plaintext written by [`ConnectTokenPrivate::write`].
    pub fn read(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = WireReader::new(bytes);
        let client_id = reader.read_u64()?;

        let count = reader.read_u8()? as usize;
        if count > MAX_SERVERS_PER_CONNECT {
            return Err(CodecError::TooManyServerAddresses(count));
        }
        let server_addresses = (0..count)
            .map(|_| reader.read_address())
            .collect::<Result<Vec<_>, _>>()?;

        let client_to_server_key = Key::from_bytes(reader.read_array::<KEY_BYTES>()?);
        let server_to_client_key = Key::from_bytes(reader.read_array::<KEY_BYTES>()?);

        Ok(Self {
            client_id,
            server_addresses,
            client_to_server_key,
            server_to_client_key,
        })
    }

    /// Seal under the issuer/server private key.
    ///
    /// The protocol id and expiry are authenticated as AAD, so a client
    /// cannot extend its own token.
    pub fn seal(
        &self,
        protocol_id: u64,
        expire_timestamp: Time,
        nonce: &TokenNonce,
        private_key: &Key,
    ) -> Result<Vec<u8>, TokenError> {
        let plaintext = self.write()?;
        let aad = token_aad(protocol_id, expire_timestamp);
        Ok(encrypt(private_key, nonce.as_bytes(), &aad, &plaintext)?)
    }

    /// Open a sealed token. Any failure is reported as [`TokenError::Malformed`].
    pub fn open(
        sealed: &[u8],
        protocol_id: u64,
        expire_timestamp: Time,
        nonce: &TokenNonce,
        private_key: &Key,
    ) -> Result<Self, TokenError> {
        if sealed.len() != CONNECT_TOKEN_BYTES {
            return Err(TokenError::Malformed);
        }

        let aad = token_aad(protocol_id, expire_timestamp);
        let plaintext = decrypt(private_key, nonce.as_bytes(), &aad, sealed)
            .map_err(|_| TokenError::Malformed)?;
        let token = Self::read(&plaintext).map_err(|_| TokenError::Malformed)?;

        if token.server_addresses.is_empty() {
            return Err(TokenError::Malformed);
        }
        Ok(token)
    }
}

/// AAD for a sealed connect token: `protocol_id LE | expire_timestamp LE`.
fn token_aad(protocol_id: u64, expire_timestamp: Time) -> [u8; 16] {
    let mut aad = [0u8; 16];
    aad[..8].copy_from_slice(&protocol_id.to_le_bytes());
    aad[8..].copy_from_slice(&expire_timestamp.to_le_bytes());
    aad
}

/// Everything the issuer hands to a client.
///
/// The public fields tell the client where to connect and which keys to use;
/// `private_data` is opaque to the client and forwarded verbatim in each
/// connection request.
#[derive(Debug, Clone)]
pub struct ConnectToken {
    /// Unique client identifier.
    pub client_id: u64,
    /// Logical time after which servers reject the token.
    pub expire_timestamp: Time,
    /// Per-issuance nonce.
    pub nonce: TokenNonce,
    /// Key for client -> server packets.
    pub client_to_server_key: Key,
    /// Key for server -> client packets.
    pub server_to_client_key: Key,
    /// Candidate servers, tried in order.
    pub server_addresses: Vec<SocketAddr>,
    /// Sealed [`ConnectTokenPrivate`], `CONNECT_TOKEN_BYTES` long.
    pub private_data: Vec<u8>,
}

impl ConnectToken {
    /// Build and seal a token.
    #[allow(clippy::too_many_arguments)]
    pub fn generate(
        client_id: u64,
        server_addresses: Vec<SocketAddr>,
        client_to_server_key: Key,
        server_to_client_key: Key,
        expire_timestamp: Time,
        protocol_id: u64,
        private_key: &Key,
        crypto: &mut CryptoContext,
    ) -> Result<Self, TokenError> {
        if server_addresses.is_empty() {
            return Err(TokenError::NoServerAddresses);
        }

        let nonce = crypto.generate_nonce();
        let private = ConnectTokenPrivate {
            client_id,
            server_addresses: server_addresses.clone(),
            client_to_server_key: client_to_server_key.clone(),
            server_to_client_key: server_to_client_key.clone(),
        };
        let private_data = private.seal(protocol_id, expire_timestamp, &nonce, private_key)?;

        Ok(Self {
            client_id,
            expire_timestamp,
            nonce,
            client_to_server_key,
            server_to_client_key,
            server_addresses,
            private_data,
        })
    }

    /// Whether the token is past its expiry at `time`.
    pub fn is_expired(&self, time: Time) -> bool {
        time > self.expire_timestamp
    }
}

/// Result of validating a presented connect token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValidation {
    /// Token authenticated and is still valid.
    Accepted(ConnectTokenPrivate),
    /// `time > expire_timestamp`.
    Expired,
    /// Authentication or parsing failed.
    Malformed,
}

/// Validate a token as presented in a connection request.
///
/// Expiry is checked first since it needs no decryption. Replay detection is
/// the caller's job and happens only on [`TokenValidation::Accepted`].
pub fn validate_connect_token(
    private_data: &[u8],
    nonce: &TokenNonce,
    expire_timestamp: Time,
    protocol_id: u64,
    private_key: &Key,
    time: Time,
) -> TokenValidation {
    if time > expire_timestamp {
        return TokenValidation::Expired;
    }

    match ConnectTokenPrivate::open(private_data, protocol_id, expire_timestamp, nonce, private_key)
    {
        Ok(token) => TokenValidation::Accepted(token),
        Err(_) => TokenValidation::Malformed,
    }
}
