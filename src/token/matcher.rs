//! Token issuer interface and an in-process implementation.
//!
//! Real deployments authenticate users and pick servers in a separate
//! service; the core only consumes its output. [`LocalMatcher`] stands in
//! for that service in tests and demos.

use std::net::SocketAddr;

use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroize;

use super::connect_token::ConnectToken;
use crate::core::{
    CryptoError, Time, TokenError, DEFAULT_PROTOCOL_ID, DEFAULT_TOKEN_LIFETIME, KEY_BYTES,
};
use crate::crypto::{CryptoContext, Key, TokenNonce};

/// Errors from a match request.
#[derive(Debug, Error)]
pub enum MatchError {
    /// No server is registered with the issuer.
    #[error("no servers available")]
    NoServersAvailable,

    /// Building the token failed.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// Key derivation failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Producer of connect tokens.
pub trait Matcher {
    /// Issue a token authorising `client_id` to connect, valid from `time`.
    fn request_match(&mut self, client_id: u64, time: Time) -> Result<ConnectToken, MatchError>;
}

/// Derive the two directional session keys from a per-match secret.
///
/// ```text
/// c2s || s2c = HKDF-SHA256(salt = nonce, ikm = secret, info = "netcode v1 session keys", 64)
/// ```
pub fn derive_session_keys(
    secret: &[u8; KEY_BYTES],
    nonce: &TokenNonce,
) -> Result<(Key, Key), CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(&nonce.as_bytes()[..]), &secret[..]);
    let mut key_material = [0u8; 2 * KEY_BYTES];
    hk.expand(b"netcode v1 session keys", &mut key_material)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;

    let mut client_to_server = [0u8; KEY_BYTES];
    let mut server_to_client = [0u8; KEY_BYTES];
    client_to_server.copy_from_slice(&key_material[..KEY_BYTES]);
    server_to_client.copy_from_slice(&key_material[KEY_BYTES..]);
    key_material.zeroize();

    Ok((
        Key::from_bytes(client_to_server),
        Key::from_bytes(server_to_client),
    ))
}

/// In-process issuer sharing a private key with the servers it lists.
pub struct LocalMatcher {
    protocol_id: u64,
    private_key: Key,
    server_addresses: Vec<SocketAddr>,
    token_lifetime: f64,
    crypto: CryptoContext,
}

impl LocalMatcher {
    /// Create an issuer with no servers registered.
    pub fn new(private_key: Key, crypto: CryptoContext) -> Self {
        Self {
            protocol_id: DEFAULT_PROTOCOL_ID,
            private_key,
            server_addresses: Vec::new(),
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            crypto,
        }
    }

    /// Set the protocol id tokens are bound to.
    pub fn protocol_id(mut self, protocol_id: u64) -> Self {
        self.protocol_id = protocol_id;
        self
    }

    /// Set how long issued tokens stay valid.
    pub fn token_lifetime(mut self, lifetime: f64) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    /// Register a server address handed out in tokens.
    pub fn add_server_address(&mut self, address: SocketAddr) {
        self.server_addresses.push(address);
    }

    /// Registered server addresses.
    pub fn server_addresses(&self) -> &[SocketAddr] {
        &self.server_addresses
    }
}

impl Matcher for LocalMatcher {
    fn request_match(&mut self, client_id: u64, time: Time) -> Result<ConnectToken, MatchError> {
        if self.server_addresses.is_empty() {
            return Err(MatchError::NoServersAvailable);
        }

        let mut secret = [0u8; KEY_BYTES];
        self.crypto.fill_bytes(&mut secret);
        let salt = self.crypto.generate_nonce();
        let keys = derive_session_keys(&secret, &salt);
        secret.zeroize();
        let (client_to_server_key, server_to_client_key) = keys?;

        let token = ConnectToken::generate(
            client_id,
            self.server_addresses.clone(),
            client_to_server_key,
            server_to_client_key,
            time + self.token_lifetime,
            self.protocol_id,
            &self.private_key,
            &mut self.crypto,
        )?;

        tracing::debug!(
            client_id,
            expire = token.expire_timestamp,
            servers = token.server_addresses.len(),
            "issued connect token"
        );
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{validate_connect_token, TokenValidation};

    #[test]
    fn test_no_servers() {
        let mut crypto = CryptoContext::from_seed(21);
        let key = crypto.generate_key();
        let mut matcher = LocalMatcher::new(key, crypto);
        assert!(matches!(
            matcher.request_match(1, 0.0),
            Err(MatchError::NoServersAvailable)
        ));
    }

    #[test]
    fn test_issued_token_validates() {
        let mut crypto = CryptoContext::from_seed(22);
        let key = crypto.generate_key();
        let mut matcher = LocalMatcher::new(key.clone(), crypto).token_lifetime(10.0);
        matcher.add_server_address("[::1]:40000".parse().unwrap());

        let token = matcher.request_match(7, 100.0).unwrap();
        assert_eq!(token.expire_timestamp, 110.0);
        assert_ne!(token.client_to_server_key, token.server_to_client_key);

        let result = validate_connect_token(
            &token.private_data,
            &token.nonce,
            token.expire_timestamp,
            DEFAULT_PROTOCOL_ID,
            &key,
            105.0,
        );
        assert!(matches!(result, TokenValidation::Accepted(p) if p.client_id == 7));
    }

    #[test]
    fn test_derive_session_keys_deterministic() {
        let secret = [0x11; KEY_BYTES];
        let nonce = TokenNonce::from_bytes([0x22; 24]);
        let (a1, b1) = derive_session_keys(&secret, &nonce).unwrap();
        let (a2, b2) = derive_session_keys(&secret, &nonce).unwrap();
        assert_eq!(a1, a2);
        assert_eq!(b1, b2);
        assert_ne!(a1, b1);
    }
}
