//! Server configuration.

use crate::core::{ClientServerConfig, DEFAULT_REPLAY_CACHE_CAPACITY, MAX_CLIENTS};
use crate::crypto::Key;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Key shared with the token issuer; opens connect tokens.
    pub private_key: Key,

    /// Session slots, `1..=MAX_CLIENTS`.
    pub max_clients: usize,

    /// Upper bound on remembered `(client_id, nonce)` pairs.
    pub replay_cache_capacity: usize,

    /// Timing and protocol id, shared with clients.
    pub protocol: ClientServerConfig,
}

impl ServerConfig {
    /// Default configuration for the given private key.
    pub fn new(private_key: Key) -> Self {
        Self {
            private_key,
            max_clients: MAX_CLIENTS,
            replay_cache_capacity: DEFAULT_REPLAY_CACHE_CAPACITY,
            protocol: ClientServerConfig::default(),
        }
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Create a builder around the issuer-shared private key.
    pub fn new(private_key: Key) -> Self {
        Self {
            config: ServerConfig::new(private_key),
        }
    }

    /// Set the number of session slots.
    pub fn max_clients(mut self, max: usize) -> Self {
        self.config.max_clients = max;
        self
    }

    /// Set the replay cache capacity.
    pub fn replay_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.replay_cache_capacity = capacity;
        self
    }

    /// Set the protocol id.
    pub fn protocol_id(mut self, protocol_id: u64) -> Self {
        self.config.protocol.protocol_id = protocol_id;
        self
    }

    /// Replace the timing parameters.
    pub fn protocol(mut self, protocol: ClientServerConfig) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ServerConfig {
        self.config
    }
}
