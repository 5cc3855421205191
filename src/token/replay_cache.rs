//! Server-side memory of connect tokens already presented.
//!
//! Keyed by `(client_id, nonce)`. Each entry remembers the address that
//! first presented the token and whether a session was built from it, and
//! lives until the token itself expires. Live entries are never evicted: a
//! full cache refuses new tokens instead, so memory is bounded by
//! `capacity` without ever forgetting an unexpired token.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::core::Time;
use crate::crypto::TokenNonce;

/// Outcome of presenting a token to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayCheck {
    /// First time this token was seen.
    Fresh,
    /// Same token again from the same address before any session was
    /// built from it: a retransmitted request.
    Retransmit,
    /// Token already spent, or presented from a different address.
    Replayed,
    /// Every slot holds an unexpired token; nothing was recorded.
    Full,
}

#[derive(Debug, Clone)]
struct Entry {
    address: SocketAddr,
    expire_timestamp: Time,
    consumed: bool,
}

/// Bounded, expiry-evicted set of presented tokens.
#[derive(Debug)]
pub struct ReplayCache {
    capacity: usize,
    entries: HashMap<(u64, TokenNonce), Entry>,
}

impl ReplayCache {
    /// Create a cache holding at most `capacity` tokens (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Look up a token and record it if new.
    pub fn check_and_insert(
        &mut self,
        client_id: u64,
        nonce: TokenNonce,
        address: SocketAddr,
        expire_timestamp: Time,
        time: Time,
    ) -> ReplayCheck {
        self.purge_expired(time);

        let key = (client_id, nonce);
        if let Some(entry) = self.entries.get(&key) {
            return if !entry.consumed && entry.address == address {
                ReplayCheck::Retransmit
            } else {
                ReplayCheck::Replayed
            };
        }

        if self.entries.len() >= self.capacity {
            tracing::debug!(client_id, capacity = self.capacity, "replay cache full, refusing token");
            return ReplayCheck::Full;
        }

        self.entries.insert(
            key,
            Entry {
                address,
                expire_timestamp,
                consumed: false,
            },
        );
        ReplayCheck::Fresh
    }

    /// Mark a token as spent by a session at `address`.
    ///
    /// Returns `false` if the token is unknown, already spent, or was
    /// first presented from another address; no session may be built
    /// from it then.
    pub fn consume(&mut self, client_id: u64, nonce: TokenNonce, address: SocketAddr) -> bool {
        match self.entries.get_mut(&(client_id, nonce)) {
            Some(entry) if !entry.consumed && entry.address == address => {
                entry.consumed = true;
                true
            }
            _ => false,
        }
    }

    /// Drop every entry whose token expired before `time`.
    pub fn purge_expired(&mut self, time: Time) {
        self.entries.retain(|_, entry| entry.expire_timestamp >= time);
    }

    /// Number of remembered tokens.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no tokens are remembered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
