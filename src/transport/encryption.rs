//! Per-peer packet keys.
//!
//! An encryption mapping binds a remote address to the two directional keys
//! of its session, the outgoing sequence counter, and the incoming replay
//! window. Mappings that see no traffic for `timeout` logical seconds are
//! expired, so half-finished handshakes do not pin memory forever.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::core::Time;
use crate::crypto::{Key, ReplayWindow};

/// Keys and sequence state for one peer.
#[derive(Debug)]
pub struct EncryptionMapping {
    send_key: Key,
    receive_key: Key,
    send_sequence: u64,
    replay_window: ReplayWindow,
    last_access: Time,
}

impl EncryptionMapping {
    fn new(send_key: Key, receive_key: Key, window_size: usize, time: Time) -> Self {
        Self {
            send_key,
            receive_key,
            send_sequence: 0,
            replay_window: ReplayWindow::new(window_size),
            last_access: time,
        }
    }

    /// Key sealing packets to this peer.
    pub fn send_key(&self) -> &Key {
        &self.send_key
    }

    /// Key opening packets from this peer.
    pub fn receive_key(&self) -> &Key {
        &self.receive_key
    }

    /// Claim the next outgoing sequence number.
    pub fn next_send_sequence(&mut self) -> u64 {
        let sequence = self.send_sequence;
        self.send_sequence += 1;
        sequence
    }

    /// Incoming replay window.
    pub fn replay_window(&self) -> &ReplayWindow {
        &self.replay_window
    }

    /// Incoming replay window, mutable.
    pub fn replay_window_mut(&mut self) -> &mut ReplayWindow {
        &mut self.replay_window
    }

    /// Last logical time the mapping was used.
    pub fn last_access(&self) -> Time {
        self.last_access
    }

    /// Mark the mapping as used at `time`.
    pub fn touch(&mut self, time: Time) {
        self.last_access = time;
    }
}

/// All encryption mappings of one transport.
#[derive(Debug)]
pub struct EncryptionManager {
    mappings: HashMap<SocketAddr, EncryptionMapping>,
    timeout: Time,
    window_size: usize,
}

impl EncryptionManager {
    /// Create an empty manager.
    pub fn new(timeout: Time, window_size: usize) -> Self {
        Self {
            mappings: HashMap::new(),
            timeout,
            window_size,
        }
    }

    /// Register keys for `address`.
    ///
    /// Re-adding the same keys only refreshes the mapping, so a retransmitted
    /// handshake does not reset sequence numbers. Different keys replace it.
    /// Returns `true` when a new mapping was installed.
    pub fn add(&mut self, address: SocketAddr, send_key: Key, receive_key: Key, time: Time) -> bool {
        if let Some(existing) = self.mappings.get_mut(&address) {
            if existing.send_key == send_key && existing.receive_key == receive_key {
                existing.touch(time);
                return false;
            }
        }
        self.mappings.insert(
            address,
            EncryptionMapping::new(send_key, receive_key, self.window_size, time),
        );
        true
    }

    /// Remove the mapping for `address`.
    pub fn remove(&mut self, address: &SocketAddr) -> bool {
        self.mappings.remove(address).is_some()
    }

    /// Move the mapping for `from` to `to`, keeping its send sequence.
    ///
    /// The replay window starts over: `to` is a different peer numbering
    /// its own packets. Returns `false` if `from` had no mapping.
    pub fn rebind(&mut self, from: &SocketAddr, to: SocketAddr, time: Time) -> bool {
        let Some(mut mapping) = self.mappings.remove(from) else {
            return false;
        };
        mapping.replay_window = ReplayWindow::new(self.window_size);
        mapping.touch(time);
        self.mappings.insert(to, mapping);
        true
    }

    /// Look up a mapping.
    pub fn get(&self, address: &SocketAddr) -> Option<&EncryptionMapping> {
        self.mappings.get(address)
    }

    /// Look up a mapping, mutable.
    pub fn get_mut(&mut self, address: &SocketAddr) -> Option<&mut EncryptionMapping> {
        self.mappings.get_mut(address)
    }

    /// Whether `address` has keys.
    pub fn contains(&self, address: &SocketAddr) -> bool {
        self.mappings.contains_key(address)
    }

    /// Drop mappings idle for longer than the timeout. Returns the removed
    /// addresses.
    pub fn expire(&mut self, time: Time) -> Vec<SocketAddr> {
        let timeout = self.timeout;
        let expired: Vec<SocketAddr> = self
            .mappings
            .iter()
            .filter(|(_, m)| time - m.last_access > timeout)
            .map(|(address, _)| *address)
            .collect();
        for address in &expired {
            self.mappings.remove(address);
        }
        expired
    }

    /// Number of mappings.
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Whether there are no mappings.
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Remove every mapping.
    pub fn clear(&mut self) {
        self.mappings.clear();
    }
}
