//! Server session slots.
//!
//! Handles per-client session state including:
//! - A fixed-capacity slot arena with an explicit free list
//! - Per-session keys, liveness times and received payloads

use std::collections::VecDeque;
use std::net::SocketAddr;

use crate::core::Time;
use crate::crypto::{Key, TokenNonce};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Slot allocated and accept sent; no packet from the client since.
    Accepted,
    /// The client has sent at least one packet after the accept.
    Confirmed,
}

/// Per-client session.
#[derive(Debug)]
pub struct ServerSession {
    /// Client identifier from the connect token.
    pub client_id: u64,
    /// Client's address.
    pub address: SocketAddr,
    /// Nonce of the token that created the session.
    pub connect_token_nonce: TokenNonce,
    /// Key for client -> server packets.
    pub client_to_server_key: Key,
    /// Key for server -> client packets.
    pub server_to_client_key: Key,
    /// Last time a packet from the client was accepted.
    pub last_packet_receive_time: Time,
    /// Last time a packet was queued for the client.
    pub last_packet_send_time: Time,
    /// Session state.
    pub state: SessionState,
    payloads: VecDeque<Vec<u8>>,
}

impl ServerSession {
    /// Create a session accepted at `time`.
    pub fn new(
        client_id: u64,
        address: SocketAddr,
        connect_token_nonce: TokenNonce,
        client_to_server_key: Key,
        server_to_client_key: Key,
        time: Time,
    ) -> Self {
        Self {
            client_id,
            address,
            connect_token_nonce,
            client_to_server_key,
            server_to_client_key,
            last_packet_receive_time: time,
            last_packet_send_time: time,
            state: SessionState::Accepted,
            payloads: VecDeque::new(),
        }
    }

    /// Record a packet from the client.
    pub fn on_receive(&mut self, time: Time) {
        self.last_packet_receive_time = time;
        self.state = SessionState::Confirmed;
    }

    /// Whether the client acknowledged the accept.
    pub fn is_confirmed(&self) -> bool {
        self.state == SessionState::Confirmed
    }

    /// Whether nothing arrived for longer than `timeout`.
    pub fn is_timed_out(&self, time: Time, timeout: Time) -> bool {
        time - self.last_packet_receive_time > timeout
    }

    /// Queue a received payload.
    pub fn push_payload(&mut self, data: Vec<u8>) {
        self.payloads.push_back(data);
    }

    /// Take the oldest received payload.
    pub fn pop_payload(&mut self) -> Option<Vec<u8>> {
        self.payloads.pop_front()
    }
}

/// Fixed-capacity arena of slots with a free list.
///
/// Allocation hands out the lowest free index; both allocation and release
/// are O(1) apart from the index search done by callers.
#[derive(Debug)]
pub struct SlotPool<T> {
    slots: Vec<Option<T>>,
    /// Free indices, lowest on top.
    free: Vec<usize>,
}

impl<T> SlotPool<T> {
    /// Create a pool with `capacity` empty slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            free: (0..capacity).rev().collect(),
        }
    }

    /// Total slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Occupied slots.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether every slot is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether no slot is free.
    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Store `value` in a free slot. Returns `Err(value)` when full.
    pub fn allocate(&mut self, value: T) -> Result<usize, T> {
        let Some(index) = self.free.pop() else {
            return Err(value);
        };
        self.slots[index] = Some(value);
        Ok(index)
    }

    /// Empty a slot, returning what it held.
    pub fn release(&mut self, index: usize) -> Option<T> {
        let value = self.slots.get_mut(index)?.take()?;
        // Keep the lowest free index on top.
        let position = self.free.partition_point(|&i| i > index);
        self.free.insert(position, index);
        Some(value)
    }

    /// Borrow an occupied slot.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref()
    }

    /// Mutably borrow an occupied slot.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)?.as_mut()
    }

    /// Index of the first occupied slot matching `predicate`.
    pub fn position(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<usize> {
        self.iter().find(|(_, v)| predicate(v)).map(|(i, _)| i)
    }

    /// Occupied slots with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (i, v)))
    }

    /// Occupied slots with their indices, mutable.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|v| (i, v)))
    }

    /// Indices of occupied slots.
    pub fn occupied(&self) -> Vec<usize> {
        self.iter().map(|(i, _)| i).collect()
    }

    /// Empty every slot.
    pub fn clear(&mut self) {
        let capacity = self.slots.len();
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.free = (0..capacity).rev().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_pool_allocate_release() {
        let mut pool = SlotPool::new(3);
        assert_eq!(pool.allocate("a"), Ok(0));
        assert_eq!(pool.allocate("b"), Ok(1));
        assert_eq!(pool.allocate("c"), Ok(2));
        assert!(pool.is_full());
        assert_eq!(pool.allocate("d"), Err("d"));

        assert_eq!(pool.release(1), Some("b"));
        assert_eq!(pool.release(1), None);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.allocate("e"), Ok(1));
    }

    #[test]
    fn test_slot_pool_lowest_index_first() {
        let mut pool = SlotPool::new(4);
        for i in 0..4 {
            pool.allocate(i).unwrap();
        }
        pool.release(3);
        pool.release(0);
        pool.release(2);
        assert_eq!(pool.allocate(10), Ok(0));
        assert_eq!(pool.allocate(11), Ok(2));
        assert_eq!(pool.allocate(12), Ok(3));
    }

    #[test]
    fn test_slot_pool_lookup() {
        let mut pool = SlotPool::new(4);
        pool.allocate(5).unwrap();
        pool.allocate(7).unwrap();
        assert_eq!(pool.position(|&v| v == 7), Some(1));
        assert_eq!(pool.position(|&v| v == 9), None);
        assert_eq!(pool.get(5), None);
        *pool.get_mut(0).unwrap() = 6;
        assert_eq!(pool.occupied(), vec![0, 1]);
        assert_eq!(pool.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![6, 7]);

        pool.clear();
        assert!(pool.is_empty());
        assert_eq!(pool.allocate(1), Ok(0));
    }

    #[test]
    fn test_session_timeout_and_confirm() {
        let address: SocketAddr = "[::1]:50000".parse().unwrap();
        let key = Key::from_bytes([0; 32]);
        let mut session =
            ServerSession::new(1, address, TokenNonce::from_bytes([0; 24]), key.clone(), key, 10.0);

        assert!(!session.is_confirmed());
        assert!(!session.is_timed_out(15.0, 5.0));
        assert!(session.is_timed_out(15.5, 5.0));

        session.on_receive(15.0);
        assert!(session.is_confirmed());
        assert!(!session.is_timed_out(15.5, 5.0));
    }
}
