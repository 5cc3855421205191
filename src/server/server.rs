//! Multi-session server.
//!
//! The server owns a fixed pool of session slots. A slot is committed only
//! once a client has answered the challenge, so spoofed requests never
//! consume capacity. Invalid tokens and unauthenticated packets are dropped
//! without reply; a full pool is the only condition answered with a denial.

use std::collections::VecDeque;
use std::net::SocketAddr;

use thiserror::Error;

use crate::core::{Time, MAX_CLIENTS, MAX_PAYLOAD_BYTES, NUM_DISCONNECT_PACKETS};
use crate::crypto::{CryptoContext, Key};
use crate::token::{
    validate_connect_token, ChallengeToken, ReplayCache, ReplayCheck, TokenValidation,
};
use crate::transport::{Challenge, ConnectionRequest, Packet, Transport, TransportError};

use super::config::ServerConfig;
use super::session::{ServerSession, SlotPool};

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The transport failed to bind.
    #[error("transport unavailable")]
    TransportUnavailable,

    /// No session in that slot.
    #[error("no client in slot {0}")]
    NoSuchClient(usize),

    /// Payload exceeds `MAX_PAYLOAD_BYTES`.
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Transport refused the packet.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client sent a disconnect packet.
    ClientDisconnected,
    /// Nothing heard from the client for `connection_timeout`.
    TimedOut,
    /// Disconnected through [`Server::disconnect_client`].
    Kicked,
    /// The server was stopped.
    ServerStopped,
}

/// Session lifecycle notifications, drained with [`Server::poll_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A client completed the handshake.
    ClientConnected {
        /// Slot index.
        client_index: usize,
        /// Client identifier from the token.
        client_id: u64,
        /// Client address.
        address: SocketAddr,
    },
    /// A session ended and its slot was freed.
    ClientDisconnected {
        /// Slot index.
        client_index: usize,
        /// Client identifier from the token.
        client_id: u64,
        /// Why.
        reason: DisconnectReason,
    },
}

/// A netcode server.
///
/// # Example
///
/// ```
/// use netcode_protocol::crypto::{CryptoContext, Key};
/// use netcode_protocol::server::{Server, ServerConfigBuilder};
/// use netcode_protocol::transport::{LoopbackNetwork, Transport, TransportConfig};
///
/// let network = LoopbackNetwork::new();
/// let address = "[::1]:40000".parse().unwrap();
/// let transport = Transport::bind_loopback(&network, address, TransportConfig::default(), 0.0);
///
/// let mut crypto = CryptoContext::from_seed(1);
/// let config = ServerConfigBuilder::new(Key::from_bytes([7; 32]))
///     .max_clients(8)
///     .build();
/// let mut server = Server::new(transport, config, &mut crypto, 0.0).unwrap();
/// server.set_server_address(address);
/// server.start().unwrap();
/// assert!(server.is_running());
/// ```
#[derive(Debug)]
pub struct Server {
    transport: Transport,
    config: ServerConfig,
    time: Time,
    running: bool,
    server_address: Option<SocketAddr>,
    challenge_key: Key,
    challenge_sequence: u64,
    slots: SlotPool<ServerSession>,
    replay_cache: ReplayCache,
    events: VecDeque<ServerEvent>,
}

impl Server {
    /// Create a stopped server.
    pub fn new(
        transport: Transport,
        config: ServerConfig,
        crypto: &mut CryptoContext,
        time: Time,
    ) -> Result<Self, ServerError> {
        config
            .protocol
            .validate()
            .map_err(|e| ServerError::InvalidConfig(e.to_string()))?;
        if config.max_clients == 0 || config.max_clients > MAX_CLIENTS {
            return Err(ServerError::InvalidConfig(format!(
                "max_clients must be in 1..={MAX_CLIENTS}, got {}",
                config.max_clients
            )));
        }
        if transport.protocol_id() != config.protocol.protocol_id {
            return Err(ServerError::InvalidConfig(format!(
                "transport protocol id {:#x} does not match server protocol id {:#x}",
                transport.protocol_id(),
                config.protocol.protocol_id
            )));
        }

        let mut transport = transport;
        transport.advance_time(time);
        Ok(Self {
            transport,
            slots: SlotPool::new(config.max_clients),
            replay_cache: ReplayCache::new(config.replay_cache_capacity),
            config,
            time,
            running: false,
            server_address: None,
            challenge_key: crypto.generate_key(),
            challenge_sequence: 0,
            events: VecDeque::new(),
        })
    }

    /// Set the public address connect tokens must list for this server.
    pub fn set_server_address(&mut self, address: SocketAddr) {
        self.server_address = Some(address);
    }

    /// Address tokens are matched against.
    pub fn server_address(&self) -> Option<SocketAddr> {
        self.server_address
    }

    /// Begin accepting connections.
    ///
    /// Without an explicit [`Server::set_server_address`], the transport's
    /// bound address is used.
    pub fn start(&mut self) -> Result<(), ServerError> {
        if self.transport.error().is_some() {
            return Err(ServerError::TransportUnavailable);
        }
        if self.server_address.is_none() {
            self.server_address = self.transport.local_addr();
        }
        self.running = true;
        tracing::info!(
            address = ?self.server_address,
            max_clients = self.config.max_clients,
            "server started"
        );
        Ok(())
    }

    /// Free every slot and stop accepting connections.
    ///
    /// Nothing is sent: queued and in-flight packets are discarded along
    /// with all session keys. The listening address is forgotten, but the
    /// socket stays bound until the `Server` is dropped. Spent tokens stay
    /// in the replay cache so they cannot be reused after a restart.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        for index in self.slots.occupied() {
            self.free_slot(index, DisconnectReason::ServerStopped);
        }
        self.slots.clear();
        self.transport.reset();
        self.server_address = None;
        self.running = false;
        tracing::info!("server stopped");
    }

    /// Whether the server accepts connections.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Queue keep-alives for every session that has been quiet on the send
    /// side for `keep_alive_interval`.
    pub fn send_packets(&mut self) {
        if !self.running {
            return;
        }
        let interval = self.config.protocol.keep_alive_interval;
        let max_clients = self.config.max_clients as u32;
        for (index, session) in self.slots.iter_mut() {
            if self.time - session.last_packet_send_time < interval {
                continue;
            }
            let packet = Packet::KeepAlive {
                client_index: index as u32,
                max_clients,
            };
            match self.transport.enqueue_send(session.address, &packet) {
                Ok(()) => session.last_packet_send_time = self.time,
                Err(e) => tracing::trace!(client_index = index, error = %e, "keep-alive not sent"),
            }
        }
    }

    /// Process everything the transport received this tick.
    pub fn receive_packets(&mut self) {
        while let Some((from, packet)) = self.transport.receive_packet() {
            if !self.running {
                continue;
            }
            match packet {
                Packet::ConnectionRequest(request) => self.process_connection_request(from, request),
                Packet::ConnectionResponse(challenge) => {
                    self.process_connection_response(from, challenge)
                }
                Packet::KeepAlive { .. } => {
                    if let Some(index) = self.find_client_by_address(&from) {
                        self.touch(index);
                    }
                }
                Packet::Payload(data) => {
                    if let Some(index) = self.find_client_by_address(&from) {
                        self.touch(index);
                        if let Some(session) = self.slots.get_mut(index) {
                            session.push_payload(data);
                        }
                    }
                }
                Packet::Disconnect => {
                    if let Some(index) = self.find_client_by_address(&from) {
                        tracing::info!(client_index = index, %from, "client disconnected");
                        self.free_slot(index, DisconnectReason::ClientDisconnected);
                    }
                }
                Packet::ConnectionDenied | Packet::ConnectionChallenge(_) => {
                    tracing::trace!(%from, "ignoring server-bound packet type");
                }
            }
        }
    }

    fn process_connection_request(&mut self, from: SocketAddr, request: ConnectionRequest) {
        let token = match validate_connect_token(
            &request.token_data,
            &request.token_nonce,
            request.expire_timestamp,
            self.config.protocol.protocol_id,
            &self.config.private_key,
            self.time,
        ) {
            TokenValidation::Accepted(token) => token,
            TokenValidation::Expired => {
                tracing::debug!(%from, "connect token expired");
                return;
            }
            TokenValidation::Malformed => {
                tracing::debug!(%from, "connect token failed to validate");
                return;
            }
        };

        let Some(server_address) = self.server_address else {
            return;
        };
        if !token.server_addresses.contains(&server_address) {
            tracing::debug!(%from, %server_address, "connect token not issued for this server");
            return;
        }

        if self.find_client_by_address(&from).is_some() {
            tracing::trace!(%from, "request from connected address ignored");
            return;
        }
        if self.find_client_by_id(token.client_id).is_some() {
            tracing::debug!(%from, client_id = token.client_id, "client id already connected");
            return;
        }

        match self.replay_cache.check_and_insert(
            token.client_id,
            request.token_nonce,
            from,
            request.expire_timestamp,
            self.time,
        ) {
            ReplayCheck::Fresh | ReplayCheck::Retransmit => {}
            ReplayCheck::Replayed => {
                tracing::debug!(%from, client_id = token.client_id, "connect token replayed");
                return;
            }
            ReplayCheck::Full => return,
        }

        self.transport.add_encryption_mapping(
            from,
            token.server_to_client_key.clone(),
            token.client_to_server_key.clone(),
        );

        if self.slots.is_full() {
            self.deny(from);
            return;
        }

        let challenge = ChallengeToken {
            client_id: token.client_id,
            connect_token_nonce: request.token_nonce,
            client_to_server_key: token.client_to_server_key,
            server_to_client_key: token.server_to_client_key,
        };
        let sequence = self.challenge_sequence;
        self.challenge_sequence += 1;
        let token_data = match challenge.seal(sequence, &self.challenge_key) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(error = %e, "failed to seal challenge token");
                return;
            }
        };

        let packet = Packet::ConnectionChallenge(Challenge {
            sequence,
            token_data,
        });
        match self.transport.enqueue_send(from, &packet) {
            Ok(()) => tracing::debug!(%from, client_id = challenge.client_id, "sent connection challenge"),
            Err(e) => tracing::trace!(%from, error = %e, "challenge not sent"),
        }
    }

    fn process_connection_response(&mut self, from: SocketAddr, response: Challenge) {
        let challenge =
            match ChallengeToken::open(&response.token_data, response.sequence, &self.challenge_key) {
                Ok(challenge) => challenge,
                Err(_) => {
                    tracing::debug!(%from, "challenge token failed to open");
                    return;
                }
            };

        if let Some(index) = self.find_client_by_address(&from) {
            // The client missed the accept; say it again.
            if self.slots.get(index).is_some_and(|s| s.client_id == challenge.client_id) {
                self.send_accept(index);
            }
            return;
        }
        if self.find_client_by_id(challenge.client_id).is_some() {
            tracing::debug!(%from, client_id = challenge.client_id, "client id already connected");
            return;
        }

        if self.slots.is_full() {
            self.deny(from);
            return;
        }

        // A token builds at most one session, ever.
        if !self
            .replay_cache
            .consume(challenge.client_id, challenge.connect_token_nonce, from)
        {
            tracing::debug!(%from, client_id = challenge.client_id, "connect token already spent");
            return;
        }

        self.transport.add_encryption_mapping(
            from,
            challenge.server_to_client_key.clone(),
            challenge.client_to_server_key.clone(),
        );
        let session = ServerSession::new(
            challenge.client_id,
            from,
            challenge.connect_token_nonce,
            challenge.client_to_server_key,
            challenge.server_to_client_key,
            self.time,
        );
        let Ok(index) = self.slots.allocate(session) else {
            self.deny(from);
            return;
        };

        tracing::info!(
            client_index = index,
            client_id = challenge.client_id,
            %from,
            "client connected"
        );
        self.events.push_back(ServerEvent::ClientConnected {
            client_index: index,
            client_id: challenge.client_id,
            address: from,
        });
        self.send_accept(index);
    }

    fn send_accept(&mut self, index: usize) {
        let max_clients = self.config.max_clients as u32;
        let Some(session) = self.slots.get_mut(index) else {
            return;
        };
        let packet = Packet::KeepAlive {
            client_index: index as u32,
            max_clients,
        };
        match self.transport.enqueue_send(session.address, &packet) {
            Ok(()) => session.last_packet_send_time = self.time,
            Err(e) => tracing::trace!(client_index = index, error = %e, "accept not sent"),
        }
    }

    fn deny(&mut self, address: SocketAddr) {
        tracing::debug!(%address, "server full, denying connection");
        if let Err(e) = self.transport.enqueue_send(address, &Packet::ConnectionDenied) {
            tracing::trace!(%address, error = %e, "denial not sent");
        }
    }

    fn touch(&mut self, index: usize) {
        if let Some(session) = self.slots.get_mut(index) {
            session.on_receive(self.time);
        }
    }

    /// Free the slot of every client silent for longer than
    /// `connection_timeout`. The client is not notified.
    pub fn check_for_timeouts(&mut self) {
        if !self.running {
            return;
        }
        let timeout = self.config.protocol.connection_timeout;
        let timed_out: Vec<usize> = self
            .slots
            .iter()
            .filter(|(_, session)| session.is_timed_out(self.time, timeout))
            .map(|(index, _)| index)
            .collect();
        for index in timed_out {
            tracing::info!(client_index = index, "client timed out");
            self.free_slot(index, DisconnectReason::TimedOut);
        }
    }

    /// Send a burst of disconnect packets to one client and free its slot.
    pub fn disconnect_client(&mut self, client_index: usize) -> Result<(), ServerError> {
        let address = self
            .slots
            .get(client_index)
            .map(|s| s.address)
            .ok_or(ServerError::NoSuchClient(client_index))?;

        tracing::info!(client_index, %address, "disconnecting client");
        for _ in 0..NUM_DISCONNECT_PACKETS {
            if let Err(e) = self.transport.enqueue_send(address, &Packet::Disconnect) {
                tracing::debug!(client_index, error = %e, "disconnect packet not sent");
                break;
            }
        }
        self.free_slot(client_index, DisconnectReason::Kicked);
        Ok(())
    }

    /// Disconnect every client.
    pub fn disconnect_all_clients(&mut self) {
        for index in self.slots.occupied() {
            // Index comes from the occupied list.
            let _ = self.disconnect_client(index);
        }
    }

    fn free_slot(&mut self, index: usize, reason: DisconnectReason) {
        let Some(session) = self.slots.release(index) else {
            return;
        };
        self.transport.remove_encryption_mapping(&session.address);
        self.events.push_back(ServerEvent::ClientDisconnected {
            client_index: index,
            client_id: session.client_id,
            reason,
        });
    }

    /// Queue application data for a client.
    ///
    /// Until the client confirms the session, each payload is preceded by a
    /// keep-alive so a lost accept cannot strand it.
    pub fn send_payload(&mut self, client_index: usize, data: &[u8]) -> Result<(), ServerError> {
        if data.len() > MAX_PAYLOAD_BYTES {
            return Err(ServerError::PayloadTooLarge(data.len()));
        }
        let (address, confirmed) = self
            .slots
            .get(client_index)
            .map(|s| (s.address, s.is_confirmed()))
            .ok_or(ServerError::NoSuchClient(client_index))?;

        if !confirmed {
            self.send_accept(client_index);
        }
        self.transport
            .enqueue_send(address, &Packet::Payload(data.to_vec()))?;
        if let Some(session) = self.slots.get_mut(client_index) {
            session.last_packet_send_time = self.time;
        }
        Ok(())
    }

    /// Next payload received from a client.
    pub fn receive_payload(&mut self, client_index: usize) -> Option<Vec<u8>> {
        self.slots.get_mut(client_index)?.pop_payload()
    }

    /// Next lifecycle event.
    pub fn poll_event(&mut self) -> Option<ServerEvent> {
        self.events.pop_front()
    }

    /// Push the logical time for the next tick.
    pub fn advance_time(&mut self, time: Time) {
        self.time = time;
        self.transport.advance_time(time);
    }

    /// Logical time of the current tick.
    pub fn time(&self) -> Time {
        self.time
    }

    /// Occupied slots.
    pub fn num_connected_clients(&self) -> usize {
        self.slots.len()
    }

    /// Slot capacity.
    pub fn max_clients(&self) -> usize {
        self.config.max_clients
    }

    /// Whether a slot is occupied.
    pub fn is_client_connected(&self, client_index: usize) -> bool {
        self.slots.get(client_index).is_some()
    }

    /// Client id in a slot.
    pub fn client_id(&self, client_index: usize) -> Option<u64> {
        self.slots.get(client_index).map(|s| s.client_id)
    }

    /// Client address in a slot.
    pub fn client_address(&self, client_index: usize) -> Option<SocketAddr> {
        self.slots.get(client_index).map(|s| s.address)
    }

    /// Slot holding `client_id`.
    pub fn find_client_by_id(&self, client_id: u64) -> Option<usize> {
        self.slots.position(|s| s.client_id == client_id)
    }

    /// Slot holding `address`.
    pub fn find_client_by_address(&self, address: &SocketAddr) -> Option<usize> {
        self.slots.position(|s| s.address == *address)
    }

    /// Tokens currently remembered for replay detection.
    pub fn replay_cache_len(&self) -> usize {
        self.replay_cache.len()
    }

    /// Configuration in use.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The server's transport.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// The server's transport, mutable. The tick loop drives its
    /// `write_packets` / `read_packets`.
    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }
}
