//! Client connection state machine.

use std::collections::VecDeque;
use std::net::SocketAddr;

use thiserror::Error;

use crate::core::{ClientServerConfig, Time, MAX_PAYLOAD_BYTES, NUM_DISCONNECT_PACKETS};
use crate::token::ConnectToken;
use crate::transport::{Challenge, ConnectionRequest, Packet, Transport, TransportError};

/// Errors surfaced by client operations.
///
/// Protocol failures during a connection attempt are not errors; they show
/// up as a terminal [`ClientState`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The token lists no server to connect to.
    #[error("connect token has no server addresses")]
    NoServerAddresses,

    /// The token was already expired when `connect` was called.
    #[error("connect token expired")]
    TokenExpired,

    /// The transport failed to bind.
    #[error("transport unavailable")]
    TransportUnavailable,

    /// Operation requires an established connection.
    #[error("not connected")]
    NotConnected,

    /// Payload exceeds `MAX_PAYLOAD_BYTES`.
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Transport refused the packet.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Client connection state.
///
/// The first four states are terminal failures; a new `connect` call is
/// needed to leave them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// The token expired before the server accepted it.
    ConnectTokenExpired,
    /// No reply during negotiation, or silence while connected.
    ConnectionTimedOut,
    /// The server had no free slot.
    ConnectionDenied,
    /// The server ended the session.
    Disconnected,
    /// Not connected and not trying.
    Idle,
    /// Resending the connect token.
    SendingConnectionRequest,
    /// Echoing the server's challenge.
    SendingChallengeResponse,
    /// Session established.
    Connected,
}

impl ClientState {
    /// Whether a connection attempt is in progress.
    pub fn is_connecting(self) -> bool {
        matches!(
            self,
            ClientState::SendingConnectionRequest | ClientState::SendingChallengeResponse
        )
    }

    /// Whether this is a failure state.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            ClientState::ConnectTokenExpired
                | ClientState::ConnectionTimedOut
                | ClientState::ConnectionDenied
                | ClientState::Disconnected
        )
    }
}

/// A netcode client.
///
/// Owns its transport. Every timing decision uses the logical time last
/// pushed through [`Client::advance_time`].
#[derive(Debug)]
pub struct Client {
    transport: Transport,
    config: ClientServerConfig,
    state: ClientState,
    time: Time,
    token: Option<ConnectToken>,
    server_address_index: usize,
    server_address: Option<SocketAddr>,
    challenge: Option<Challenge>,
    client_index: Option<u32>,
    max_clients: u32,
    last_packet_send_time: Time,
    last_packet_receive_time: Time,
    payloads: VecDeque<Vec<u8>>,
}

impl Client {
    /// Create an idle client.
    pub fn new(transport: Transport, config: ClientServerConfig, time: Time) -> Result<Self, ClientError> {
        config
            .validate()
            .map_err(|e| ClientError::InvalidConfig(e.to_string()))?;
        if transport.protocol_id() != config.protocol_id {
            return Err(ClientError::InvalidConfig(format!(
                "transport protocol id {:#x} does not match client protocol id {:#x}",
                transport.protocol_id(),
                config.protocol_id
            )));
        }

        let mut transport = transport;
        transport.advance_time(time);
        Ok(Self {
            transport,
            config,
            state: ClientState::Idle,
            time,
            token: None,
            server_address_index: 0,
            server_address: None,
            challenge: None,
            client_index: None,
            max_clients: 0,
            last_packet_send_time: Time::NEG_INFINITY,
            last_packet_receive_time: time,
            payloads: VecDeque::new(),
        })
    }

    /// Start connecting with `token`, trying its servers in order.
    ///
    /// An existing session is disconnected first.
    pub fn connect(&mut self, token: ConnectToken) -> Result<(), ClientError> {
        if self.transport.error().is_some() {
            return Err(ClientError::TransportUnavailable);
        }
        if token.server_addresses.is_empty() {
            return Err(ClientError::NoServerAddresses);
        }

        self.disconnect();

        if token.is_expired(self.time) {
            tracing::debug!(client_id = token.client_id, "refusing expired connect token");
            self.set_state(ClientState::ConnectTokenExpired);
            return Err(ClientError::TokenExpired);
        }

        tracing::info!(
            client_id = token.client_id,
            servers = token.server_addresses.len(),
            "client connecting"
        );
        self.token = Some(token);
        self.server_address_index = 0;
        self.connect_to_current_address(None);
        Ok(())
    }

    /// Leave the current session, if any, and return to `Idle`.
    ///
    /// A connected client queues a burst of disconnect packets first. They
    /// are already sealed, so they still go out on the next write.
    pub fn disconnect(&mut self) {
        if self.state == ClientState::Connected {
            if let Some(address) = self.server_address {
                tracing::info!(%address, "client disconnecting");
                for _ in 0..NUM_DISCONNECT_PACKETS {
                    if let Err(e) = self.transport.enqueue_send(address, &Packet::Disconnect) {
                        tracing::debug!(error = %e, "disconnect packet not sent");
                        break;
                    }
                }
            }
        }
        self.reset(ClientState::Idle);
    }

    /// Queue whatever the current state calls for.
    pub fn send_packets(&mut self) {
        let Some(address) = self.server_address else {
            return;
        };

        let packet = match self.state {
            ClientState::SendingConnectionRequest => {
                if self.time - self.last_packet_send_time < self.config.connection_request_send_interval {
                    return;
                }
                let Some(token) = &self.token else {
                    return;
                };
                Packet::ConnectionRequest(ConnectionRequest {
                    protocol_id: self.config.protocol_id,
                    expire_timestamp: token.expire_timestamp,
                    token_nonce: token.nonce,
                    token_data: token.private_data.clone(),
                })
            }
            ClientState::SendingChallengeResponse => {
                if self.time - self.last_packet_send_time < self.config.connection_request_send_interval {
                    return;
                }
                let Some(challenge) = &self.challenge else {
                    return;
                };
                Packet::ConnectionResponse(challenge.clone())
            }
            ClientState::Connected => {
                if self.time - self.last_packet_send_time < self.config.keep_alive_interval {
                    return;
                }
                Packet::KeepAlive {
                    client_index: self.client_index.unwrap_or_default(),
                    max_clients: self.max_clients,
                }
            }
            _ => return,
        };

        match self.transport.enqueue_send(address, &packet) {
            Ok(()) => self.last_packet_send_time = self.time,
            Err(e) => tracing::trace!(error = %e, "client send failed"),
        }
    }

    /// Process everything the transport received this tick.
    pub fn receive_packets(&mut self) {
        while let Some((from, packet)) = self.transport.receive_packet() {
            if Some(from) != self.server_address {
                tracing::trace!(%from, "ignoring packet from unexpected address");
                continue;
            }
            self.process_packet(packet);
        }
    }

    fn process_packet(&mut self, packet: Packet) {
        match (self.state, packet) {
            (ClientState::SendingConnectionRequest | ClientState::SendingChallengeResponse, Packet::ConnectionDenied) => {
                tracing::info!("connection denied");
                self.reset(ClientState::ConnectionDenied);
            }
            (ClientState::SendingConnectionRequest, Packet::ConnectionChallenge(challenge)) => {
                tracing::debug!(sequence = challenge.sequence, "received connection challenge");
                self.challenge = Some(challenge);
                self.last_packet_receive_time = self.time;
                // Answer on this tick's send.
                self.last_packet_send_time = Time::NEG_INFINITY;
                self.set_state(ClientState::SendingChallengeResponse);
            }
            (
                ClientState::SendingChallengeResponse,
                Packet::KeepAlive {
                    client_index,
                    max_clients,
                },
            ) => {
                self.client_index = Some(client_index);
                self.max_clients = max_clients;
                self.challenge = None;
                self.last_packet_receive_time = self.time;
                tracing::info!(client_index, max_clients, "client connected");
                self.set_state(ClientState::Connected);
            }
            (ClientState::Connected, Packet::KeepAlive { .. }) => {
                self.last_packet_receive_time = self.time;
            }
            (ClientState::Connected, Packet::Payload(data)) => {
                self.last_packet_receive_time = self.time;
                self.payloads.push_back(data);
            }
            (ClientState::Connected, Packet::Disconnect) => {
                tracing::info!("server disconnected client");
                self.reset(ClientState::Disconnected);
            }
            (state, packet) => {
                tracing::trace!(?state, packet_type = ?packet.packet_type(), "ignoring packet");
            }
        }
    }

    /// Detect negotiation and connection timeouts.
    ///
    /// A negotiation timeout moves on to the token's next server; the client
    /// only times out once every server has been tried.
    pub fn check_for_timeout(&mut self) {
        let silence = self.time - self.last_packet_receive_time;
        match self.state {
            ClientState::SendingConnectionRequest | ClientState::SendingChallengeResponse => {
                if self.state == ClientState::SendingConnectionRequest
                    && self.token.as_ref().is_some_and(|t| t.is_expired(self.time))
                {
                    tracing::info!("connect token expired during negotiation");
                    self.reset(ClientState::ConnectTokenExpired);
                    return;
                }
                if silence <= self.config.connection_negotiation_timeout {
                    return;
                }

                let servers = self.token.as_ref().map_or(0, |t| t.server_addresses.len());
                if self.server_address_index + 1 < servers {
                    let previous = self.server_address.take();
                    if let Some(address) = previous {
                        tracing::debug!(%address, "no reply, trying next server");
                    }
                    self.server_address_index += 1;
                    self.connect_to_current_address(previous);
                } else {
                    tracing::info!("connection attempt timed out");
                    self.reset(ClientState::ConnectionTimedOut);
                }
            }
            ClientState::Connected => {
                if silence > self.config.connection_timeout {
                    tracing::info!("connection timed out");
                    self.reset(ClientState::ConnectionTimedOut);
                }
            }
            _ => {}
        }
    }

    /// Push the logical time for the next tick.
    pub fn advance_time(&mut self, time: Time) {
        self.time = time;
        self.transport.advance_time(time);
    }

    /// Queue application data for the server.
    pub fn send_payload(&mut self, data: &[u8]) -> Result<(), ClientError> {
        if self.state != ClientState::Connected {
            return Err(ClientError::NotConnected);
        }
        if data.len() > MAX_PAYLOAD_BYTES {
            return Err(ClientError::PayloadTooLarge(data.len()));
        }
        let address = self.server_address.ok_or(ClientError::NotConnected)?;
        self.transport
            .enqueue_send(address, &Packet::Payload(data.to_vec()))?;
        self.last_packet_send_time = self.time;
        Ok(())
    }

    /// Next payload received from the server.
    pub fn receive_payload(&mut self) -> Option<Vec<u8>> {
        self.payloads.pop_front()
    }

    /// Current state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Whether a connection attempt is in progress.
    pub fn is_connecting(&self) -> bool {
        self.state.is_connecting()
    }

    /// Whether the session is established.
    pub fn is_connected(&self) -> bool {
        self.state == ClientState::Connected
    }

    /// Whether the last attempt or session ended in failure.
    pub fn connection_failed(&self) -> bool {
        self.state.is_error()
    }

    /// Slot index assigned by the server while connected.
    pub fn client_index(&self) -> Option<u32> {
        self.client_index
    }

    /// Server slot capacity, as reported on accept.
    pub fn max_clients(&self) -> u32 {
        self.max_clients
    }

    /// Server currently being contacted or connected to.
    pub fn server_address(&self) -> Option<SocketAddr> {
        self.server_address
    }

    /// Logical time of the current tick.
    pub fn time(&self) -> Time {
        self.time
    }

    /// Protocol parameters.
    pub fn config(&self) -> &ClientServerConfig {
        &self.config
    }

    /// The client's transport.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// The client's transport, mutable. The tick loop drives its
    /// `write_packets` / `read_packets`.
    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    /// Start negotiating with the current token address. Keys used for
    /// `previous` move along so the outgoing sequence never restarts under
    /// the same token key.
    fn connect_to_current_address(&mut self, previous: Option<SocketAddr>) {
        let Some(token) = &self.token else {
            return;
        };
        let Some(&address) = token.server_addresses.get(self.server_address_index) else {
            return;
        };

        let moved = match previous {
            Some(previous) => self.transport.rebind_encryption_mapping(&previous, address),
            None => false,
        };
        if !moved {
            self.transport.add_encryption_mapping(
                address,
                token.client_to_server_key.clone(),
                token.server_to_client_key.clone(),
            );
        }
        self.server_address = Some(address);
        self.challenge = None;
        self.last_packet_send_time = Time::NEG_INFINITY;
        self.last_packet_receive_time = self.time;
        tracing::debug!(%address, index = self.server_address_index, "sending connection requests");
        self.set_state(ClientState::SendingConnectionRequest);
    }

    fn reset(&mut self, state: ClientState) {
        if let Some(address) = self.server_address.take() {
            self.transport.remove_encryption_mapping(&address);
        }
        self.token = None;
        self.challenge = None;
        self.client_index = None;
        self.max_clients = 0;
        self.server_address_index = 0;
        self.payloads.clear();
        self.set_state(state);
    }

    fn set_state(&mut self, state: ClientState) {
        if self.state != state {
            tracing::debug!(from = ?self.state, to = ?state, "client state change");
            self.state = state;
        }
    }
}
