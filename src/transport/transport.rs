//! The two-phase packet transport.
//!
//! Sealing happens when a packet is enqueued, so the send queue only holds
//! opaque datagrams. Each tick the owner calls [`Transport::write_packets`]
//! and then [`Transport::read_packets`]; both act at the logical time most
//! recently pushed with [`Transport::advance_time`].

use std::collections::VecDeque;
use std::net::SocketAddr;

use rand::Rng;

use crate::core::{
    CodecError, Time, DEFAULT_PROTOCOL_ID, DEFAULT_REPLAY_WINDOW_SIZE, ENCRYPTION_MAPPING_TIMEOUT,
    MAX_PACKETS_PER_READ, MAX_PACKET_BYTES,
};
use crate::crypto::Key;

use super::encryption::EncryptionManager;
use super::error::{SocketError, TransportError};
use super::loopback::LoopbackNetwork;
use super::packet::{Packet, PacketHeader, PacketType};
use super::simulator::{NetworkConditions, NetworkSimulator};
use super::socket::{DatagramSocket, DEFAULT_RECV_BUFFER_SIZE};

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Protocol id authenticated into every packet.
    pub protocol_id: u64,
    /// Emulated impairment applied to outgoing datagrams.
    pub conditions: NetworkConditions,
    /// Replay window size per peer, in sequence numbers.
    pub replay_window_size: usize,
    /// Idle time after which an encryption mapping is dropped.
    pub encryption_mapping_timeout: Time,
    /// Upper bound on datagrams drained per `read_packets` call.
    pub max_packets_per_read: usize,
    /// Simulator seed. `None` = random.
    pub seed: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            protocol_id: DEFAULT_PROTOCOL_ID,
            conditions: NetworkConditions::perfect(),
            replay_window_size: DEFAULT_REPLAY_WINDOW_SIZE,
            encryption_mapping_timeout: ENCRYPTION_MAPPING_TIMEOUT,
            max_packets_per_read: MAX_PACKETS_PER_READ,
            seed: None,
        }
    }
}

/// Builder for [`TransportConfig`].
#[derive(Debug, Default)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    /// Create a builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the protocol id.
    pub fn protocol_id(mut self, protocol_id: u64) -> Self {
        self.config.protocol_id = protocol_id;
        self
    }

    /// Set the emulated network conditions.
    pub fn conditions(mut self, conditions: NetworkConditions) -> Self {
        self.config.conditions = conditions;
        self
    }

    /// Set the per-peer replay window size.
    pub fn replay_window_size(mut self, size: usize) -> Self {
        self.config.replay_window_size = size;
        self
    }

    /// Set the encryption mapping idle timeout.
    pub fn encryption_mapping_timeout(mut self, timeout: Time) -> Self {
        self.config.encryption_mapping_timeout = timeout;
        self
    }

    /// Set the read budget per tick.
    pub fn max_packets_per_read(mut self, max: usize) -> Self {
        self.config.max_packets_per_read = max.max(1);
        self
    }

    /// Fix the simulator seed for reproducible runs.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> TransportConfig {
        self.config
    }
}

/// Running totals, for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportCounters {
    /// Packets sealed and queued.
    pub packets_enqueued: u64,
    /// Datagrams handed to the socket.
    pub datagrams_sent: u64,
    /// Datagrams the simulator dropped.
    pub datagrams_lost: u64,
    /// Extra copies the simulator created.
    pub datagrams_duplicated: u64,
    /// Datagrams taken off the socket.
    pub datagrams_received: u64,
    /// Packets that survived decoding and authentication.
    pub packets_received: u64,
    /// Drops: unparseable datagram or body.
    pub dropped_malformed: u64,
    /// Drops: no keys for the sender.
    pub dropped_no_mapping: u64,
    /// Drops: AEAD tag mismatch.
    pub dropped_authentication: u64,
    /// Drops: sequence already seen or too old.
    pub dropped_replay: u64,
    /// Drops: connection request for another protocol.
    pub dropped_protocol: u64,
    /// Socket send/receive failures.
    pub io_errors: u64,
}

impl TransportCounters {
    /// Total packets dropped on receive.
    pub fn dropped(&self) -> u64 {
        self.dropped_malformed
            + self.dropped_no_mapping
            + self.dropped_authentication
            + self.dropped_replay
            + self.dropped_protocol
    }
}

/// Encrypted datagram transport with emulated network conditions.
///
/// If the socket failed to bind, the transport stays in an error state:
/// [`Transport::error`] reports the failure and every per-tick operation is
/// a no-op.
pub struct Transport {
    socket: Result<Box<dyn DatagramSocket>, SocketError>,
    config: TransportConfig,
    time: Time,
    encryption: EncryptionManager,
    simulator: NetworkSimulator,
    send_queue: VecDeque<(SocketAddr, Vec<u8>)>,
    receive_queue: VecDeque<(SocketAddr, Packet)>,
    counters: TransportCounters,
    recv_buffer: Vec<u8>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("local_addr", &self.local_addr())
            .field("error", &self.error())
            .field("time", &self.time)
            .field("mappings", &self.encryption.len())
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Wrap the outcome of a socket bind.
    pub fn new<S>(socket: Result<S, SocketError>, config: TransportConfig, time: Time) -> Self
    where
        S: DatagramSocket + 'static,
    {
        let socket = socket.map(|s| Box::new(s) as Box<dyn DatagramSocket>);
        match &socket {
            Ok(s) => tracing::debug!(address = %s.local_addr(), "transport bound"),
            Err(e) => tracing::error!(error = %e, "transport failed to bind"),
        }

        let seed = config.seed.unwrap_or_else(|| rand::thread_rng().r#gen());
        Self {
            socket,
            encryption: EncryptionManager::new(
                config.encryption_mapping_timeout,
                config.replay_window_size,
            ),
            simulator: NetworkSimulator::new(config.conditions, seed),
            config,
            time,
            send_queue: VecDeque::new(),
            receive_queue: VecDeque::new(),
            counters: TransportCounters::default(),
            recv_buffer: vec![0u8; DEFAULT_RECV_BUFFER_SIZE],
        }
    }

    /// Bind a socket on an in-memory network.
    pub fn bind_loopback(
        network: &LoopbackNetwork,
        address: SocketAddr,
        config: TransportConfig,
        time: Time,
    ) -> Self {
        Self::new(network.bind(address), config, time)
    }

    /// Bind a real UDP socket.
    #[cfg(feature = "udp")]
    pub fn bind_udp(address: SocketAddr, config: TransportConfig, time: Time) -> Self {
        Self::new(super::socket::UdpSocket::bind(address), config, time)
    }

    /// Socket initialisation failure, if any.
    pub fn error(&self) -> Option<&SocketError> {
        self.socket.as_ref().err()
    }

    /// Bound address, if the socket initialised.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().ok().map(|s| s.local_addr())
    }

    /// Configuration in use.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Protocol id in use.
    pub fn protocol_id(&self) -> u64 {
        self.config.protocol_id
    }

    /// Logical time of the current tick.
    pub fn time(&self) -> Time {
        self.time
    }

    /// Push the logical time for the next tick.
    pub fn advance_time(&mut self, time: Time) {
        self.time = time;
    }

    /// Running totals.
    pub fn counters(&self) -> &TransportCounters {
        &self.counters
    }

    /// Change the emulated network conditions.
    pub fn set_network_conditions(&mut self, conditions: NetworkConditions) {
        self.config.conditions = conditions;
        self.simulator.set_conditions(conditions);
    }

    /// Register session keys for a peer. See [`EncryptionManager::add`].
    pub fn add_encryption_mapping(
        &mut self,
        address: SocketAddr,
        send_key: Key,
        receive_key: Key,
    ) -> bool {
        self.encryption.add(address, send_key, receive_key, self.time)
    }

    /// Move a peer's keys to another address. See [`EncryptionManager::rebind`].
    pub fn rebind_encryption_mapping(&mut self, from: &SocketAddr, to: SocketAddr) -> bool {
        self.encryption.rebind(from, to, self.time)
    }

    /// Forget a peer's keys.
    pub fn remove_encryption_mapping(&mut self, address: &SocketAddr) -> bool {
        self.encryption.remove(address)
    }

    /// Whether a peer has keys.
    pub fn has_encryption_mapping(&self, address: &SocketAddr) -> bool {
        self.encryption.contains(address)
    }

    /// Number of registered peers.
    pub fn num_encryption_mappings(&self) -> usize {
        self.encryption.len()
    }

    /// Seal `packet` for `address` and queue it.
    ///
    /// Connection requests go out unsealed. Every other packet needs an
    /// encryption mapping for `address`.
    pub fn enqueue_send(&mut self, address: SocketAddr, packet: &Packet) -> Result<(), TransportError> {
        if self.socket.is_err() {
            return Err(TransportError::Unavailable);
        }

        let datagram = if packet.is_sealed() {
            let mapping = self
                .encryption
                .get_mut(&address)
                .ok_or(TransportError::NoEncryptionMapping(address))?;
            let sequence = mapping.next_send_sequence();
            mapping.touch(self.time);
            packet.encode(sequence, self.config.protocol_id, Some(mapping.send_key()))?
        } else {
            packet.encode(0, self.config.protocol_id, None)?
        };

        self.send_queue.push_back((address, datagram));
        self.counters.packets_enqueued += 1;
        Ok(())
    }

    /// Datagrams queued but not yet handed to the simulator.
    pub fn queued_sends(&self) -> usize {
        self.send_queue.len()
    }

    /// Datagrams held back by emulated latency.
    pub fn in_flight(&self) -> usize {
        self.simulator.pending()
    }

    /// Flush the send queue through the simulator and write every datagram
    /// due at the current time. Also expires idle encryption mappings.
    pub fn write_packets(&mut self) {
        let Ok(socket) = self.socket.as_mut() else {
            return;
        };

        for address in self.encryption.expire(self.time) {
            tracing::debug!(%address, "encryption mapping expired");
        }

        while let Some((address, datagram)) = self.send_queue.pop_front() {
            match self.simulator.send(self.time, address, datagram) {
                0 => self.counters.datagrams_lost += 1,
                2 => self.counters.datagrams_duplicated += 1,
                _ => {}
            }
        }

        for (address, datagram) in self.simulator.drain_due(self.time) {
            match socket.send_to(&datagram, address) {
                Ok(()) => self.counters.datagrams_sent += 1,
                Err(e) => {
                    self.counters.io_errors += 1;
                    tracing::trace!(%address, error = %e, "send failed");
                }
            }
        }
    }

    /// Drain up to `max_packets_per_read` datagrams from the socket, keeping
    /// the ones that decode and authenticate.
    pub fn read_packets(&mut self) {
        for _ in 0..self.config.max_packets_per_read {
            let Ok(socket) = self.socket.as_mut() else {
                return;
            };
            let (len, from) = match socket.recv_from(&mut self.recv_buffer) {
                Ok(Some(received)) => received,
                Ok(None) => break,
                Err(e) => {
                    self.counters.io_errors += 1;
                    tracing::trace!(error = %e, "receive failed");
                    break;
                }
            };
            self.counters.datagrams_received += 1;

            let datagram = self.recv_buffer[..len].to_vec();
            match self.process_datagram(from, &datagram) {
                Ok(packet) => {
                    self.counters.packets_received += 1;
                    self.receive_queue.push_back((from, packet));
                }
                Err(e) => self.record_drop(from, &e),
            }
        }
    }

    /// Next received packet, in arrival order.
    pub fn receive_packet(&mut self) -> Option<(SocketAddr, Packet)> {
        self.receive_queue.pop_front()
    }

    /// Drop all queued, in-flight and received packets and every encryption
    /// mapping. Nothing is sent.
    pub fn reset(&mut self) {
        self.send_queue.clear();
        self.receive_queue.clear();
        self.simulator.clear();
        self.encryption.clear();
    }

    fn process_datagram(&mut self, from: SocketAddr, datagram: &[u8]) -> Result<Packet, TransportError> {
        if datagram.len() > MAX_PACKET_BYTES {
            return Err(TransportError::Codec(CodecError::Overflow(datagram.len())));
        }
        let (header, body) = PacketHeader::read(datagram)?;

        if header.packet_type == PacketType::ConnectionRequest {
            let packet = Packet::read_body(header.packet_type, body)?;
            if let Packet::ConnectionRequest(request) = &packet {
                if request.protocol_id != self.config.protocol_id {
                    return Err(TransportError::ProtocolMismatch(request.protocol_id));
                }
            }
            return Ok(packet);
        }

        let mapping = self
            .encryption
            .get_mut(&from)
            .ok_or(TransportError::NoEncryptionMapping(from))?;

        // Cheap rejection before touching the AEAD; the window is only
        // advanced once the packet authenticates.
        if mapping.replay_window().is_replay(header.sequence) {
            return Err(TransportError::Replay);
        }
        let packet = Packet::open(&header, body, self.config.protocol_id, mapping.receive_key())?;
        if !mapping.replay_window_mut().check_and_update(header.sequence) {
            return Err(TransportError::Replay);
        }
        mapping.touch(self.time);
        Ok(packet)
    }

    fn record_drop(&mut self, from: SocketAddr, error: &TransportError) {
        match error {
            TransportError::NoEncryptionMapping(_) => self.counters.dropped_no_mapping += 1,
            TransportError::AuthenticationFailed | TransportError::Crypto(_) => {
                self.counters.dropped_authentication += 1
            }
            TransportError::Replay => self.counters.dropped_replay += 1,
            TransportError::ProtocolMismatch(_) => self.counters.dropped_protocol += 1,
            TransportError::Codec(_)
            | TransportError::Unavailable
            | TransportError::Io(_) => self.counters.dropped_malformed += 1,
        }
        tracing::trace!(%from, error = %error, "dropped packet");
    }
}
