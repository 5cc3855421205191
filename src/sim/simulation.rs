//! One server and its clients, stepped together.

use crate::client::Client;
use crate::core::Time;
use crate::server::Server;

use super::clock::SimulationClock;

/// A server and clients sharing one logical clock.
///
/// Each [`Simulation::tick`] runs, in order and across all endpoints:
/// 1. build and queue outgoing packets
/// 2. write every transport's queue to its socket
/// 3. read and authenticate inbound datagrams
/// 4. process inbound packets
/// 5. run timeout checks
/// 6. advance the clock and push the new time everywhere
///
/// Writes always precede reads, so a packet written on tick N is first
/// visible on tick N (or later, under emulated latency).
#[derive(Debug)]
pub struct Simulation {
    clock: SimulationClock,
    time_step: Time,
    server: Server,
    clients: Vec<Client>,
}

impl Simulation {
    /// Build a simulation starting at the server's current time.
    pub fn new(server: Server, time_step: Time) -> Self {
        Self {
            clock: SimulationClock::new(server.time()),
            time_step,
            server,
            clients: Vec::new(),
        }
    }

    /// Add a client and return its index. It is brought to the current time.
    pub fn add_client(&mut self, mut client: Client) -> usize {
        client.advance_time(self.clock.time());
        self.clients.push(client);
        self.clients.len() - 1
    }

    /// Current logical time.
    pub fn time(&self) -> Time {
        self.clock.time()
    }

    /// Fixed step used by [`Simulation::tick`].
    pub fn time_step(&self) -> Time {
        self.time_step
    }

    /// The server.
    pub fn server(&self) -> &Server {
        &self.server
    }

    /// The server, mutable.
    pub fn server_mut(&mut self) -> &mut Server {
        &mut self.server
    }

    /// A client by index.
    pub fn client(&self, index: usize) -> Option<&Client> {
        self.clients.get(index)
    }

    /// A client by index, mutable.
    pub fn client_mut(&mut self, index: usize) -> Option<&mut Client> {
        self.clients.get_mut(index)
    }

    /// All clients.
    pub fn clients(&self) -> &[Client] {
        &self.clients
    }

    /// Run one tick with the configured step.
    pub fn tick(&mut self) {
        self.tick_with(self.time_step);
    }

    /// Run one tick, then advance by `delta`.
    pub fn tick_with(&mut self, delta: Time) {
        for client in &mut self.clients {
            client.send_packets();
        }
        self.server.send_packets();

        for client in &mut self.clients {
            client.transport_mut().write_packets();
        }
        self.server.transport_mut().write_packets();

        for client in &mut self.clients {
            client.transport_mut().read_packets();
        }
        self.server.transport_mut().read_packets();

        for client in &mut self.clients {
            client.receive_packets();
        }
        self.server.receive_packets();

        for client in &mut self.clients {
            client.check_for_timeout();
        }
        self.server.check_for_timeouts();

        let time = self.clock.advance(delta);
        for client in &mut self.clients {
            client.advance_time(time);
        }
        self.server.advance_time(time);
    }

    /// Tick until `done` holds or `max_ticks` ran. Returns the ticks taken,
    /// or `None` if the condition never held.
    pub fn run_until(&mut self, max_ticks: usize, mut done: impl FnMut(&Self) -> bool) -> Option<usize> {
        for ticks in 0..max_ticks {
            if done(self) {
                return Some(ticks);
            }
            self.tick();
        }
        done(self).then_some(max_ticks)
    }

    /// Take the server and clients back.
    pub fn into_parts(self) -> (Server, Vec<Client>) {
        (self.server, self.clients)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;
    use crate::client::ClientState;
    use crate::core::ClientServerConfig;
    use crate::crypto::{CryptoContext, Key};
    use crate::server::ServerConfigBuilder;
    use crate::token::ConnectToken;
    use crate::transport::{LoopbackNetwork, Transport, TransportConfig};

    #[test]
    fn test_tick_connects_in_four_ticks() {
        let network = LoopbackNetwork::new();
        let server_addr: SocketAddr = "[::1]:40000".parse().unwrap();
        let private_key = Key::from_bytes([3; 32]);
        let mut crypto = CryptoContext::from_seed(5);

        let transport = Transport::bind_loopback(&network, server_addr, TransportConfig::default(), 0.0);
        let config = ServerConfigBuilder::new(private_key.clone()).build();
        let mut server = Server::new(transport, config, &mut crypto, 0.0).unwrap();
        server.start().unwrap();

        let transport = Transport::bind_loopback(
            &network,
            "[::1]:50000".parse().unwrap(),
            TransportConfig::default(),
            0.0,
        );
        let mut client = Client::new(transport, ClientServerConfig::default(), 0.0).unwrap();
        let c2s = crypto.generate_key();
        let s2c = crypto.generate_key();
        let token = ConnectToken::generate(
            1,
            vec![server_addr],
            c2s,
            s2c,
            30.0,
            ClientServerConfig::default().protocol_id,
            &private_key,
            &mut crypto,
        )
        .unwrap();
        client.connect(token).unwrap();

        let mut sim = Simulation::new(server, 0.1);
        sim.add_client(client);

        // request, challenge, response, accept
        let ticks = sim.run_until(10, |s| s.clients()[0].is_connected());
        assert_eq!(ticks, Some(4));
        assert_eq!(sim.server().num_connected_clients(), 1);
        assert_eq!(sim.client(0).map(Client::state), Some(ClientState::Connected));
        assert!((sim.time() - 0.4).abs() < 1e-9);
    }
}
