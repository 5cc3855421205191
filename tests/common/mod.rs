//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;

use netcode_protocol::prelude::*;

pub const START: Time = 100.0;
pub const STEP: Time = 0.1;
pub const PRIVATE_KEY: [u8; 32] = [0x5A; 32];

pub fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

pub fn server_addr() -> SocketAddr {
    addr("[::1]:40000")
}

pub fn client_addr(n: u16) -> SocketAddr {
    SocketAddr::from((std::net::Ipv6Addr::LOCALHOST, 50000 + n))
}

pub fn transport_config(conditions: NetworkConditions, seed: u64) -> TransportConfig {
    TransportConfigBuilder::new()
        .conditions(conditions)
        .seed(seed)
        .build()
}

pub fn server(network: &LoopbackNetwork, max_clients: usize) -> Server {
    server_with(network, max_clients, NetworkConditions::perfect())
}

pub fn server_with(network: &LoopbackNetwork, max_clients: usize, conditions: NetworkConditions) -> Server {
    let transport =
        Transport::bind_loopback(network, server_addr(), transport_config(conditions, 1), START);
    let config = ServerConfigBuilder::new(Key::from_bytes(PRIVATE_KEY))
        .max_clients(max_clients)
        .build();
    let mut crypto = CryptoContext::from_seed(1000);
    let mut server = Server::new(transport, config, &mut crypto, START).unwrap();
    server.set_server_address(server_addr());
    server.start().unwrap();
    server
}

pub fn client(network: &LoopbackNetwork, n: u16) -> Client {
    client_with(network, n, NetworkConditions::perfect())
}

pub fn client_with(network: &LoopbackNetwork, n: u16, conditions: NetworkConditions) -> Client {
    let transport = Transport::bind_loopback(
        network,
        client_addr(n),
        transport_config(conditions, 2000 + n as u64),
        START,
    );
    Client::new(transport, ClientServerConfig::default(), START).unwrap()
}

pub fn token(client_id: u64, servers: Vec<SocketAddr>, expire: Time) -> ConnectToken {
    let mut crypto = CryptoContext::from_seed(client_id);
    let c2s = crypto.generate_key();
    let s2c = crypto.generate_key();
    ConnectToken::generate(
        client_id,
        servers,
        c2s,
        s2c,
        expire,
        DEFAULT_PROTOCOL_ID,
        &Key::from_bytes(PRIVATE_KEY),
        &mut crypto,
    )
    .unwrap()
}

/// One server plus `clients` clients, each already connecting with a fresh
/// token for the server.
pub fn simulation(network: &LoopbackNetwork, max_clients: usize, clients: u16) -> Simulation {
    let mut sim = Simulation::new(server(network, max_clients), STEP);
    for n in 0..clients {
        let mut client = client(network, n);
        client
            .connect(token(n as u64 + 1, vec![server_addr()], START + 30.0))
            .unwrap();
        sim.add_client(client);
    }
    sim
}
