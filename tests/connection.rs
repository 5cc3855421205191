//! End-to-end connection scenarios over the in-memory network.

mod common;

use common::*;
use netcode_protocol::prelude::*;

#[test]
fn test_end_to_end_connect_and_disconnect() {
    let network = LoopbackNetwork::new();
    let mut sim = simulation(&network, MAX_CLIENTS, 1);

    let mut connected_at = None;
    for tick in 0..256 {
        sim.tick();
        let client = &sim.clients()[0];
        assert!(!client.connection_failed(), "client failed: {:?}", client.state());
        if client.is_connected() && sim.server().num_connected_clients() == 1 {
            connected_at.get_or_insert(tick);
        }
    }
    assert!(connected_at.is_some());
    assert_eq!(sim.clients()[0].state(), ClientState::Connected);
    assert_eq!(sim.server().num_connected_clients(), 1);
    // Keep-alives held the session over 25 logical seconds.
    assert!(sim.time() > START + 25.0);

    sim.client_mut(0).unwrap().disconnect();
    assert_eq!(sim.clients()[0].state(), ClientState::Idle);

    let interval = ClientServerConfig::default().keep_alive_interval;
    let ticks = sim
        .run_until((interval / STEP) as usize, |s| s.server().num_connected_clients() == 0)
        .expect("server never noticed the disconnect");
    assert!(ticks <= 1);

    let events: Vec<_> = std::iter::from_fn(|| sim.server_mut().poll_event()).collect();
    assert!(matches!(events[0], ServerEvent::ClientConnected { client_index: 0, client_id: 1, .. }));
    assert!(matches!(
        events[1],
        ServerEvent::ClientDisconnected {
            reason: DisconnectReason::ClientDisconnected,
            ..
        }
    ));
}

#[test]
fn test_capacity_one_denies_second_client() {
    let network = LoopbackNetwork::new();
    let mut sim = simulation(&network, 1, 2);

    let settled = sim.run_until(100, |s| s.clients().iter().all(|c| !c.is_connecting()));
    assert!(settled.is_some());

    let states: Vec<_> = sim.clients().iter().map(Client::state).collect();
    assert_eq!(states.iter().filter(|s| **s == ClientState::Connected).count(), 1);
    assert_eq!(states.iter().filter(|s| **s == ClientState::ConnectionDenied).count(), 1);
    assert_eq!(sim.server().num_connected_clients(), 1);
}

#[test]
fn test_many_clients_get_distinct_slots() {
    let network = LoopbackNetwork::new();
    let mut sim = simulation(&network, 8, 5);

    sim.run_until(100, |s| s.clients().iter().all(Client::is_connected))
        .expect("not every client connected");

    let mut indices: Vec<_> = sim.clients().iter().filter_map(Client::client_index).collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    assert!(sim.clients().iter().all(|c| c.max_clients() == 8));
    assert_eq!(sim.server().num_connected_clients(), 5);
}

#[test]
fn test_payload_round_trip() {
    let network = LoopbackNetwork::new();
    let mut sim = simulation(&network, 4, 1);
    sim.run_until(20, |s| s.clients()[0].is_connected()).unwrap();

    sim.client_mut(0).unwrap().send_payload(b"move north").unwrap();
    sim.tick();
    let index = sim.clients()[0].client_index().unwrap() as usize;
    assert_eq!(sim.server_mut().receive_payload(index), Some(b"move north".to_vec()));

    sim.server_mut().send_payload(index, b"ok").unwrap();
    sim.tick();
    assert_eq!(sim.client_mut(0).unwrap().receive_payload(), Some(b"ok".to_vec()));

    let oversized = vec![0u8; MAX_PAYLOAD_BYTES + 1];
    assert!(matches!(
        sim.client_mut(0).unwrap().send_payload(&oversized),
        Err(ClientError::PayloadTooLarge(_))
    ));
}

#[test]
fn test_server_kick_reaches_client() {
    let network = LoopbackNetwork::new();
    let mut sim = simulation(&network, 4, 1);
    sim.run_until(20, |s| s.clients()[0].is_connected()).unwrap();

    let index = sim.clients()[0].client_index().unwrap() as usize;
    sim.server_mut().disconnect_client(index).unwrap();
    sim.tick();

    assert_eq!(sim.clients()[0].state(), ClientState::Disconnected);
    assert_eq!(sim.server().num_connected_clients(), 0);
}

#[test]
fn test_client_falls_back_to_second_server() {
    let network = LoopbackNetwork::new();
    let mut sim = Simulation::new(server(&network, 4), STEP);
    let mut client = client(&network, 0);
    let dead = addr("[::1]:40404");
    client
        .connect(token(1, vec![dead, server_addr()], START + 30.0))
        .unwrap();
    sim.add_client(client);

    let negotiation = ClientServerConfig::default().connection_negotiation_timeout;
    let ticks = sim
        .run_until(200, |s| s.clients()[0].is_connected())
        .expect("never connected to the second server");
    assert!(ticks as f64 * STEP > negotiation);
    assert_eq!(sim.clients()[0].server_address(), Some(server_addr()));
}

#[test]
fn test_lossy_network_still_connects() {
    let network = LoopbackNetwork::new();
    let mut sim = Simulation::new(server_with(&network, 4, NetworkConditions::lossy()), STEP);
    let mut client = client_with(&network, 0, NetworkConditions::lossy());
    client
        .connect(token(1, vec![server_addr()], START + 30.0))
        .unwrap();
    sim.add_client(client);

    sim.run_until(256, |s| s.clients()[0].is_connected() && s.server().num_connected_clients() == 1)
        .expect("lossy connection never established");

    // Stays up under loss and jitter.
    for _ in 0..100 {
        sim.tick();
    }
    assert!(sim.clients()[0].is_connected());
    assert_eq!(sim.server().num_connected_clients(), 1);
    let counters = sim.clients()[0].transport().counters();
    assert!(counters.datagrams_lost + counters.datagrams_duplicated > 0);
}

#[cfg(feature = "matcher")]
#[test]
fn test_matcher_issued_token_connects() {
    let network = LoopbackNetwork::new();
    let mut sim = Simulation::new(server(&network, 4), STEP);

    let mut matcher = LocalMatcher::new(Key::from_bytes(PRIVATE_KEY), CryptoContext::from_seed(77));
    matcher.add_server_address(server_addr());
    let token = matcher.request_match(42, START).unwrap();
    assert_eq!(token.expire_timestamp, START + DEFAULT_TOKEN_LIFETIME);

    let mut client = client(&network, 0);
    client.connect(token).unwrap();
    sim.add_client(client);

    sim.run_until(20, |s| s.clients()[0].is_connected()).unwrap();
    assert_eq!(sim.server().client_id(0), Some(42));
}
