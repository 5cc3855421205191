//! Expiry, replay, timeout and failure-mode properties.

mod common;

use common::*;
use netcode_protocol::prelude::*;
use netcode_protocol::transport::ConnectionRequest;

#[test]
fn test_expired_token_never_connects() {
    let network = LoopbackNetwork::new();
    let mut sim = Simulation::new(server(&network, 4), STEP);

    // Valid when connect is called, expired by the time it arrives.
    let slow = NetworkConditions {
        latency: 1.0,
        ..Default::default()
    };
    let mut client = client_with(&network, 0, slow);
    client.connect(token(1, vec![server_addr()], START + 0.5)).unwrap();
    sim.add_client(client);

    for _ in 0..100 {
        sim.tick();
        assert!(!sim.clients()[0].is_connected());
    }
    assert_eq!(sim.clients()[0].state(), ClientState::ConnectTokenExpired);
    assert_eq!(sim.server().num_connected_clients(), 0);
    assert_eq!(sim.server().replay_cache_len(), 0);
    assert_eq!(sim.server().transport().num_encryption_mappings(), 0);
}

#[test]
fn test_already_expired_token_refused_by_client() {
    let network = LoopbackNetwork::new();
    let mut client = client(&network, 0);
    let result = client.connect(token(1, vec![server_addr()], START - 1.0));
    assert!(matches!(result, Err(ClientError::TokenExpired)));
    assert_eq!(client.state(), ClientState::ConnectTokenExpired);
}

#[test]
fn test_replayed_request_does_not_create_second_session() {
    let network = LoopbackNetwork::new();
    let mut sim = Simulation::new(server(&network, 4), STEP);
    let token = token(1, vec![server_addr()], START + 30.0);
    let mut client = client(&network, 0);
    client.connect(token.clone()).unwrap();
    sim.add_client(client);
    sim.run_until(20, |s| s.server().num_connected_clients() == 1).unwrap();

    // An observer captured the request and sends it from two addresses.
    let request = Packet::ConnectionRequest(ConnectionRequest {
        protocol_id: DEFAULT_PROTOCOL_ID,
        expire_timestamp: token.expire_timestamp,
        token_nonce: token.nonce,
        token_data: token.private_data.clone(),
    });
    let mut attacker = Transport::bind_loopback(
        &network,
        addr("[::1]:60000"),
        TransportConfig::default(),
        sim.time(),
    );
    for _ in 0..3 {
        attacker.enqueue_send(server_addr(), &request).unwrap();
    }
    attacker.write_packets();
    for _ in 0..20 {
        sim.tick();
    }

    assert_eq!(sim.server().num_connected_clients(), 1);
    assert_eq!(sim.server().client_address(0), Some(client_addr(0)));
    assert!(sim.clients()[0].is_connected());
    attacker.read_packets();
    assert!(attacker.receive_packet().is_none());
}

#[test]
fn test_forged_packets_are_dropped_silently() {
    let network = LoopbackNetwork::new();
    let mut sim = simulation(&network, 4, 1);
    sim.run_until(20, |s| s.clients()[0].is_connected()).unwrap();

    // Keys the server has never seen, from the client's own address space.
    let mut forger = Transport::bind_loopback(
        &network,
        addr("[::1]:60001"),
        TransportConfig::default(),
        sim.time(),
    );
    forger.add_encryption_mapping(server_addr(), Key::from_bytes([1; 32]), Key::from_bytes([2; 32]));
    forger.enqueue_send(server_addr(), &Packet::Disconnect).unwrap();
    forger.write_packets();
    sim.tick();

    assert_eq!(sim.server().num_connected_clients(), 1);
    assert_eq!(sim.server().transport().counters().dropped_no_mapping, 1);
    forger.read_packets();
    assert!(forger.receive_packet().is_none());
}

#[test]
fn test_client_times_out_exactly_once() {
    let network = LoopbackNetwork::new();
    let mut sim = simulation(&network, 4, 1);
    sim.run_until(20, |s| s.clients()[0].is_connected()).unwrap();
    let (_server, mut clients) = sim.into_parts();
    let mut client = clients.remove(0);

    // The server is gone; only the client keeps ticking.
    let timeout = ClientServerConfig::default().connection_timeout;
    let mut time = client.time();
    let mut transitions = 0;
    let mut was_connected = true;
    for _ in 0..((timeout / STEP) as usize + 30) {
        time += STEP;
        client.advance_time(time);
        client.send_packets();
        client.transport_mut().write_packets();
        client.transport_mut().read_packets();
        client.receive_packets();
        client.check_for_timeout();
        if was_connected && !client.is_connected() {
            transitions += 1;
        }
        was_connected = client.is_connected();
    }
    assert_eq!(transitions, 1);
    assert_eq!(client.state(), ClientState::ConnectionTimedOut);
}

#[test]
fn test_server_times_out_silent_client_once() {
    let network = LoopbackNetwork::new();
    let mut sim = simulation(&network, 4, 1);
    sim.run_until(20, |s| s.clients()[0].is_connected()).unwrap();
    let (mut server, _clients) = sim.into_parts();
    while server.poll_event().is_some() {}

    let mut time = server.time();
    for _ in 0..100 {
        time += STEP;
        server.advance_time(time);
        server.send_packets();
        server.transport_mut().write_packets();
        server.transport_mut().read_packets();
        server.receive_packets();
        server.check_for_timeouts();
    }
    assert_eq!(server.num_connected_clients(), 0);
    let events: Vec<_> = std::iter::from_fn(|| server.poll_event()).collect();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        ServerEvent::ClientDisconnected {
            reason: DisconnectReason::TimedOut,
            ..
        }
    ));
}

#[test]
fn test_repeated_write_read_is_noop() {
    let network = LoopbackNetwork::new();
    let mut sim = simulation(&network, 4, 1);
    sim.run_until(20, |s| s.clients()[0].is_connected()).unwrap();
    sim.tick();

    let client_before = *sim.clients()[0].transport().counters();
    let server_before = *sim.server().transport().counters();
    for _ in 0..5 {
        sim.client_mut(0).unwrap().transport_mut().write_packets();
        sim.server_mut().transport_mut().write_packets();
        sim.client_mut(0).unwrap().transport_mut().read_packets();
        sim.server_mut().transport_mut().read_packets();
    }
    assert_eq!(*sim.clients()[0].transport().counters(), client_before);
    assert_eq!(*sim.server().transport().counters(), server_before);
    assert!(sim.client_mut(0).unwrap().transport_mut().receive_packet().is_none());
    assert!(sim.server_mut().transport_mut().receive_packet().is_none());
}

#[test]
fn test_bind_failure_leaves_inert_endpoints() {
    let network = LoopbackNetwork::new();
    let _occupant = network.bind(server_addr()).unwrap();

    let transport =
        Transport::bind_loopback(&network, server_addr(), TransportConfig::default(), START);
    assert!(matches!(transport.error(), Some(SocketError::AddressInUse(a)) if *a == server_addr()));

    let config = ServerConfigBuilder::new(Key::from_bytes(PRIVATE_KEY)).build();
    let mut server = Server::new(transport, config, &mut CryptoContext::from_seed(1), START).unwrap();
    assert!(matches!(server.start(), Err(ServerError::TransportUnavailable)));

    let _client_occupant = network.bind(client_addr(0)).unwrap();
    let mut client = client(&network, 0);
    assert!(matches!(
        client.connect(token(1, vec![server_addr()], START + 30.0)),
        Err(ClientError::TransportUnavailable)
    ));

    let mut sim = Simulation::new(server, STEP);
    sim.add_client(client);
    for _ in 0..10 {
        sim.tick();
    }
    assert_eq!(sim.server().num_connected_clients(), 0);
    assert_eq!(sim.clients()[0].state(), ClientState::Idle);
    assert_eq!(*sim.server().transport().counters(), TransportCounters::default());
}

#[test]
fn test_server_stop_drops_sessions_without_sending() {
    let network = LoopbackNetwork::new();
    let mut sim = simulation(&network, 4, 1);
    sim.run_until(20, |s| s.clients()[0].is_connected()).unwrap();

    sim.server_mut().stop();
    assert_eq!(sim.server().num_connected_clients(), 0);
    assert!(!sim.server().is_running());

    // The client hears nothing and eventually times out on its own.
    let ticks = sim.run_until(100, |s| s.clients()[0].connection_failed());
    assert!(ticks.is_some());
    assert_eq!(sim.clients()[0].state(), ClientState::ConnectionTimedOut);
}

#[test]
fn test_spent_token_cannot_reconnect_after_disconnect() {
    let network = LoopbackNetwork::new();
    let mut sim = Simulation::new(server(&network, 4), STEP);
    let token = token(1, vec![server_addr()], START + 30.0);
    let mut client = client(&network, 0);
    client.connect(token.clone()).unwrap();
    sim.add_client(client);
    sim.run_until(20, |s| s.clients()[0].is_connected()).unwrap();

    sim.client_mut(0).unwrap().disconnect();
    sim.run_until(10, |s| s.server().num_connected_clients() == 0).unwrap();
    while sim.server_mut().poll_event().is_some() {}

    // Same token, same address, fresh client-side keys and sequence.
    sim.client_mut(0).unwrap().connect(token).unwrap();
    let ticks = sim.run_until(100, |s| s.clients()[0].connection_failed());
    assert!(ticks.is_some());
    assert_eq!(sim.clients()[0].state(), ClientState::ConnectionTimedOut);
    assert_eq!(sim.server().num_connected_clients(), 0);
    assert_eq!(sim.server_mut().poll_event(), None);
    assert_eq!(sim.server().transport().num_encryption_mappings(), 0);
}

#[test]
fn test_full_replay_cache_keeps_remembering_live_tokens() {
    let network = LoopbackNetwork::new();
    let transport = Transport::bind_loopback(
        &network,
        server_addr(),
        transport_config(NetworkConditions::perfect(), 1),
        START,
    );
    let config = ServerConfigBuilder::new(Key::from_bytes(PRIVATE_KEY))
        .max_clients(4)
        .replay_cache_capacity(2)
        .build();
    let mut server = Server::new(transport, config, &mut CryptoContext::from_seed(1000), START).unwrap();
    server.set_server_address(server_addr());
    server.start().unwrap();

    let mut sim = Simulation::new(server, STEP);
    let first_token = token(1, vec![server_addr()], START + 30.0);
    for n in 0..3u16 {
        let mut client = client(&network, n);
        let token = if n == 0 {
            first_token.clone()
        } else {
            token(n as u64 + 1, vec![server_addr()], START + 30.0)
        };
        client.connect(token).unwrap();
        sim.add_client(client);
    }
    sim.run_until(100, |s| s.clients()[2].connection_failed()).unwrap();

    // Two tokens fill the cache; the third is refused rather than
    // pushing out an unexpired one.
    assert!(sim.clients()[0].is_connected());
    assert!(sim.clients()[1].is_connected());
    assert_eq!(sim.clients()[2].state(), ClientState::ConnectionTimedOut);
    assert_eq!(sim.server().replay_cache_len(), 2);

    sim.client_mut(0).unwrap().disconnect();
    sim.run_until(10, |s| s.server().num_connected_clients() == 1).unwrap();
    sim.client_mut(0).unwrap().connect(first_token).unwrap();
    sim.run_until(100, |s| s.clients()[0].connection_failed()).unwrap();

    assert_eq!(sim.server().num_connected_clients(), 1);
    assert_eq!(sim.server().find_client_by_id(1), None);
}
