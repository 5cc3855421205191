//! netcode-protocol testbed.
//!
//! Runs one client against one server over real UDP on the IPv6 loopback,
//! with emulated loss, duplication and jitter on both sides. The client
//! connects, disconnects as soon as the server counts it, and the run ends
//! once both sides are idle. Exits non-zero if the connection failed.
//!
//! Logical time advances 0.1 per tick; ticks are paced by a tokio interval
//! so a run takes a few seconds of wall time.
//!
//! ```text
//! RUST_LOG=netcode_protocol=debug cargo run -p netcode-testbed
//! ```

use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;

use netcode_protocol::prelude::*;
use netcode_protocol::token::MatchError;
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const CLIENT_ID: u64 = 1;
const CLIENT_PORT: u16 = 30000;
const SERVER_PORT: u16 = 40000;
const START_TIME: Time = 100.0;
const TIME_STEP: Time = 0.1;
const NUM_ITERATIONS: usize = 256;
const TICK_PACING: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
enum TestbedError {
    #[error("request match failed: {0}")]
    Match(#[from] MatchError),

    #[error("failed to initialize sockets: {0}")]
    Socket(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("client connect failed: {0:?}")]
    ConnectFailed(ClientState),

    #[error("client never connected")]
    NeverConnected,

    #[error("interrupted")]
    Interrupted,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "netcode testbed starting");

    let result = tokio::select! {
        result = client_server_main() => result,
        _ = tokio::signal::ctrl_c() => Err(TestbedError::Interrupted),
    };

    match result {
        Ok(()) => {
            info!("success");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "testbed failed");
            ExitCode::FAILURE
        }
    }
}

async fn client_server_main() -> Result<(), TestbedError> {
    let client_address = SocketAddr::from((std::net::Ipv6Addr::LOCALHOST, CLIENT_PORT));
    let server_address = SocketAddr::from((std::net::Ipv6Addr::LOCALHOST, SERVER_PORT));

    let mut crypto = CryptoContext::new();
    let private_key = crypto.generate_key();

    let mut matcher = LocalMatcher::new(private_key.clone(), CryptoContext::new());
    matcher.add_server_address(server_address);
    let token = matcher.request_match(CLIENT_ID, START_TIME)?;

    let mut time = START_TIME;
    let transport_config = TransportConfigBuilder::new()
        .conditions(NetworkConditions::lossy())
        .build();

    let client_transport = Transport::bind_udp(client_address, transport_config.clone(), time);
    let server_transport = Transport::bind_udp(server_address, transport_config, time);
    for transport in [&client_transport, &server_transport] {
        if let Some(e) = transport.error() {
            return Err(TestbedError::Socket(e.to_string()));
        }
    }

    let mut client = Client::new(client_transport, ClientServerConfig::default(), time)?;
    let server_config = ServerConfigBuilder::new(private_key).build();
    let mut server = Server::new(server_transport, server_config, &mut crypto, time)?;

    server.set_server_address(server_address);
    server.start()?;
    client.connect(token)?;

    let mut ticker = interval(TICK_PACING);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut connected = false;
    for iteration in 0..NUM_ITERATIONS {
        ticker.tick().await;

        client.send_packets();
        server.send_packets();

        client.transport_mut().write_packets();
        server.transport_mut().write_packets();

        client.transport_mut().read_packets();
        server.transport_mut().read_packets();

        client.receive_packets();
        server.receive_packets();

        client.check_for_timeout();
        server.check_for_timeouts();

        while let Some(event) = server.poll_event() {
            info!(?event, "server event");
        }

        if client.connection_failed() {
            return Err(TestbedError::ConnectFailed(client.state()));
        }

        if client.is_connected() && server.num_connected_clients() == 1 {
            info!(iteration, time, "client and server connected, disconnecting");
            client.disconnect();
            connected = true;
        }

        time += TIME_STEP;

        if !client.is_connecting() && !client.is_connected() && server.num_connected_clients() == 0 {
            break;
        }

        client.advance_time(time);
        server.advance_time(time);
    }

    client.disconnect();
    server.stop();

    let counters = client.transport().counters();
    info!(
        sent = counters.datagrams_sent,
        lost = counters.datagrams_lost,
        duplicated = counters.datagrams_duplicated,
        received = counters.packets_received,
        dropped = counters.dropped(),
        "client transport totals"
    );

    if connected {
        Ok(())
    } else {
        warn!(state = ?client.state(), "ran out of iterations");
        Err(TestbedError::NeverConnected)
    }
}
