//! In-memory datagram network.
//!
//! Sockets bound on the same [`LoopbackNetwork`] exchange datagrams through
//! shared per-address queues. Delivery is immediate and lossless; impairment
//! is layered on top by the transport's
//! [`NetworkSimulator`](super::NetworkSimulator), so tests stay
//! deterministic without touching the OS.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use super::error::SocketError;
use super::socket::DatagramSocket;

/// First port handed out for port-0 binds.
const EPHEMERAL_PORT_START: u16 = 49152;

type Inbox = VecDeque<(SocketAddr, Vec<u8>)>;

#[derive(Debug, Default)]
struct Inner {
    inboxes: HashMap<SocketAddr, Inbox>,
    next_ephemeral: u16,
}

/// A shared, in-memory datagram network.
///
/// Cloning yields another handle to the same network.
#[derive(Debug, Clone, Default)]
pub struct LoopbackNetwork {
    inner: Arc<Mutex<Inner>>,
}

impl LoopbackNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the queues inconsistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Bind a socket. Port 0 allocates an unused ephemeral port.
    pub fn bind(&self, address: SocketAddr) -> Result<LoopbackSocket, SocketError> {
        let mut inner = self.lock();

        let address = if address.port() == 0 {
            let mut candidate = address;
            loop {
                let offset = inner.next_ephemeral;
                inner.next_ephemeral =
                    (inner.next_ephemeral + 1) % (u16::MAX - EPHEMERAL_PORT_START);
                candidate.set_port(EPHEMERAL_PORT_START + offset);
                if !inner.inboxes.contains_key(&candidate) {
                    break candidate;
                }
            }
        } else {
            address
        };

        if inner.inboxes.contains_key(&address) {
            return Err(SocketError::AddressInUse(address));
        }
        inner.inboxes.insert(address, VecDeque::new());

        Ok(LoopbackSocket {
            network: self.clone(),
            local_addr: address,
        })
    }

    /// Whether a socket is currently bound to `address`.
    pub fn is_bound(&self, address: &SocketAddr) -> bool {
        self.lock().inboxes.contains_key(address)
    }

    /// Datagrams waiting in `address`'s inbox.
    pub fn pending(&self, address: &SocketAddr) -> usize {
        self.lock().inboxes.get(address).map_or(0, VecDeque::len)
    }
}

/// A socket bound on a [`LoopbackNetwork`]. Dropping it unbinds the address.
#[derive(Debug)]
pub struct LoopbackSocket {
    network: LoopbackNetwork,
    local_addr: SocketAddr,
}

impl DatagramSocket for LoopbackSocket {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn send_to(&mut self, data: &[u8], address: SocketAddr) -> io::Result<()> {
        let mut inner = self.network.lock();
        // Like UDP: sending to nobody succeeds and the datagram vanishes.
        if let Some(inbox) = inner.inboxes.get_mut(&address) {
            inbox.push_back((self.local_addr, data.to_vec()));
        }
        Ok(())
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        let mut inner = self.network.lock();
        let Some(inbox) = inner.inboxes.get_mut(&self.local_addr) else {
            return Ok(None);
        };
        let Some((from, data)) = inbox.pop_front() else {
            return Ok(None);
        };
        // Truncate like recvfrom does.
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(Some((len, from)))
    }
}

impl Drop for LoopbackSocket {
    fn drop(&mut self) {
        self.network.lock().inboxes.remove(&self.local_addr);
    }
}
