//! Non-blocking datagram sockets.
//!
//! The transport never blocks: `recv_from` returns `Ok(None)` as soon as
//! nothing is ready. Two implementations ship with the crate:
//! [`UdpSocket`] (feature `udp`, backed by mio) for real networks and
//! [`LoopbackSocket`](super::LoopbackSocket) for deterministic tests.

use std::io;
use std::net::SocketAddr;

/// Default receive buffer size.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 65535;

/// A poll-style datagram endpoint.
pub trait DatagramSocket: Send {
    /// Address the socket is bound to.
    fn local_addr(&self) -> SocketAddr;

    /// Send one datagram. A full send buffer is reported as an error and the
    /// datagram is lost, as on any unreliable network.
    fn send_to(&mut self, data: &[u8], address: SocketAddr) -> io::Result<()>;

    /// Receive one datagram into `buf` if one is ready.
    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;
}

#[cfg(feature = "udp")]
pub use self::udp::UdpSocket;

#[cfg(feature = "udp")]
mod udp {
    use std::io;
    use std::net::SocketAddr;

    use super::DatagramSocket;
    use crate::transport::SocketError;

    /// Non-blocking UDP socket.
    ///
    /// mio sockets are non-blocking from creation, so polling them needs no
    /// event loop: a read that would block simply yields `None`.
    #[derive(Debug)]
    pub struct UdpSocket {
        socket: mio::net::UdpSocket,
        local_addr: SocketAddr,
    }

    impl UdpSocket {
        /// Bind to `address`. Port 0 picks an ephemeral port.
        pub fn bind(address: SocketAddr) -> Result<Self, SocketError> {
            let socket = mio::net::UdpSocket::bind(address)
                .map_err(|e| SocketError::from_bind(address, e))?;
            let local_addr = socket.local_addr()?;
            Ok(Self { socket, local_addr })
        }
    }

    impl DatagramSocket for UdpSocket {
        fn local_addr(&self) -> SocketAddr {
            self.local_addr
        }

        fn send_to(&mut self, data: &[u8], address: SocketAddr) -> io::Result<()> {
            self.socket.send_to(data, address).map(|_| ())
        }

        fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
            match self.socket.recv_from(buf) {
                Ok((len, from)) => Ok(Some((len, from))),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
                Err(e) => Err(e),
            }
        }
    }
}

#[cfg(all(test, feature = "udp"))]
mod tests {
    use super::*;
    use crate::transport::SocketError;

    fn recv_eventually(socket: &mut UdpSocket, buf: &mut [u8]) -> (usize, SocketAddr) {
        for _ in 0..1000 {
            if let Some(received) = socket.recv_from(buf).unwrap() {
                return received;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        panic!("datagram never arrived");
    }

    #[test]
    fn test_socket_bind() {
        let socket = UdpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        assert_ne!(socket.local_addr().port(), 0);
    }

    #[test]
    fn test_socket_bind_in_use() {
        let first = UdpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let second = UdpSocket::bind(first.local_addr());
        assert!(matches!(second, Err(SocketError::AddressInUse(_))));
    }

    #[test]
    fn test_socket_send_recv() {
        let mut server = UdpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let mut client = UdpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();

        let mut buf = [0u8; DEFAULT_RECV_BUFFER_SIZE];
        assert!(server.recv_from(&mut buf).unwrap().is_none());

        client.send_to(b"hello", server.local_addr()).unwrap();
        let (len, from) = recv_eventually(&mut server, &mut buf);
        assert_eq!(&buf[..len], b"hello");
        assert_eq!(from, client.local_addr());
    }
}
