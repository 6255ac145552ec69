//! Socket factory capability
//!
//! All sockets the data-planes open go through this seam: outbound TCP for
//! CONNECT, the ephemeral listener for BIND, and the relay socket for UDP
//! ASSOCIATE. Tests substitute their own factory to observe or redirect
//! network I/O.

use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, SocketAddr};
use tokio::net::{TcpListener, TcpSocket, TcpStream, UdpSocket};

/// Factory for the sockets a session may open.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open an outbound TCP connection to `target`, optionally binding the
    /// local side to `bind_ip`.
    async fn connect(&self, target: SocketAddr, bind_ip: Option<IpAddr>) -> io::Result<TcpStream>;

    /// Open a TCP listener on `addr` (port 0 for ephemeral).
    async fn listen(&self, addr: SocketAddr) -> io::Result<TcpListener>;

    /// Open a UDP socket bound to `addr` (port 0 for ephemeral).
    async fn bind_udp(&self, addr: SocketAddr) -> io::Result<UdpSocket>;
}

/// Plain kernel sockets; the default factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectDialer;

#[async_trait]
impl Dialer for DirectDialer {
    async fn connect(&self, target: SocketAddr, bind_ip: Option<IpAddr>) -> io::Result<TcpStream> {
        match bind_ip {
            None => TcpStream::connect(target).await,
            Some(ip) => {
                let socket = match target {
                    SocketAddr::V4(_) => TcpSocket::new_v4()?,
                    SocketAddr::V6(_) => TcpSocket::new_v6()?,
                };
                socket.bind(SocketAddr::new(ip, 0))?;
                socket.connect(target).await
            }
        }
    }

    async fn listen(&self, addr: SocketAddr) -> io::Result<TcpListener> {
        TcpListener::bind(addr).await
    }

    async fn bind_udp(&self, addr: SocketAddr) -> io::Result<UdpSocket> {
        UdpSocket::bind(addr).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn connect_reaches_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = DirectDialer.connect(addr, None).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
    }

    #[tokio::test]
    async fn connect_honors_bind_ip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = DirectDialer
            .connect(addr, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)))
            .await
            .unwrap();
        assert_eq!(
            stream.local_addr().unwrap().ip(),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
    }

    #[tokio::test]
    async fn connect_refused_propagates() {
        // Port 1 on loopback is essentially never listening
        let err = DirectDialer
            .connect("127.0.0.1:1".parse().unwrap(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[tokio::test]
    async fn listen_and_bind_udp_ephemeral() {
        let listener = DirectDialer
            .listen("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);

        let socket = DirectDialer
            .bind_udp("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        assert_ne!(socket.local_addr().unwrap().port(), 0);
    }
}
