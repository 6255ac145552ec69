//! Shared helpers for soxide integration tests.

#![allow(dead_code)]

use soxide::Server;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

/// Install a verbose test subscriber once per binary.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// Start `server` on an ephemeral loopback port; returns the bound address.
pub async fn spawn_server(server: Server) -> SocketAddr {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    addr
}

/// TCP server answering `"pong"` to a 4-byte `"ping"`; one connection.
pub async fn spawn_tcp_ping_pong() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut conn, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        conn.write_all(b"pong").await.unwrap();
    });
    addr
}

/// UDP server answering `"pong"` to `"ping"` datagrams.
pub async fn spawn_udp_ping_pong() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        while let Ok((len, from)) = socket.recv_from(&mut buf).await {
            assert_eq!(&buf[..len], b"ping");
            let _ = socket.send_to(b"pong", from).await;
        }
    });
    addr
}

/// Greeting and user/pass sub-negotiation as a stock client would send them.
pub async fn handshake_userpass(stream: &mut TcpStream, user: &str, pass: &str) {
    stream.write_all(&[0x05, 2, 0x00, 0x02]).await.unwrap();

    let mut frame = vec![0x01, user.len() as u8];
    frame.extend_from_slice(user.as_bytes());
    frame.push(pass.len() as u8);
    frame.extend_from_slice(pass.as_bytes());
    stream.write_all(&frame).await.unwrap();
}

/// A `VER CMD RSV ATYP=IPv4 ADDR PORT` request frame.
pub fn request_frame(cmd: u8, addr: SocketAddr) -> Vec<u8> {
    let SocketAddr::V4(v4) = addr else {
        panic!("test helper only speaks IPv4");
    };
    let mut frame = vec![0x05, cmd, 0x00, 0x01];
    frame.extend_from_slice(&v4.ip().octets());
    frame.extend_from_slice(&v4.port().to_be_bytes());
    frame
}

/// Read a 10-byte IPv4 reply, returning (REP, BND).
pub async fn read_reply(stream: &mut TcpStream) -> (u8, SocketAddr) {
    let mut reply = [0u8; 10];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0], 0x05);
    assert_eq!(reply[2], 0x00);
    assert_eq!(reply[3], 0x01);

    let ip = std::net::Ipv4Addr::new(reply[4], reply[5], reply[6], reply[7]);
    let port = u16::from_be_bytes([reply[8], reply[9]]);
    (reply[1], SocketAddr::new(ip.into(), port))
}
