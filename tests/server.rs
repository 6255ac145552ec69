//! End-to-end tests over real sockets.

mod common;

use anyhow::Result;
use bytes::Bytes;
use common::*;
use soxide::udp::{encode_udp_packet, parse_udp_packet, UdpPacket};
use soxide::{PermitCommand, Server, StaticCredentials, TargetAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

fn userpass_server() -> Server {
    let creds: StaticCredentials = [("foo", "bar")].into_iter().collect();
    Server::builder().credentials(creds).build()
}

#[tokio::test]
async fn connect_with_userpass_byte_exact() -> Result<()> {
    let echo = spawn_tcp_ping_pong().await;
    let proxy = spawn_server(userpass_server()).await;

    let mut conn = TcpStream::connect(proxy).await?;

    // Everything a client would send, written up front like a pipelined
    // client: greeting, sub-negotiation, request, then the payload.
    conn.write_all(&[0x05, 2, 0x00, 0x02]).await?;
    conn.write_all(&[0x01, 3, b'f', b'o', b'o', 3, b'b', b'a', b'r'])
        .await?;
    conn.write_all(&request_frame(0x01, echo)).await?;
    conn.write_all(b"ping").await?;

    // Method selection: user/pass
    let mut select = [0u8; 2];
    conn.read_exact(&mut select).await?;
    assert_eq!(select, [0x05, 0x02]);

    // Sub-negotiation verdict: success
    let mut status = [0u8; 2];
    conn.read_exact(&mut status).await?;
    assert_eq!(status, [0x01, 0x00]);

    // Success reply carrying the outbound local address
    let (rep, bnd) = read_reply(&mut conn).await;
    assert_eq!(rep, 0x00);
    assert!(bnd.ip().is_loopback());
    assert_ne!(bnd.port(), 0);

    // Payload relayed through the tunnel
    let mut payload = [0u8; 4];
    conn.read_exact(&mut payload).await?;
    assert_eq!(&payload, b"pong");

    Ok(())
}

#[tokio::test]
async fn userpass_rejected_closes_connection() -> Result<()> {
    let proxy = spawn_server(userpass_server()).await;

    let mut conn = TcpStream::connect(proxy).await?;
    handshake_userpass(&mut conn, "foo", "baz").await;

    let mut select = [0u8; 2];
    conn.read_exact(&mut select).await?;
    assert_eq!(select, [0x05, 0x02]);

    let mut status = [0u8; 2];
    conn.read_exact(&mut status).await?;
    assert_eq!(status, [0x01, 0x01]);

    // No command is dispatched; the server closes
    let mut rest = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(1), conn.read_to_end(&mut rest)).await??;
    assert_eq!(read, 0);

    Ok(())
}

#[tokio::test]
async fn no_acceptable_method_replies_ff_and_closes() -> Result<()> {
    let proxy = spawn_server(userpass_server()).await;

    let mut conn = TcpStream::connect(proxy).await?;
    conn.write_all(&[0x05, 1, 0x00]).await?;

    let mut select = [0u8; 2];
    conn.read_exact(&mut select).await?;
    assert_eq!(select, [0x05, 0xFF]);

    let mut rest = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(1), conn.read_to_end(&mut rest)).await??;
    assert_eq!(read, 0);

    Ok(())
}

#[tokio::test]
async fn udp_associate_relays_datagrams() -> Result<()> {
    let echo = spawn_udp_ping_pong().await;
    let proxy = spawn_server(userpass_server()).await;

    let mut conn = TcpStream::connect(proxy).await?;
    handshake_userpass(&mut conn, "foo", "bar").await;

    let mut select = [0u8; 2];
    conn.read_exact(&mut select).await?;
    let mut status = [0u8; 2];
    conn.read_exact(&mut status).await?;
    assert_eq!(status, [0x01, 0x00]);

    // Declared source 0.0.0.0:0: learned from the first datagram
    conn.write_all(&request_frame(0x03, "0.0.0.0:0".parse()?))
        .await?;

    let (rep, relay_addr) = read_reply(&mut conn).await;
    assert_eq!(rep, 0x00);
    assert!(relay_addr.ip().is_loopback());

    // Encapsulated ping through the relay
    let client = UdpSocket::bind("127.0.0.1:0").await?;
    let ping = UdpPacket::new(echo.into(), Bytes::from_static(b"ping"));
    client.send_to(&encode_udp_packet(&ping), relay_addr).await?;

    let mut buf = [0u8; 2048];
    let (len, from) =
        tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf)).await??;
    assert_eq!(from, relay_addr);

    // Header opens 00 00 00 01 (RSV, FRAG, ATYP=IPv4) and names the peer
    assert_eq!(&buf[..4], &[0x00, 0x00, 0x00, 0x01]);
    let reply = parse_udp_packet(&buf[..len]).unwrap();
    assert_eq!(reply.addr, TargetAddr::Ip(echo));
    assert_eq!(&reply.data[..], b"pong");

    // Closing the control connection tears the relay down
    drop(conn);
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.send_to(&encode_udp_packet(&ping), relay_addr).await?;
    let timed_out =
        tokio::time::timeout(Duration::from_millis(300), client.recv_from(&mut buf)).await;
    assert!(timed_out.is_err(), "relay should be gone after control EOF");

    Ok(())
}

#[tokio::test]
async fn stock_client_flow_round_trips() -> Result<()> {
    let echo = spawn_tcp_ping_pong().await;
    let proxy = spawn_server(userpass_server()).await;

    // The canonical client sequence, one exchange at a time
    let mut conn = TcpStream::connect(proxy).await?;
    handshake_userpass(&mut conn, "foo", "bar").await;

    let mut select = [0u8; 2];
    conn.read_exact(&mut select).await?;
    assert_eq!(select, [0x05, 0x02]);
    let mut status = [0u8; 2];
    conn.read_exact(&mut status).await?;
    assert_eq!(status, [0x01, 0x00]);

    conn.write_all(&request_frame(0x01, echo)).await?;
    let (rep, _) = read_reply(&mut conn).await;
    assert_eq!(rep, 0x00);

    conn.write_all(b"ping").await?;
    let mut payload = [0u8; 4];
    conn.read_exact(&mut payload).await?;
    assert_eq!(&payload, b"pong");

    Ok(())
}

#[tokio::test]
async fn malformed_atyp_gets_0x08() -> Result<()> {
    let proxy = spawn_server(Server::new()).await;

    let mut conn = TcpStream::connect(proxy).await?;
    conn.write_all(&[0x05, 1, 0x00]).await?;

    let mut select = [0u8; 2];
    conn.read_exact(&mut select).await?;
    assert_eq!(select, [0x05, 0x00]);

    // ATYP 0x09 does not exist
    conn.write_all(&[0x05, 0x01, 0x00, 0x09, 127, 0, 0, 1, 0, 80])
        .await?;

    let (rep, _) = read_reply(&mut conn).await;
    assert_eq!(rep, 0x08);

    Ok(())
}

#[tokio::test]
async fn bind_emits_two_replies_and_splices() -> Result<()> {
    let proxy = spawn_server(Server::new()).await;

    let mut conn = TcpStream::connect(proxy).await?;
    conn.write_all(&[0x05, 1, 0x00]).await?;
    let mut select = [0u8; 2];
    conn.read_exact(&mut select).await?;

    conn.write_all(&request_frame(0x02, "0.0.0.0:0".parse()?))
        .await?;

    let (rep, listen_addr) = read_reply(&mut conn).await;
    assert_eq!(rep, 0x00);
    assert!(listen_addr.ip().is_loopback());

    let mut remote = TcpStream::connect(listen_addr).await?;
    let remote_local = remote.local_addr()?;

    let (rep, peer_addr) = read_reply(&mut conn).await;
    assert_eq!(rep, 0x00);
    assert_eq!(peer_addr, remote_local);

    remote.write_all(b"hi from remote").await?;
    let mut buf = [0u8; 14];
    conn.read_exact(&mut buf).await?;
    assert_eq!(&buf, b"hi from remote");

    conn.write_all(b"hi from client").await?;
    remote.read_exact(&mut buf).await?;
    assert_eq!(&buf, b"hi from client");

    Ok(())
}

#[tokio::test]
async fn ruleset_denial_answers_0x02() -> Result<()> {
    let server = Server::builder()
        .rules(PermitCommand::connect_only())
        .build();
    let proxy = spawn_server(server).await;

    let mut conn = TcpStream::connect(proxy).await?;
    conn.write_all(&[0x05, 1, 0x00]).await?;
    let mut select = [0u8; 2];
    conn.read_exact(&mut select).await?;

    conn.write_all(&request_frame(0x03, "0.0.0.0:0".parse()?))
        .await?;

    let (rep, _) = read_reply(&mut conn).await;
    assert_eq!(rep, 0x02);

    Ok(())
}

#[tokio::test]
async fn connection_refused_maps_to_0x05() -> Result<()> {
    let proxy = spawn_server(Server::new()).await;

    // Reserve a port, then free it so nothing is listening
    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let dead_addr = dead.local_addr()?;
    drop(dead);

    let mut conn = TcpStream::connect(proxy).await?;
    conn.write_all(&[0x05, 1, 0x00]).await?;
    let mut select = [0u8; 2];
    conn.read_exact(&mut select).await?;

    conn.write_all(&request_frame(0x01, dead_addr)).await?;

    let (rep, _) = read_reply(&mut conn).await;
    assert_eq!(rep, 0x05);

    Ok(())
}

#[tokio::test]
async fn shutdown_drains_in_flight_sessions() -> Result<()> {
    let echo = spawn_tcp_ping_pong().await;
    let server = Server::new();
    let proxy = spawn_server(server.clone()).await;

    // Establish a tunnel first
    let mut conn = TcpStream::connect(proxy).await?;
    conn.write_all(&[0x05, 1, 0x00]).await?;
    let mut select = [0u8; 2];
    conn.read_exact(&mut select).await?;
    conn.write_all(&request_frame(0x01, echo)).await?;
    let (rep, _) = read_reply(&mut conn).await;
    assert_eq!(rep, 0x00);

    // Stop accepting; the existing tunnel must keep working
    server.shutdown();
    tokio::time::sleep(Duration::from_millis(50)).await;

    conn.write_all(b"ping").await?;
    let mut payload = [0u8; 4];
    conn.read_exact(&mut payload).await?;
    assert_eq!(&payload, b"pong");

    Ok(())
}
