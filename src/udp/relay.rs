//! UDP ASSOCIATE relay.
//!
//! Binds an ephemeral UDP socket for the client, decapsulates client
//! datagrams toward their destinations and encapsulates replies back. The
//! relay lives exactly as long as the control TCP connection: a watcher arm
//! observes the control stream and tears the socket down on EOF.

use super::packet::{encode_udp_packet, parse_udp_packet, UdpPacket};
use crate::command::build_reply;
use crate::error::{Error, ReplyCode, Result};
use crate::resolver::Resolver;
use crate::server::ServerContext;
use crate::types::{AsyncStream, TargetAddr};
use bytes::Bytes;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

/// Handle a UDP ASSOCIATE command on an authenticated control connection.
///
/// Replies with the relay socket's address, then runs the relay loop until
/// the control connection closes.
pub(crate) async fn handle_udp_associate<S>(
    mut stream: S,
    peer: SocketAddr,
    relay_ip: IpAddr,
    declared: Option<SocketAddr>,
    ctx: &ServerContext,
) -> Result<()>
where
    S: AsyncStream,
{
    let socket = match ctx.dialer.bind_udp(SocketAddr::new(relay_ip, 0)).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!("failed to bind UDP relay socket: {}", e);
            build_reply(&mut stream, ReplyCode::from(&e), None).await?;
            return Err(Error::Dial(e));
        }
    };

    let relay_addr = socket.local_addr()?;
    build_reply(&mut stream, ReplyCode::Success, Some(relay_addr)).await?;

    info!("UDP relay for {} listening on {}", peer, relay_addr);

    let relay = UdpRelay::new(
        socket,
        peer,
        declared,
        ctx.resolver.clone(),
        ctx.udp_buffer_size,
    );
    relay.run(&mut stream).await
}

/// State of one ASSOCIATE session.
struct UdpRelay {
    socket: UdpSocket,
    /// Peer address of the control TCP connection
    control_peer: SocketAddr,
    /// Client-declared datagram source, when it was concrete
    declared: Option<SocketAddr>,
    /// Latest verified client datagram source; replies go here
    client: Option<SocketAddr>,
    /// Remotes we have forwarded to; only these may answer
    destinations: HashSet<SocketAddr>,
    resolver: Arc<dyn Resolver>,
    buffer_size: usize,
}

impl UdpRelay {
    fn new(
        socket: UdpSocket,
        control_peer: SocketAddr,
        declared: Option<SocketAddr>,
        resolver: Arc<dyn Resolver>,
        buffer_size: usize,
    ) -> Self {
        UdpRelay {
            socket,
            control_peer,
            declared,
            client: None,
            destinations: HashSet::new(),
            resolver,
            buffer_size,
        }
    }

    /// Relay until the control connection reports EOF or an error.
    async fn run<S>(mut self, control: &mut S) -> Result<()>
    where
        S: AsyncStream,
    {
        let mut datagram = vec![0u8; self.buffer_size];
        let mut control_buf = [0u8; 256];

        loop {
            tokio::select! {
                read = control.read(&mut control_buf) => {
                    match read {
                        Ok(0) => {
                            debug!(
                                "control connection from {} closed, dropping UDP relay",
                                self.control_peer
                            );
                            return Ok(());
                        }
                        // Stray bytes on the control channel are ignored
                        Ok(_) => continue,
                        Err(e) => {
                            debug!("control connection from {} errored: {}", self.control_peer, e);
                            return Err(e.into());
                        }
                    }
                }
                received = self.socket.recv_from(&mut datagram) => {
                    let (len, src) = received?;
                    if len == datagram.len() {
                        // recv_from silently truncates; a full buffer means
                        // the datagram did not fit
                        debug!("dropping oversize datagram from {}", src);
                        continue;
                    }
                    self.dispatch(&datagram[..len], src).await;
                }
            }
        }
    }

    /// Route one datagram; never fatal to the relay.
    async fn dispatch(&mut self, data: &[u8], src: SocketAddr) {
        if self.is_client_source(src) {
            self.forward_from_client(data, src).await;
        } else if self.destinations.contains(&src) {
            self.return_to_client(data, src).await;
        } else {
            trace!("dropping datagram from unrelated source {}", src);
        }
    }

    /// Whether `src` is the authorized client side of this association.
    ///
    /// The declared address pins the expected source IP; with no usable
    /// declaration (`0.0.0.0:0`) the first source whose IP matches the
    /// control connection's peer is adopted. The port is learned rather than
    /// enforced, since NATs routinely rewrite it.
    fn is_client_source(&self, src: SocketAddr) -> bool {
        if self.client == Some(src) {
            return true;
        }

        let expected_ip = self
            .declared
            .map(|d| d.ip())
            .unwrap_or_else(|| self.control_peer.ip());
        src.ip() == expected_ip
    }

    async fn forward_from_client(&mut self, data: &[u8], src: SocketAddr) {
        let packet = match parse_udp_packet(data) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("dropping undecodable datagram from {}: {}", src, e);
                return;
            }
        };

        if packet.is_fragmented() {
            debug!(
                "dropping fragmented datagram from {} (FRAG={})",
                src, packet.frag
            );
            return;
        }

        let dst = match &packet.addr {
            TargetAddr::Ip(addr) => *addr,
            TargetAddr::Domain(name, port) => {
                match self.resolver.resolve(name, self.control_peer).await {
                    Ok(ip) => SocketAddr::new(ip, *port),
                    Err(e) => {
                        debug!("dropping datagram for unresolvable {}: {}", name, e);
                        return;
                    }
                }
            }
        };

        self.client = Some(src);

        match self.socket.send_to(&packet.data, dst).await {
            Ok(sent) => {
                trace!("relayed {} bytes from {} to {}", sent, src, dst);
                self.destinations.insert(dst);
            }
            Err(e) => debug!("UDP send to {} failed: {}", dst, e),
        }
    }

    async fn return_to_client(&mut self, data: &[u8], src: SocketAddr) {
        let Some(client) = self.client else {
            trace!("dropping reply from {} with no client source learned", src);
            return;
        };

        let packet = UdpPacket::new(src.into(), Bytes::copy_from_slice(data));
        let encoded = encode_udp_packet(&packet);

        match self.socket.send_to(&encoded, client).await {
            Ok(_) => trace!("returned {} bytes from {} to {}", data.len(), src, client),
            Err(e) => debug!("UDP return to {} failed: {}", client, e),
        }
    }
}
