//! Per-connection protocol driver.
//!
//! Threads one client connection through negotiation, authentication,
//! request parsing, authorization, resolution and command dispatch. Failures
//! before the request is read close silently; later failures answer with the
//! matching reply code before closing.

use crate::auth;
use crate::bind::handle_bind;
use crate::command::{build_reply, parse_command};
use crate::error::{Error, Result};
use crate::server::ServerContext;
use crate::tcp_relay::handle_connect;
use crate::types::{AsyncStream, SocksCommand, TargetAddr};
use crate::udp::handle_udp_associate;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::{debug, info, warn};

/// Drive the SOCKS5 protocol on one client connection.
///
/// `local_ip` is the server-side address of the connection when known; it is
/// the fallback bind address for BIND listeners and UDP relay sockets so the
/// reported `BND` endpoint is reachable from the client.
pub(crate) async fn handle_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    local_ip: Option<IpAddr>,
    ctx: &ServerContext,
) -> Result<()>
where
    S: AsyncStream,
{
    let auth_ctx = match auth::negotiate(&mut stream, peer, &ctx.authenticators).await {
        Ok(auth_ctx) => auth_ctx,
        Err(e) => {
            debug!("handshake with {} failed: {}", peer, e);
            return Err(e);
        }
    };

    let (command, mut target) = match parse_command(&mut stream).await {
        Ok(request) => request,
        Err(e) => {
            debug!("bad request from {}: {}", peer, e);
            // Best effort; the client may already be gone
            let _ = build_reply(&mut stream, e.reply_code(), None).await;
            return Err(e);
        }
    };

    info!(
        "{} request from {} (user {}) for {}",
        command,
        peer,
        auth_ctx.username().unwrap_or("-"),
        target
    );

    if let Some(rewriter) = &ctx.rewriter {
        let rewritten = rewriter.rewrite(command, target.clone(), &auth_ctx, peer);
        if rewritten != target {
            debug!("request target rewritten from {} to {}", target, rewritten);
            target = rewritten;
        }
    }

    if !ctx.rules.allow(command, &auth_ctx, peer, &target) {
        warn!("{} request from {} for {} denied by ruleset", command, peer, target);
        let _ = build_reply(&mut stream, Error::RuleDenied.reply_code(), None).await;
        return Err(Error::RuleDenied);
    }

    let dst: SocketAddr = match &target {
        TargetAddr::Ip(addr) => *addr,
        TargetAddr::Domain(name, port) => match ctx.resolver.resolve(name, peer).await {
            Ok(ip) => SocketAddr::new(ip, *port),
            Err(e) => {
                warn!("resolving {} for {} failed: {}", name, peer, e);
                let _ = build_reply(&mut stream, e.reply_code(), None).await;
                return Err(e);
            }
        },
    };

    let relay_ip = ctx
        .bind_ip
        .or(local_ip)
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    match command {
        SocksCommand::Connect => handle_connect(stream, dst, ctx).await,
        SocksCommand::Bind => handle_bind(stream, relay_ip, ctx).await,
        SocksCommand::UdpAssociate => {
            // The request address is the client's declared datagram source;
            // 0.0.0.0:0 (or any unspecified form) means "learn it from the
            // first authenticated datagram".
            let declared = (!dst.ip().is_unspecified()).then_some(dst);
            handle_udp_associate(stream, peer, relay_ip, declared, ctx).await
        }
    }
}
