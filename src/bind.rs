//! BIND data-plane.
//!
//! Opens an ephemeral listener on the client's behalf, reports it, waits for
//! exactly one inbound connection, reports the peer, then splices.

use crate::command::build_reply;
use crate::error::{Error, ReplyCode, Result};
use crate::server::ServerContext;
use crate::tcp_relay::relay_tcp;
use crate::types::AsyncStream;
use std::net::{IpAddr, SocketAddr};
use tracing::{info, warn};

/// Handle a BIND command on an authenticated control connection.
///
/// Two success replies are written in sequence: the listening address as
/// soon as the listener is bound, and the connecting peer's address once the
/// single expected connection arrives. The listener is closed right after
/// that accept.
pub(crate) async fn handle_bind<S>(mut stream: S, relay_ip: IpAddr, ctx: &ServerContext) -> Result<()>
where
    S: AsyncStream,
{
    let listener = match ctx.dialer.listen(SocketAddr::new(relay_ip, 0)).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!("failed to bind listener for BIND: {}", e);
            build_reply(&mut stream, ReplyCode::from(&e), None).await?;
            return Err(Error::Dial(e));
        }
    };

    let bound = listener.local_addr()?;
    build_reply(&mut stream, ReplyCode::Success, Some(bound)).await?;

    info!("BIND listener waiting on {}", bound);

    let (inbound, peer) = match listener.accept().await {
        Ok(accepted) => accepted,
        Err(e) => {
            warn!("BIND accept on {} failed: {}", bound, e);
            build_reply(&mut stream, ReplyCode::GeneralFailure, None).await?;
            return Err(Error::Dial(e));
        }
    };
    drop(listener);

    build_reply(&mut stream, ReplyCode::Success, Some(peer)).await?;

    info!("BIND accepted peer {}", peer);

    relay_tcp(stream, inbound).await
}
