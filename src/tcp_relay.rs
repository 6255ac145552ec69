//! CONNECT data-plane.
//!
//! Dials the destination through the configured socket factory, reports the
//! outcome in the wire reply, then splices the two streams until both
//! directions have finished.

use crate::command::build_reply;
use crate::error::{Error, ReplyCode, Result};
use crate::server::ServerContext;
use crate::types::AsyncStream;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Handle a CONNECT command on an authenticated control connection.
pub(crate) async fn handle_connect<S>(
    mut stream: S,
    dst: SocketAddr,
    ctx: &ServerContext,
) -> Result<()>
where
    S: AsyncStream,
{
    let dial = tokio::time::timeout(ctx.connect_timeout, ctx.dialer.connect(dst, ctx.bind_ip));

    let remote = match dial.await {
        Ok(Ok(remote)) => remote,
        Ok(Err(e)) => {
            warn!("connect to {} failed: {}", dst, e);
            build_reply(&mut stream, ReplyCode::from(&e), None).await?;
            return Err(Error::Dial(e));
        }
        Err(_) => {
            warn!("connect to {} timed out", dst);
            build_reply(&mut stream, ReplyCode::TtlExpired, None).await?;
            return Err(Error::Dial(io::Error::new(
                io::ErrorKind::TimedOut,
                "connect timed out",
            )));
        }
    };

    let local = remote.local_addr()?;
    build_reply(&mut stream, ReplyCode::Success, Some(local)).await?;

    info!("CONNECT tunnel established to {} (local {})", dst, local);

    relay_tcp(stream, remote).await
}

/// Splice two streams bidirectionally.
///
/// Each direction copies independently; when one side reaches EOF its
/// counterpart's write half is shut down so the half-close propagates, and
/// the splice completes once both directions have drained. The first read or
/// write error cancels the sibling direction and tears both streams down.
pub async fn relay_tcp<A, B>(a: A, b: B) -> Result<()>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let a_to_b = async {
        let copied = tokio::io::copy(&mut a_read, &mut b_write).await?;
        b_write.shutdown().await?;
        Ok::<u64, io::Error>(copied)
    };
    let b_to_a = async {
        let copied = tokio::io::copy(&mut b_read, &mut a_write).await?;
        a_write.shutdown().await?;
        Ok::<u64, io::Error>(copied)
    };

    match tokio::try_join!(a_to_b, b_to_a) {
        Ok((up, down)) => {
            debug!("splice finished: {} bytes up, {} bytes down", up, down);
            Ok(())
        }
        Err(e) => {
            debug!("splice terminated: {}", e);
            Err(e.into())
        }
    }
}
