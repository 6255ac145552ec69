//! SOCKS5 reply builder.

use crate::consts::*;
use crate::error::{ReplyCode, Result};
use crate::types::TargetAddr;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Build and send a SOCKS5 reply.
///
/// # Reply Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// `bnd` of `None` encodes `0.0.0.0:0`, the conventional filler for error
/// replies where no address is meaningful.
pub async fn build_reply<S>(
    stream: &mut S,
    code: ReplyCode,
    bnd: Option<SocketAddr>,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let bnd = bnd.unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));

    let mut reply = vec![SOCKS_VERSION, code.into(), RESERVED];
    reply.extend_from_slice(&TargetAddr::from(bnd).to_bytes());

    stream.write_all(&reply).await?;
    stream.flush().await?;

    Ok(())
}
