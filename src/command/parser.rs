//! SOCKS5 request parser.

use crate::consts::*;
use crate::error::{Error, Result};
use crate::types::{SocksCommand, TargetAddr};
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Parse a SOCKS5 request from the stream.
///
/// # Request Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// Domain names are returned as-is; resolution is a separate stage so the
/// caller can consult its resolver and rule set first.
pub async fn parse_command<S>(stream: &mut S) -> Result<(SocksCommand, TargetAddr)>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;

    if header[0] != SOCKS_VERSION {
        return Err(Error::UnsupportedVersion(header[0]));
    }

    let command =
        SocksCommand::from_byte(header[1]).ok_or(Error::CommandNotSupported(header[1]))?;

    let addr = parse_address(stream, header[3]).await?;

    Ok((command, addr))
}

/// Parse the `ATYP, ADDR, PORT` tail of a request.
async fn parse_address<S>(stream: &mut S, atyp: u8) -> Result<TargetAddr>
where
    S: AsyncRead + Unpin,
{
    match atyp {
        ATYP_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            let port = read_port(stream).await?;
            Ok(TargetAddr::ipv4(Ipv4Addr::from(addr), port))
        }

        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            let len = len[0] as usize;
            if len == 0 {
                return Err(Error::MalformedFrame("empty domain name"));
            }

            let mut domain = vec![0u8; len];
            stream.read_exact(&mut domain).await?;
            let domain = String::from_utf8(domain)
                .map_err(|_| Error::MalformedFrame("domain name is not UTF-8"))?;

            let port = read_port(stream).await?;
            Ok(TargetAddr::domain(domain, port))
        }

        ATYP_IPV6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            let port = read_port(stream).await?;
            Ok(TargetAddr::ipv6(Ipv6Addr::from(addr), port))
        }

        other => Err(Error::AddrTypeNotSupported(other)),
    }
}

async fn read_port<S>(stream: &mut S) -> Result<u16>
where
    S: AsyncRead + Unpin,
{
    let mut port = [0u8; 2];
    stream.read_exact(&mut port).await?;
    Ok(u16::from_be_bytes(port))
}
