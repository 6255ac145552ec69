//! Core protocol types
//!
//! The command set, the polymorphic target address, the per-session
//! authentication context, and the stream alias used at trait-object seams.

use crate::consts::*;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncWrite};

/// Byte stream alias for trait-object seams.
///
/// Capability traits such as [`Authenticator`](crate::auth::Authenticator)
/// take `&mut dyn AsyncStream` so they stay object safe while the connection
/// handler remains generic over the transport.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// SOCKS5 command set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksCommand {
    /// Establish a TCP connection to the target
    Connect,
    /// Listen for one inbound TCP connection on behalf of the client
    Bind,
    /// Establish a UDP relay
    UdpAssociate,
}

impl SocksCommand {
    /// Parse a command byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            CMD_CONNECT => Some(SocksCommand::Connect),
            CMD_BIND => Some(SocksCommand::Bind),
            CMD_UDP_ASSOCIATE => Some(SocksCommand::UdpAssociate),
            _ => None,
        }
    }

    /// Wire byte of this command.
    pub fn to_byte(self) -> u8 {
        match self {
            SocksCommand::Connect => CMD_CONNECT,
            SocksCommand::Bind => CMD_BIND,
            SocksCommand::UdpAssociate => CMD_UDP_ASSOCIATE,
        }
    }
}

impl fmt::Display for SocksCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksCommand::Connect => write!(f, "CONNECT"),
            SocksCommand::Bind => write!(f, "BIND"),
            SocksCommand::UdpAssociate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// Target address carried in requests, replies and UDP datagram headers.
///
/// Either an IP address (ATYP 1 or 4) or a domain name (ATYP 3). Exactly one
/// representation is populated; the port is big-endian on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    /// IP address with port
    Ip(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
}

impl TargetAddr {
    /// Build from an IPv4 address and port.
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Build from an IPv6 address and port.
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Build from a domain name and port.
    pub fn domain(domain: impl Into<String>, port: u16) -> Self {
        TargetAddr::Domain(domain.into(), port)
    }

    /// Port component.
    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Ip(addr) => addr.port(),
            TargetAddr::Domain(_, port) => *port,
        }
    }

    /// ATYP byte of this address.
    pub fn atyp(&self) -> u8 {
        match self {
            TargetAddr::Ip(SocketAddr::V4(_)) => ATYP_IPV4,
            TargetAddr::Ip(SocketAddr::V6(_)) => ATYP_IPV6,
            TargetAddr::Domain(_, _) => ATYP_DOMAIN,
        }
    }

    /// Serialize as `ATYP, ADDR, PORT` wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        match self {
            TargetAddr::Ip(SocketAddr::V4(addr)) => {
                bytes.push(ATYP_IPV4);
                bytes.extend_from_slice(&addr.ip().octets());
                bytes.extend_from_slice(&addr.port().to_be_bytes());
            }
            TargetAddr::Ip(SocketAddr::V6(addr)) => {
                bytes.push(ATYP_IPV6);
                bytes.extend_from_slice(&addr.ip().octets());
                bytes.extend_from_slice(&addr.port().to_be_bytes());
            }
            TargetAddr::Domain(domain, port) => {
                bytes.push(ATYP_DOMAIN);
                bytes.push(domain.len() as u8);
                bytes.extend_from_slice(domain.as_bytes());
                bytes.extend_from_slice(&port.to_be_bytes());
            }
        }

        bytes
    }

    /// Deserialize from `ATYP, ADDR, PORT` wire bytes.
    ///
    /// Returns the address and the number of bytes consumed. The counterpart
    /// of [`to_bytes`](Self::to_bytes); used by the UDP datagram codec where
    /// the address sits inside an already-received packet.
    pub fn from_bytes(buf: &[u8]) -> Result<(Self, usize)> {
        let atyp = *buf.first().ok_or(Error::MalformedFrame("missing ATYP"))?;
        let buf = &buf[1..];

        match atyp {
            ATYP_IPV4 => {
                if buf.len() < 6 {
                    return Err(Error::MalformedFrame("truncated IPv4 address"));
                }
                let ip = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
                let port = u16::from_be_bytes([buf[4], buf[5]]);
                Ok((TargetAddr::ipv4(ip, port), 1 + 6))
            }

            ATYP_DOMAIN => {
                let len = *buf
                    .first()
                    .ok_or(Error::MalformedFrame("missing domain length"))?
                    as usize;
                if len == 0 {
                    return Err(Error::MalformedFrame("empty domain name"));
                }
                let buf = &buf[1..];
                if buf.len() < len + 2 {
                    return Err(Error::MalformedFrame("truncated domain name"));
                }
                let domain = String::from_utf8(buf[..len].to_vec())
                    .map_err(|_| Error::MalformedFrame("domain name is not UTF-8"))?;
                let port = u16::from_be_bytes([buf[len], buf[len + 1]]);
                Ok((TargetAddr::domain(domain, port), 1 + 1 + len + 2))
            }

            ATYP_IPV6 => {
                if buf.len() < 18 {
                    return Err(Error::MalformedFrame("truncated IPv6 address"));
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[..16]);
                let port = u16::from_be_bytes([buf[16], buf[17]]);
                Ok((TargetAddr::ipv6(Ipv6Addr::from(octets), port), 1 + 18))
            }

            other => Err(Error::AddrTypeNotSupported(other)),
        }
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => write!(f, "{}", addr),
            TargetAddr::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for TargetAddr {
    fn from(addr: SocketAddr) -> Self {
        TargetAddr::Ip(addr)
    }
}

/// Outcome of a completed authentication negotiation.
///
/// Carries the selected method code and whatever attributes the
/// sub-negotiation produced; username/password fills the `"username"` and
/// `"password"` keys. Shared with the rule set so policies can key on the
/// authenticated identity.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    /// Selected method code
    pub method: u8,
    /// Attributes negotiated during authentication
    pub payload: HashMap<String, String>,
}

impl AuthContext {
    /// Context for a method without attributes.
    pub fn new(method: u8) -> Self {
        AuthContext {
            method,
            payload: HashMap::new(),
        }
    }

    /// Authenticated username, when the method negotiated one.
    pub fn username(&self) -> Option<&str> {
        self.payload.get("username").map(String::as_str)
    }
}
