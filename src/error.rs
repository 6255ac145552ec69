//! Error types for soxide
//!
//! Defines the crate error enum, the SOCKS5 reply code set, and the mapping
//! from system-level I/O errors to wire reply codes.

use std::io;
use thiserror::Error;

/// Convenient result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, self::Error>;

/// Errors produced while serving a SOCKS5 session.
#[derive(Error, Debug)]
pub enum Error {
    /// A frame could not be parsed
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    /// Client spoke a SOCKS version other than 5
    #[error("unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// Address type byte outside the RFC 1928 set
    #[error("address type not supported: {0:#04x}")]
    AddrTypeNotSupported(u8),

    /// None of the client's offered authentication methods is configured
    #[error("no acceptable authentication method")]
    NoSupportedAuth,

    /// Username/password sub-negotiation failed verification
    #[error("username/password authentication failed")]
    UserAuthFailed,

    /// Command byte outside the RFC 1928 set
    #[error("command not supported: {0:#04x}")]
    CommandNotSupported(u8),

    /// Request rejected by the configured rule set
    #[error("request denied by ruleset")]
    RuleDenied,

    /// A domain name in a request or datagram could not be resolved
    #[error("failed to resolve {0}")]
    ResolveFailure(String),

    /// The outbound dial, listen or bind performed for a command failed
    #[error("dial failed: {0}")]
    Dial(#[source] io::Error),

    /// I/O error on the client connection
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The server was asked to stop accepting connections
    #[error("server shut down")]
    Shutdown,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// The wire reply code reported to the client for this error.
    ///
    /// Only meaningful once the request has been read; earlier failures are
    /// closed silently because no reply frame is legal at that wire position.
    pub fn reply_code(&self) -> ReplyCode {
        match self {
            Error::CommandNotSupported(_) => ReplyCode::CommandNotSupported,
            Error::AddrTypeNotSupported(_) => ReplyCode::AddrTypeNotSupported,
            Error::RuleDenied => ReplyCode::RuleFailure,
            Error::ResolveFailure(_) => ReplyCode::HostUnreachable,
            Error::Dial(e) => ReplyCode::from(e),
            _ => ReplyCode::GeneralFailure,
        }
    }
}

/// Reply codes of the SOCKS5 REP field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    /// Request succeeded
    Success = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    RuleFailure = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddrTypeNotSupported = 0x08,
}

impl From<ReplyCode> for u8 {
    fn from(code: ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ReplyCode {
    type Error = self::Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(ReplyCode::Success),
            0x01 => Ok(ReplyCode::GeneralFailure),
            0x02 => Ok(ReplyCode::RuleFailure),
            0x03 => Ok(ReplyCode::NetworkUnreachable),
            0x04 => Ok(ReplyCode::HostUnreachable),
            0x05 => Ok(ReplyCode::ConnectionRefused),
            0x06 => Ok(ReplyCode::TtlExpired),
            0x07 => Ok(ReplyCode::CommandNotSupported),
            0x08 => Ok(ReplyCode::AddrTypeNotSupported),
            _ => Err(Error::MalformedFrame("unknown reply code")),
        }
    }
}

impl From<&io::Error> for ReplyCode {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ReplyCode::ConnectionRefused,
            io::ErrorKind::NetworkUnreachable => ReplyCode::NetworkUnreachable,
            io::ErrorKind::HostUnreachable => ReplyCode::HostUnreachable,
            io::ErrorKind::AddrNotAvailable => ReplyCode::HostUnreachable,
            io::ErrorKind::TimedOut => ReplyCode::TtlExpired,
            _ => ReplyCode::GeneralFailure,
        }
    }
}
