//! Access control capability
//!
//! Every parsed request passes the configured rule set before any outbound
//! socket is opened; a denial is answered with reply code 0x02 and the
//! connection is closed.

use crate::types::{AuthContext, SocksCommand, TargetAddr};
use std::net::SocketAddr;

/// Allow/deny predicate over a parsed request.
///
/// Invoked concurrently from many sessions; implementations must be
/// internally synchronized if they keep state.
pub trait RuleSet: Send + Sync {
    /// Whether `peer`, authenticated as `ctx`, may run `command` against
    /// `dst`. The destination is pre-resolution, so domain rules see the
    /// name the client sent.
    fn allow(
        &self,
        command: SocksCommand,
        ctx: &AuthContext,
        peer: SocketAddr,
        dst: &TargetAddr,
    ) -> bool;
}

/// Allows every request; the default rule set.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermitAll;

impl RuleSet for PermitAll {
    fn allow(&self, _: SocksCommand, _: &AuthContext, _: SocketAddr, _: &TargetAddr) -> bool {
        true
    }
}

/// Per-command allow flags.
#[derive(Debug, Clone, Copy)]
pub struct PermitCommand {
    /// Allow CONNECT
    pub connect: bool,
    /// Allow BIND
    pub bind: bool,
    /// Allow UDP ASSOCIATE
    pub associate: bool,
}

impl PermitCommand {
    /// Allow all three commands.
    pub fn all() -> Self {
        PermitCommand {
            connect: true,
            bind: true,
            associate: true,
        }
    }

    /// Allow CONNECT only.
    pub fn connect_only() -> Self {
        PermitCommand {
            connect: true,
            bind: false,
            associate: false,
        }
    }

    /// Deny everything.
    pub fn none() -> Self {
        PermitCommand {
            connect: false,
            bind: false,
            associate: false,
        }
    }
}

impl RuleSet for PermitCommand {
    fn allow(
        &self,
        command: SocksCommand,
        _: &AuthContext,
        _: SocketAddr,
        _: &TargetAddr,
    ) -> bool {
        match command {
            SocksCommand::Connect => self.connect,
            SocksCommand::Bind => self.bind,
            SocksCommand::UdpAssociate => self.associate,
        }
    }
}
