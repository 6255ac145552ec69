//! Name resolution capability
//!
//! Requests and relay datagrams may carry domain names; the server maps them
//! to IP addresses through this seam so operators can plug in split-horizon
//! or DNS-over-X backends and tests can inject deterministic mappings.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

/// Maps a domain name to an IP address.
///
/// `peer` is the client the resolution is performed for, allowing
/// per-client views. Shared read-only by all sessions.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `name`, returning the address to dial.
    async fn resolve(&self, name: &str, peer: SocketAddr) -> Result<IpAddr>;
}

/// System resolver; first returned record wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolve(&self, name: &str, _peer: SocketAddr) -> Result<IpAddr> {
        let addr = tokio::net::lookup_host((name, 0))
            .await
            .map_err(|_| Error::ResolveFailure(name.to_string()))?
            .next()
            .ok_or_else(|| Error::ResolveFailure(name.to_string()))?;
        Ok(addr.ip())
    }
}

/// Fixed name → address table.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, IpAddr>,
}

impl StaticResolver {
    /// Empty table; every lookup fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, name: impl Into<String>, addr: IpAddr) {
        self.entries.insert(name.into(), addr);
    }
}

impl<N: Into<String>> FromIterator<(N, IpAddr)> for StaticResolver {
    fn from_iter<T: IntoIterator<Item = (N, IpAddr)>>(iter: T) -> Self {
        StaticResolver {
            entries: iter.into_iter().map(|(n, a)| (n.into(), a)).collect(),
        }
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, name: &str, _peer: SocketAddr) -> Result<IpAddr> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| Error::ResolveFailure(name.to_string()))
    }
}
